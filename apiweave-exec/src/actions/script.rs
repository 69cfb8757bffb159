use apiweave_core::types::ScriptActionSpec;
use apiweave_core::ValueString;
use tracing::debug;

use crate::error::ExecError;

use super::Dispatch;

/// Invokes an externally hosted routine with
/// `(status_code, content_type, response)`.
pub struct ScriptAction {
    project: Option<ValueString>,
    script: ValueString,
}

impl ScriptAction {
    pub fn compile(spec: &ScriptActionSpec) -> Result<Self, ExecError> {
        Ok(Self {
            project: spec
                .project
                .as_deref()
                .map(ValueString::parse)
                .transpose()?,
            script: ValueString::parse(&spec.script)?,
        })
    }

    pub async fn handle(&self, d: &Dispatch<'_>) -> Result<(), ExecError> {
        let ctx = d.eval_ctx();
        let project = self.project.as_ref().map(|p| p.value(&ctx)).transpose()?;
        let routine = self.script.value(&ctx)?;

        debug!(project = ?project, routine = %routine, "handling script action");

        d.api
            .ctx
            .scripts
            .invoke(
                project.as_deref(),
                &routine,
                d.status,
                d.content_type,
                d.response,
            )
            .await
            .map_err(ExecError::processing)
    }
}
