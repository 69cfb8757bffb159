use apiweave_core::types::VariableActionSpec;
use apiweave_core::{EvalContext, ValueString};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::api::Api;
use crate::error::ExecError;

use super::Dispatch;

/// Computes a value (expression or live-store read) and stores it under a
/// name visible to later actions of the same invocation.
pub struct VariableAction {
    pub name: String,
    value: Option<ValueString>,
    tag_path: Option<ValueString>,
}

impl VariableAction {
    pub fn compile(spec: &VariableActionSpec) -> Result<Self, ExecError> {
        if spec.value.is_none() && spec.tag_path.is_none() {
            return Err(ExecError::Config(format!(
                "variable '{}' missing value or tag path",
                spec.name
            )));
        }
        Ok(Self {
            name: spec.name.clone(),
            value: spec.value.as_deref().map(ValueString::parse).transpose()?,
            tag_path: spec
                .tag_path
                .as_deref()
                .map(ValueString::parse)
                .transpose()?,
        })
    }

    pub fn compile_all(specs: &[VariableActionSpec]) -> Result<Vec<Self>, ExecError> {
        specs.iter().map(Self::compile).collect()
    }

    /// Resolve the value in the given context: a live-store read when a
    /// tag path is configured, otherwise the expression.
    pub async fn value_of(
        &self,
        api: &Api,
        ctx: &EvalContext<'_>,
    ) -> Result<JsonValue, ExecError> {
        if let Some(tag_path) = &self.tag_path {
            let path = tag_path.value(ctx)?;
            return Ok(api.ctx.tags.read_tag(&path).await?);
        }
        let value = self
            .value
            .as_ref()
            .expect("variable without value or tag path rejected at compile");
        Ok(JsonValue::String(value.value(ctx)?))
    }

    pub async fn handle(&self, d: &Dispatch<'_>) -> Result<(), ExecError> {
        let value = self.value_of(d.api, &d.eval_ctx()).await?;
        debug!(name = %self.name, "storing variable");
        d.invocation.set(&self.name, value);
        Ok(())
    }
}
