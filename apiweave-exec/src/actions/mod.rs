mod function_action;
mod script;
mod store_file;
pub mod tag;
mod variable;
mod webhook_action;

pub use function_action::FunctionAction;
pub use script::ScriptAction;
pub use store_file::StoreFileAction;
pub use tag::TagAction;
pub use variable::VariableAction;
pub use webhook_action::WebhookAction;

use std::sync::Arc;

use apiweave_core::types::{ActionSpec, RunIfSpec};
use apiweave_core::{EvalContext, ValueString};
use tracing::{debug, error};

use crate::api::Api;
use crate::condition::Case;
use crate::error::ExecError;
use crate::executor::ScopeArg;
use crate::function::Function;
use crate::vars::InvocationVars;

/// Everything one action sees while processing a response.
pub struct Dispatch<'a> {
    pub api: &'a Arc<Api>,
    pub function: &'a Arc<Function>,
    pub invocation: &'a InvocationVars,
    pub scope: ScopeArg,
    pub status: u16,
    pub content_type: &'a str,
    pub response: &'a str,
}

impl<'a> Dispatch<'a> {
    pub fn eval_ctx<'b>(&'b self) -> EvalContext<'b>
    where
        'a: 'b,
    {
        EvalContext {
            scope: self.scope.as_deref(),
            resolver: self.api.as_ref(),
            response: Some(self.response),
            item: None,
        }
    }

    pub fn eval_ctx_item<'b>(&'b self, item: Option<&'b str>) -> EvalContext<'b>
    where
        'a: 'b,
    {
        EvalContext {
            scope: self.scope.as_deref(),
            resolver: self.api.as_ref(),
            response: Some(self.response),
            item,
        }
    }
}

/// Compile-time context shared by action compilation (defaults derive from
/// the owning names).
#[derive(Debug, Clone, Copy)]
pub struct CompileCtx<'a> {
    pub api_name: &'a str,
    pub function_name: &'a str,
}

pub enum ActionKind {
    Variable(VariableAction),
    Tag(TagAction),
    Script(ScriptAction),
    Function(FunctionAction),
    Webhook(WebhookAction),
    StoreFile(StoreFileAction),
}

impl ActionKind {
    fn name(&self) -> &'static str {
        match self {
            Self::Variable(_) => "variable",
            Self::Tag(_) => "tag",
            Self::Script(_) => "script",
            Self::Function(_) => "function",
            Self::Webhook(_) => "webhook",
            Self::StoreFile(_) => "storefile",
        }
    }
}

/// Pre-condition gate: a condition match, or "the referenced stored file id
/// is not yet persisted".
pub enum RunIf {
    Condition(Case),
    StoreFileIdNotExists {
        file_id: ValueString,
        file_name: ValueString,
    },
}

impl RunIf {
    fn compile(spec: &RunIfSpec) -> Result<Self, ExecError> {
        match spec {
            RunIfSpec::Condition(case) => Ok(Self::Condition(Case::compile(case)?)),
            RunIfSpec::StoreFileIdNotExists { file_id, file_name } => {
                Ok(Self::StoreFileIdNotExists {
                    file_id: ValueString::parse(file_id)?,
                    file_name: ValueString::parse(file_name)?,
                })
            }
        }
    }

    async fn proceed(&self, d: &Dispatch<'_>) -> Result<bool, ExecError> {
        match self {
            Self::Condition(case) => case.matches(&d.eval_ctx()),
            Self::StoreFileIdNotExists { file_id, file_name } => {
                let ctx = d.eval_ctx();
                let file_id = file_id.value(&ctx)?;
                let file_name = file_name.value(&ctx)?;
                let record = d.api.ctx.records.find_file(d.api.id, &file_name).await?;
                let proceed = record.map(|r| r.file_id != file_id).unwrap_or(true);
                debug!(file_id = %file_id, file_name = %file_name, proceed, "checking for stored file");
                Ok(proceed)
            }
        }
    }
}

pub struct ActionEntry {
    run_if: Option<RunIf>,
    kind: ActionKind,
}

/// The ordered action list of one function.
#[derive(Default)]
pub struct Actions {
    entries: Vec<ActionEntry>,
}

impl Actions {
    pub fn compile(specs: &[ActionSpec], ctx: CompileCtx<'_>) -> Result<Self, ExecError> {
        let mut entries = Vec::with_capacity(specs.len());
        for spec in specs {
            let run_if = spec.run_if().map(RunIf::compile).transpose()?;
            let kind = match spec {
                ActionSpec::Variable(s) => ActionKind::Variable(VariableAction::compile(s)?),
                ActionSpec::Tag(s) => ActionKind::Tag(TagAction::compile(s, ctx)?),
                ActionSpec::Script(s) => ActionKind::Script(ScriptAction::compile(s)?),
                ActionSpec::Function(s) => ActionKind::Function(FunctionAction::compile(s)?),
                ActionSpec::Webhook(s) => ActionKind::Webhook(WebhookAction::compile(s)?),
                ActionSpec::StoreFile(s) => ActionKind::StoreFile(StoreFileAction::compile(s, ctx)?),
            };
            entries.push(ActionEntry { run_if, kind });
        }
        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run every gated action in configured order. One action's failure is
    /// logged and does not abort its siblings.
    #[allow(clippy::too_many_arguments)]
    pub async fn handle_response(
        &self,
        api: &Arc<Api>,
        function: &Arc<Function>,
        invocation: &InvocationVars,
        scope: ScopeArg,
        status: u16,
        content_type: &str,
        response: &str,
    ) -> Result<(), ExecError> {
        for entry in &self.entries {
            let d = Dispatch {
                api,
                function,
                invocation,
                scope: scope.clone(),
                status,
                content_type,
                response,
            };

            if let Some(run_if) = &entry.run_if {
                match run_if.proceed(&d).await {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(e) => {
                        debug!(action = entry.kind.name(), error = %e, "skipping action, run-if failed");
                        continue;
                    }
                }
            }

            let result = match &entry.kind {
                ActionKind::Variable(a) => a.handle(&d).await,
                ActionKind::Tag(a) => a.handle(&d).await,
                ActionKind::Script(a) => a.handle(&d).await,
                ActionKind::Function(a) => a.handle(&d).await,
                ActionKind::Webhook(a) => a.handle(&d).await,
                ActionKind::StoreFile(a) => a.handle(&d).await,
            };
            if let Err(e) = result {
                error!(
                    api = %api.name,
                    function = %function.name,
                    action = entry.kind.name(),
                    error = %e,
                    "error handling action"
                );
            }
        }
        Ok(())
    }

    pub fn shutdown(&self) {
        for entry in &self.entries {
            if let ActionKind::Function(a) = &entry.kind {
                a.shutdown();
            }
        }
    }
}
