use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use apiweave_core::types::{FunctionActionSpec, FunctionActionType, RetrySpec};
use apiweave_core::{ValueString, VariableScope};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::condition::Case;
use crate::error::ExecError;
use crate::vars::HandlerVars;

use super::{Dispatch, VariableAction};

/// Retry scratch state for condition-mode function actions: a bounded
/// counter reset on the next success, plus the outstanding schedule handle.
pub struct RetryState {
    spec: RetrySpec,
    count: AtomicU32,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RetryState {
    fn new(spec: RetrySpec) -> Self {
        Self {
            spec,
            count: AtomicU32::new(0),
            handle: Mutex::new(None),
        }
    }

    fn can_execute(&self) -> bool {
        self.count.load(Ordering::Acquire) < self.spec.max
    }

    fn reset(&self) {
        self.count.store(0, Ordering::Release);
    }

    fn increment(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    fn replace_handle(&self, handle: JoinHandle<()>) {
        *self.handle.lock().expect("retry lock") = Some(handle);
    }

    fn abort(&self) {
        if let Some(handle) = self.handle.lock().expect("retry lock").take() {
            handle.abort();
        }
    }
}

/// Iterates an items source and invokes a target function per item, either
/// unconditionally or through a condition with true/false branches and an
/// optional bounded retry of the owning function.
pub struct FunctionAction {
    kind: FunctionActionType,
    true_function: Option<String>,
    false_function: Option<String>,
    items: ValueString,
    variables: Vec<VariableAction>,
    condition: Option<Case>,
    retry: Option<RetryState>,
}

impl FunctionAction {
    pub fn compile(spec: &FunctionActionSpec) -> Result<Self, ExecError> {
        let (true_function, false_function) = if spec.function.is_some() {
            (spec.function.clone(), None)
        } else {
            (spec.true_function.clone(), spec.false_function.clone())
        };

        match spec.r#type {
            FunctionActionType::Direct if true_function.is_none() => {
                return Err(ExecError::Config("function missing".to_string()));
            }
            FunctionActionType::Condition if true_function.is_none() => {
                return Err(ExecError::Config("true function missing".to_string()));
            }
            _ => {}
        }

        let condition = if spec.r#type == FunctionActionType::Condition {
            let key = spec
                .condition_key
                .as_deref()
                .ok_or_else(|| ExecError::Config("condition key missing".to_string()))?;
            let value = spec
                .condition_value
                .as_ref()
                .ok_or_else(|| ExecError::Config("condition value missing".to_string()))?;
            Some(Case::from_parts(key, spec.condition_operator, value)?)
        } else {
            None
        };

        Ok(Self {
            kind: spec.r#type,
            true_function,
            false_function,
            items: match &spec.items {
                Some(text) => ValueString::parse(text)?,
                None => ValueString::null_item(),
            },
            variables: VariableAction::compile_all(&spec.variables)?,
            condition,
            retry: spec.retry.clone().map(RetryState::new),
        })
    }

    pub async fn handle(&self, d: &Dispatch<'_>) -> Result<(), ExecError> {
        let items = self.items.values(&d.eval_ctx())?;
        for item in items {
            let item = item.as_deref();
            match self.kind {
                FunctionActionType::Direct => {
                    self.invoke(d, item, self.true_function.as_deref().expect("checked"))
                        .await?;
                }
                FunctionActionType::Condition => {
                    let matched = self
                        .condition
                        .as_ref()
                        .expect("condition compiled")
                        .matches(&d.eval_ctx_item(item))?;
                    if matched {
                        self.invoke(d, item, self.true_function.as_deref().expect("checked"))
                            .await?;
                        if let Some(retry) = &self.retry {
                            retry.reset();
                        }
                    } else {
                        if let Some(false_function) = &self.false_function {
                            self.invoke(d, item, false_function).await?;
                        }
                        self.schedule_retry(d, self.capture_variables(d, item).await).await;
                    }
                }
            }
        }
        Ok(())
    }

    /// Build the handler scope from the configured variables and run the
    /// target synchronously within this action's dispatch.
    async fn invoke(
        &self,
        d: &Dispatch<'_>,
        item: Option<&str>,
        target: &str,
    ) -> Result<(), ExecError> {
        let handler = Arc::new(HandlerVars::new());
        let ctx = d.eval_ctx_item(item);
        for variable in &self.variables {
            let value = variable.value_of(d.api, &ctx).await?;
            handler.put(&variable.name, value);
        }

        debug!(function = %target, "handling function action");

        let function = d.api.function(target)?;
        let scope: Arc<dyn VariableScope> = handler;
        crate::executor::execute_blocking(d.api, &function, Some(scope)).await;
        Ok(())
    }

    /// The handler variables as they stand at schedule time; evaluation
    /// errors leave the affected name out rather than blocking the retry.
    async fn capture_variables(
        &self,
        d: &Dispatch<'_>,
        item: Option<&str>,
    ) -> std::collections::HashMap<String, serde_json::Value> {
        let handler = HandlerVars::new();
        let ctx = d.eval_ctx_item(item);
        for variable in &self.variables {
            match variable.value_of(d.api, &ctx).await {
                Ok(value) => handler.put(&variable.name, value),
                Err(e) => debug!(name = %variable.name, error = %e, "error capturing retry variable"),
            }
        }
        handler.snapshot()
    }

    /// Condition failed: re-run the owning function after the configured
    /// delay, bounded by the retry counter.
    async fn schedule_retry(
        &self,
        d: &Dispatch<'_>,
        variables: std::collections::HashMap<String, serde_json::Value>,
    ) {
        let Some(retry) = &self.retry else {
            return;
        };
        if !retry.can_execute() {
            return;
        }
        retry.increment();

        let api = d.api.clone();
        let function = d.function.clone();
        let delay = Duration::from_secs(retry.spec.unit.to_seconds(retry.spec.duration));
        debug!(
            function = %function.name,
            delay_secs = delay.as_secs(),
            "scheduling function retry"
        );

        let handle = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let scope: Arc<dyn VariableScope> = Arc::new(HandlerVars::from_map(variables));
            crate::executor::execute_blocking(&api, &function, Some(scope)).await;
        });
        retry.replace_handle(handle);
    }

    pub fn shutdown(&self) {
        if let Some(retry) = &self.retry {
            retry.abort();
        }
    }
}
