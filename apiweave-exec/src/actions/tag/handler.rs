use std::sync::{Arc, Weak};

use apiweave_core::{EvalContext, VariableScope};
use apiweave_store::{WriteHandler, WriteQuality};
use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, error};

use crate::api::Api;
use crate::vars::HandlerVars;

use super::TagHandlerDecl;

/// Write handler installed for a declared field: echoes the write, captures
/// ambient variables into a handler-local scope, optionally triggers a
/// function and optionally resets the written value.
pub struct TagWriteHandler {
    api: Weak<Api>,
    parent_path: String,
    decl: Arc<TagHandlerDecl>,
}

impl TagWriteHandler {
    pub fn install(api: &Arc<Api>, parent_path: &str, decl: Arc<TagHandlerDecl>) -> Arc<Self> {
        Arc::new(Self {
            api: Arc::downgrade(api),
            parent_path: parent_path.to_string(),
            decl,
        })
    }

    async fn run(&self, path: &str, value: JsonValue) -> Result<(), crate::error::ExecError> {
        let api = self
            .api
            .upgrade()
            .ok_or_else(|| crate::error::ExecError::Processing("api is gone".to_string()))?;

        api.ctx.tags.tag_update(path, value.clone()).await?;

        let scope = Arc::new(HandlerVars::new());
        scope.put("value", value);
        scope.put("tagPath", json!(path));
        scope.put("parentPath", json!(self.parent_path.clone()));

        for variable in &self.decl.variables {
            let ctx = EvalContext {
                scope: Some(scope.as_ref() as &dyn VariableScope),
                resolver: api.as_ref(),
                response: None,
                item: None,
            };
            let value = variable.value_of(&api, &ctx).await?;
            scope.put(&variable.name, value);
        }

        debug!(
            tag = path,
            function = ?self.decl.function,
            reset = self.decl.reset,
            "handling tag write"
        );

        if let Some(function) = &self.decl.function {
            let function = api.function(function)?;
            let scope: Arc<dyn VariableScope> = scope.clone();
            crate::executor::execute_async(api.clone(), function, Some(scope));
        }

        if self.decl.reset {
            api.ctx.tags.tag_update(path, json!(false)).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl WriteHandler for TagWriteHandler {
    async fn write(&self, path: &str, value: JsonValue) -> WriteQuality {
        match self.run(path, value).await {
            Ok(()) => WriteQuality::Good,
            Err(e) => {
                error!(tag = path, error = %e, "error in write handler");
                WriteQuality::Error
            }
        }
    }
}
