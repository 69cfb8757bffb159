use std::sync::Arc;

use apiweave_core::types::WebhookActionSpec;
use apiweave_core::{ValueString, VariableScope};
use tracing::debug;

use crate::error::ExecError;
use crate::webhook::WebhookScope;

use super::{Dispatch, VariableAction};

/// Resolves or creates a webhook key per item, stashes per-item variables on
/// it and kicks off its check/add/handle cycle.
pub struct WebhookAction {
    name: ValueString,
    key: ValueString,
    id: Option<ValueString>,
    ttl: Option<i64>,
    items: ValueString,
    variables: Vec<VariableAction>,
}

impl WebhookAction {
    pub fn compile(spec: &WebhookActionSpec) -> Result<Self, ExecError> {
        Ok(Self {
            name: ValueString::parse(&spec.name)?,
            key: ValueString::parse(&spec.key)?,
            id: spec.id.as_deref().map(ValueString::parse).transpose()?,
            ttl: spec.ttl,
            items: match &spec.items {
                Some(text) => ValueString::parse(text)?,
                None => ValueString::null_item(),
            },
            variables: VariableAction::compile_all(&spec.variables)?,
        })
    }

    pub async fn handle(&self, d: &Dispatch<'_>) -> Result<(), ExecError> {
        let items = self.items.values(&d.eval_ctx())?;
        for item in items {
            let item = item.as_deref();
            let ctx = d.eval_ctx_item(item);

            let key = self.key.value(&ctx)?;
            let id = self.id.as_ref().map(|v| v.value(&ctx)).transpose()?;
            let name = self.name.value(&ctx)?;

            let webhook = d.api.webhook(&name)?;
            let webhook_key = webhook
                .key_or_create(d.api, key.clone(), id.clone(), self.ttl)
                .await?;

            let scope = WebhookScope::new(webhook_key.clone());
            for variable in &self.variables {
                let value = variable.value_of(d.api, &ctx).await?;
                scope.put(&variable.name, value);
            }

            debug!(key = %key, id = ?id, name = %name, "handling webhook action");

            let scope: Arc<dyn VariableScope> = Arc::new(scope);
            crate::webhook::spawn_cycle(
                d.api.clone(),
                webhook.clone(),
                webhook_key,
                Some(scope),
            );
        }
        Ok(())
    }
}
