//! Webhook key lifecycle: registration, existence probing, TTL-based
//! re-check scheduling and best-effort teardown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use apiweave_core::types::WebhookSpec;
use apiweave_core::{EvalContext, ValueString, VariableScope};
use apiweave_store::{TagDataType, WebhookKeyRecord, WriteHandler, WriteQuality};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value as JsonValue};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::api::Api;
use crate::error::ExecError;
use crate::executor::{call_blocking, ScopeArg};
use crate::function::{Function, FunctionStatus};
use crate::vars::{value_to_string, InvocationVars};

pub const WEBHOOK_ENDPOINT: &str = "webhook";

/// One configured webhook: the four management functions plus its live keys.
pub struct Webhook {
    pub name: String,
    default_key: Option<ValueString>,
    default_id: Option<ValueString>,
    default_ttl: Option<i64>,
    check_on_start: bool,
    pub check: Arc<Function>,
    pub add: Arc<Function>,
    pub remove: Arc<Function>,
    pub handle: Arc<Function>,
    keys: RwLock<HashMap<String, Arc<WebhookKey>>>,
}

impl Webhook {
    pub fn compile(api_name: &str, name: &str, spec: &WebhookSpec) -> Result<Self, ExecError> {
        if spec.check_on_start && spec.key.is_none() {
            return Err(ExecError::Config(format!(
                "webhook '{name}' checkOnStart requires a key"
            )));
        }
        let prefix = format!("Webhooks/{name}");
        Ok(Self {
            name: name.to_string(),
            default_key: spec.key.as_deref().map(ValueString::parse).transpose()?,
            default_id: spec.id.as_deref().map(ValueString::parse).transpose()?,
            default_ttl: spec.ttl,
            check_on_start: spec.check_on_start,
            check: Arc::new(Function::compile(api_name, "check", Some(&prefix), &spec.check, false)?),
            add: Arc::new(Function::compile(api_name, "add", Some(&prefix), &spec.add, false)?),
            remove: Arc::new(Function::compile(api_name, "remove", Some(&prefix), &spec.remove, false)?),
            // The handle role only processes inbound deliveries.
            handle: Arc::new(Function::compile(api_name, "handle", Some(&prefix), &spec.handle, true)?),
            keys: RwLock::new(HashMap::new()),
        })
    }

    pub fn callback_url(api: &Api, webhook: &str, key: &str) -> String {
        format!(
            "{}/system/{}/{}/{}/{}",
            api.ctx.base_url.trim_end_matches('/'),
            WEBHOOK_ENDPOINT,
            api.id,
            webhook,
            key
        )
    }

    fn ttl_date(days: Option<i64>) -> Option<DateTime<Utc>> {
        days.map(|days| Utc::now() + chrono::Duration::days(days))
    }

    pub fn key(&self, key: &str) -> Result<Arc<WebhookKey>, ExecError> {
        self.keys
            .read()
            .expect("keys lock")
            .get(key)
            .cloned()
            .ok_or_else(|| ExecError::WebhookKeyNotFound(key.to_string()))
    }

    pub fn keys(&self) -> Vec<Arc<WebhookKey>> {
        self.keys.read().expect("keys lock").values().cloned().collect()
    }

    pub async fn key_or_create(
        self: &Arc<Self>,
        api: &Arc<Api>,
        key: String,
        id: Option<String>,
        ttl_days: Option<i64>,
    ) -> Result<Arc<WebhookKey>, ExecError> {
        if let Some(existing) = self.keys.read().expect("keys lock").get(&key) {
            return Ok(existing.clone());
        }
        self.add_key(api, key, id, Self::ttl_date(ttl_days)).await
    }

    async fn add_key(
        self: &Arc<Self>,
        api: &Arc<Api>,
        key: String,
        id: Option<String>,
        ttl: Option<DateTime<Utc>>,
    ) -> Result<Arc<WebhookKey>, ExecError> {
        let record = WebhookKeyRecord {
            api_id: api.id,
            name: self.name.clone(),
            key: key.clone(),
            uid: id,
            url: Self::callback_url(api, &self.name, &key),
            ttl,
        };
        api.ctx.records.upsert_webhook_key(record.clone()).await?;

        let webhook_key = Arc::new(WebhookKey::from_record(&self.name, record));
        webhook_key.init_tags(api, self).await;
        webhook_key.update_tags(api).await;
        self.keys
            .write()
            .expect("keys lock")
            .insert(key, webhook_key.clone());
        Ok(webhook_key)
    }

    pub async fn startup(self: &Arc<Self>, api: &Arc<Api>) -> Result<(), ExecError> {
        debug!(webhook = %self.name, "starting up");

        for record in api.ctx.records.list_webhook_keys(api.id, &self.name).await? {
            let key = record.key.clone();
            let webhook_key = Arc::new(WebhookKey::from_record(&self.name, record));
            webhook_key.init_tags(api, self).await;
            webhook_key.update_tags(api).await;
            self.keys.write().expect("keys lock").insert(key, webhook_key);
        }

        if self.check_on_start {
            if self.keys.read().expect("keys lock").is_empty() {
                let ctx = EvalContext::new(api.as_ref());
                let key = self
                    .default_key
                    .as_ref()
                    .expect("checkOnStart requires key")
                    .value(&ctx)?;
                let id = self.default_id.as_ref().map(|v| v.value(&ctx)).transpose()?;
                self.add_key(api, key, id, Self::ttl_date(self.default_ttl))
                    .await?;
            }

            for webhook_key in self.keys() {
                let scope: Arc<dyn VariableScope> =
                    Arc::new(WebhookScope::for_key(webhook_key.clone()));
                spawn_cycle(api.clone(), self.clone(), webhook_key, Some(scope));
            }
        }
        Ok(())
    }

    pub async fn shutdown(&self) {
        debug!(webhook = %self.name, "shutting down");
        for key in self.keys() {
            key.cancel_recheck();
        }
        self.check.shutdown().await;
        self.add.shutdown().await;
        self.remove.shutdown().await;
        self.handle.shutdown().await;
    }

    pub async fn mark_inactive(&self, api: &Api, status: FunctionStatus) {
        self.check.set_status(api, status).await;
        self.add.set_status(api, status).await;
        self.remove.set_status(api, status).await;
    }

    /// Inbound delivery: format the body and run the handle function's
    /// action list in the key's scope.
    pub async fn handle_delivery(
        self: &Arc<Self>,
        api: &Arc<Api>,
        key: &Arc<WebhookKey>,
        content_type: &str,
        body: &str,
    ) -> Result<(), ExecError> {
        let scope: Arc<dyn VariableScope> = Arc::new(WebhookScope::for_key(key.clone()));
        let ctx = EvalContext::new(api.as_ref())
            .with_scope(scope.as_ref())
            .with_response(body);
        let formatted = self.handle.response_format.format(&ctx, body.to_string())?;
        let invocation =
            InvocationVars::new(self.handle.name.clone(), self.handle.published_vars.clone());
        self.handle
            .actions
            .handle_response(
                api,
                &self.handle,
                &invocation,
                Some(scope),
                200,
                content_type,
                &formatted,
            )
            .await
    }
}

/// The runtime/persisted state of one registered key.
pub struct WebhookKey {
    pub webhook: String,
    pub key: String,
    id: RwLock<Option<String>>,
    pub url: String,
    ttl: RwLock<Option<DateTime<Utc>>>,
    exists: AtomicBool,
    last_check: RwLock<Option<DateTime<Utc>>>,
    ttl_handle: Mutex<Option<JoinHandle<()>>>,
}

impl WebhookKey {
    fn from_record(webhook: &str, record: WebhookKeyRecord) -> Self {
        Self {
            webhook: webhook.to_string(),
            key: record.key,
            id: RwLock::new(record.uid),
            url: record.url,
            ttl: RwLock::new(record.ttl),
            exists: AtomicBool::new(false),
            last_check: RwLock::new(None),
            ttl_handle: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Option<String> {
        self.id.read().expect("id lock").clone()
    }

    pub fn exists(&self) -> bool {
        self.exists.load(Ordering::Acquire)
    }

    fn tag_prefix(&self, api_name: &str) -> String {
        format!("{}/Webhooks/{}/{}", api_name, self.webhook, self.key)
    }

    /// Milliseconds until the TTL expires; `None` when unset or already
    /// past.
    fn ttl_remaining(&self) -> Option<std::time::Duration> {
        let ttl = (*self.ttl.read().expect("ttl lock"))?;
        (ttl - Utc::now()).to_std().ok()
    }

    async fn init_tags(self: &Arc<Self>, api: &Arc<Api>, webhook: &Arc<Webhook>) {
        let prefix = self.tag_prefix(&api.name);
        let tags = &api.ctx.tags;
        let _ = tags.configure_tag(&format!("{prefix}/Id"), TagDataType::String, None).await;
        let _ = tags.configure_tag(&format!("{prefix}/URL"), TagDataType::String, None).await;
        let _ = tags.configure_tag(&format!("{prefix}/TTL"), TagDataType::DateTime, None).await;
        let _ = tags
            .configure_tag(&format!("{prefix}/Last Check"), TagDataType::DateTime, None)
            .await;
        let _ = tags
            .configure_tag(&format!("{prefix}/Exists"), TagDataType::Boolean, None)
            .await;
        let _ = tags
            .configure_tag(&format!("{prefix}/Remove"), TagDataType::Boolean, Some(json!(false)))
            .await;
        let handler = Arc::new(RemoveKeyHandler {
            api: Arc::downgrade(api),
            webhook: webhook.name.clone(),
            key: self.key.clone(),
        });
        let _ = tags
            .register_write_handler(&format!("{prefix}/Remove"), handler)
            .await;
    }

    async fn update_tags(&self, api: &Api) {
        let prefix = self.tag_prefix(&api.name);
        let tags = &api.ctx.tags;
        let _ = tags
            .tag_update(&format!("{prefix}/Id"), self.id().map(JsonValue::String).unwrap_or(JsonValue::Null))
            .await;
        let _ = tags.tag_update(&format!("{prefix}/URL"), json!(self.url)).await;
        let ttl = self.ttl.read().expect("ttl lock").map(|t| json!(t.to_rfc3339()));
        let _ = tags
            .tag_update(&format!("{prefix}/TTL"), ttl.unwrap_or(JsonValue::Null))
            .await;
        let last = self
            .last_check
            .read()
            .expect("last check lock")
            .map(|t| json!(t.to_rfc3339()));
        let _ = tags
            .tag_update(&format!("{prefix}/Last Check"), last.unwrap_or(JsonValue::Null))
            .await;
        let _ = tags
            .tag_update(&format!("{prefix}/Exists"), json!(self.exists()))
            .await;
    }

    async fn remove_tags(&self, api: &Api) {
        let prefix = self.tag_prefix(&api.name);
        let _ = api.ctx.tags.remove_tag(&prefix).await;
    }

    fn record(&self, api: &Api) -> WebhookKeyRecord {
        WebhookKeyRecord {
            api_id: api.id,
            name: self.webhook.clone(),
            key: self.key.clone(),
            uid: self.id(),
            url: self.url.clone(),
            ttl: *self.ttl.read().expect("ttl lock"),
        }
    }

    pub fn cancel_recheck(&self) {
        if let Some(handle) = self.ttl_handle.lock().expect("ttl handle lock").take() {
            handle.abort();
        }
    }

    pub fn recheck_scheduled(&self) -> bool {
        self.ttl_handle.lock().expect("ttl handle lock").is_some()
    }

    /// The runnable cycle: probe existence, register if absent (capturing a
    /// returned external id), then schedule the TTL re-check.
    async fn run_cycle(
        self: Arc<Self>,
        api: Arc<Api>,
        webhook: Arc<Webhook>,
        scope: ScopeArg,
    ) {
        let mut exists = false;

        let status = call_blocking(&api, &webhook.check, scope.clone()).await;
        if matches!(status, Some(s) if (200..300).contains(&s)) {
            exists = true;
        }
        *self.last_check.write().expect("last check lock") = Some(Utc::now());

        if !exists {
            let status = call_blocking(&api, &webhook.add, scope.clone()).await;
            if matches!(status, Some(s) if (200..300).contains(&s)) {
                exists = true;
                match webhook.add.published_var("id") {
                    Some(id) => {
                        *self.id.write().expect("id lock") = Some(id);
                        if let Err(e) = api.ctx.records.upsert_webhook_key(self.record(&api)).await
                        {
                            error!(key = %self.key, error = %e, "error persisting webhook id");
                        }
                    }
                    None => debug!(key = %self.key, "no webhook id variable published"),
                }
            }
        }

        self.exists.store(exists, Ordering::Release);
        self.schedule_recheck(&api, &webhook);
        self.update_tags(&api).await;
    }

    /// Re-check at TTL expiry, replacing any previously scheduled check.
    fn schedule_recheck(self: &Arc<Self>, api: &Arc<Api>, webhook: &Arc<Webhook>) {
        if !self.exists() {
            return;
        }
        let Some(delay) = self.ttl_remaining() else {
            return;
        };

        self.cancel_recheck();

        let key = self.clone();
        let api = api.clone();
        let webhook = webhook.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let scope: Arc<dyn VariableScope> = Arc::new(WebhookScope::for_key(key.clone()));
            key.run_cycle(api, webhook, Some(scope)).await;
        });
        *self.ttl_handle.lock().expect("ttl handle lock") = Some(handle);
    }
}

/// Kick off one check/add cycle on the shared pool.
pub fn spawn_cycle(
    api: Arc<Api>,
    webhook: Arc<Webhook>,
    key: Arc<WebhookKey>,
    scope: ScopeArg,
) {
    tokio::spawn(async move {
        key.run_cycle(api, webhook, scope).await;
    });
}

/// Variable scope exposing a key's fields (`key`, `id`, `name`, `url`) plus
/// any per-item variables stashed by a webhook action.
pub struct WebhookScope {
    name: &'static str,
    key: Arc<WebhookKey>,
    local: RwLock<HashMap<String, JsonValue>>,
}

impl WebhookScope {
    /// Scope for a webhook action's handler variables.
    pub fn new(key: Arc<WebhookKey>) -> Self {
        Self {
            name: "handler",
            key,
            local: RwLock::new(HashMap::new()),
        }
    }

    /// Scope of the key itself (scheduled cycles, deliveries).
    pub fn for_key(key: Arc<WebhookKey>) -> Self {
        Self {
            name: "webhook",
            key,
            local: RwLock::new(HashMap::new()),
        }
    }

    pub fn put(&self, name: &str, value: JsonValue) {
        self.local
            .write()
            .expect("webhook scope lock")
            .insert(name.to_string(), value);
    }
}

impl VariableScope for WebhookScope {
    fn store_name(&self) -> &str {
        self.name
    }

    fn get(&self, name: &str) -> Option<String> {
        match name {
            "key" => return Some(self.key.key.clone()),
            "id" => return self.key.id(),
            "name" => return Some(self.key.webhook.clone()),
            "url" => return Some(self.key.url.clone()),
            _ => {}
        }
        self.local
            .read()
            .expect("webhook scope lock")
            .get(name)
            .map(value_to_string)
    }
}

/// Write handler on `<key>/Remove`: invokes the remove function, deletes
/// the persisted record, drops the in-memory key and clears its mirrored
/// tags. Every sub-step is best-effort.
struct RemoveKeyHandler {
    api: Weak<Api>,
    webhook: String,
    key: String,
}

#[async_trait]
impl WriteHandler for RemoveKeyHandler {
    async fn write(&self, _path: &str, _value: JsonValue) -> WriteQuality {
        let Some(api) = self.api.upgrade() else {
            return WriteQuality::Error;
        };
        let Ok(webhook) = api.webhook(&self.webhook) else {
            return WriteQuality::Error;
        };
        let Ok(key) = webhook.key(&self.key) else {
            return WriteQuality::Error;
        };

        let prefix = key.tag_prefix(&api.name);
        let _ = api
            .ctx
            .tags
            .tag_update(&format!("{prefix}/Remove"), json!(false))
            .await;

        let mut failed = false;

        let scope: Arc<dyn VariableScope> = Arc::new(WebhookScope::for_key(key.clone()));
        let status = call_blocking(&api, &webhook.remove, Some(scope)).await;
        if !matches!(status, Some(s) if (200..300).contains(&s)) {
            error!(key = %self.key, "error calling webhook remove function");
            failed = true;
        }

        if let Err(e) = api
            .ctx
            .records
            .delete_webhook_key(api.id, &self.webhook, &self.key)
            .await
        {
            error!(key = %self.key, error = %e, "error removing webhook from record store");
            failed = true;
        }

        key.cancel_recheck();
        webhook.keys.write().expect("keys lock").remove(&self.key);
        key.remove_tags(&api).await;

        if failed {
            WriteQuality::Error
        } else {
            WriteQuality::Good
        }
    }
}
