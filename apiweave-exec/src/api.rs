use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use apiweave_core::types::ApiDocument;
use apiweave_core::{parse_document_str, validate_document, VariableResolver};
use apiweave_store::{ApiConfigRecord, RecordStore, TagStore};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::{debug, error};

use crate::auth::AuthStrategy;
use crate::compile::compile_document;
use crate::error::ExecError;
use crate::function::{Function, FunctionStatus};
use crate::http::{HttpClient, HttpOptions, ReqwestHttpClient};
use crate::script::ScriptBridge;
use crate::vars::ApiVariables;
use crate::webhook::Webhook;

/// Shared engine dependencies handed to every API instance.
pub struct EngineContext {
    pub tags: Arc<dyn TagStore>,
    pub records: Arc<dyn RecordStore>,
    pub scripts: Arc<dyn ScriptBridge>,
    /// Public base URL used to compose callback/webhook/file URLs.
    pub base_url: String,
    /// Root directory for stored files.
    pub data_dir: PathBuf,
    /// Host license state; expired licenses idle every instance.
    pub license_expired: bool,
    /// Transport override used instead of per-API reqwest clients
    /// (embedding, tests).
    pub http: Option<Arc<dyn HttpClient>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiStatus {
    Disabled,
    EmptyConfiguration,
    MissingCertificate,
    MissingVariables,
    Initializing,
    Initialized,
    Faulted,
    Starting,
    TrialExpired,
    NeedsAuthorization,
    Needs2faCode,
    Running,
}

impl ApiStatus {
    pub fn display(&self) -> &'static str {
        match self {
            Self::Disabled => "Disabled",
            Self::EmptyConfiguration => "Empty Configuration",
            Self::MissingCertificate => "Missing Certificate",
            Self::MissingVariables => "Missing Variables",
            Self::Initializing => "Initializing",
            Self::Initialized => "Initialized",
            Self::Faulted => "Faulted",
            Self::Starting => "Starting",
            Self::TrialExpired => "Trial Expired",
            Self::NeedsAuthorization => "Needs Authorization",
            Self::Needs2faCode => "Needs 2FA Code",
            Self::Running => "Running",
        }
    }
}

/// One running API instance: the compiled configuration plus runtime state.
/// Rebuilt from scratch whenever its configuration record changes.
pub struct Api {
    pub id: i64,
    pub name: String,
    pub enabled: bool,
    pub ctx: Arc<EngineContext>,
    pub http: Arc<dyn HttpClient>,
    pub auth: AuthStrategy,
    pub variables: ApiVariables,
    pub headers: Vec<crate::function::Header>,
    functions: HashMap<String, Arc<Function>>,
    webhooks: HashMap<String, Arc<Webhook>>,
    status: RwLock<ApiStatus>,
    /// Serializes authentication attempts; concurrent calls share one
    /// login instead of racing the token variables.
    pub(crate) auth_gate: tokio::sync::Mutex<()>,
}

impl Api {
    /// Build an instance from its configuration record. Configuration
    /// errors are fatal at this stage: the instance comes up `Faulted` with
    /// no functions active.
    pub async fn initialize(
        ctx: Arc<EngineContext>,
        record: &ApiConfigRecord,
    ) -> Result<Arc<Self>, ExecError> {
        let variables = ApiVariables::load(record.id, ctx.records.clone()).await?;

        let mut api = Self {
            id: record.id,
            name: record.name.clone(),
            enabled: record.enabled,
            ctx: ctx.clone(),
            http: match &ctx.http {
                Some(http) => http.clone(),
                None => Arc::new(
                    ReqwestHttpClient::build(&HttpOptions::default()).map_err(ExecError::Http)?,
                ),
            },
            auth: AuthStrategy::None,
            variables,
            headers: Vec::new(),
            functions: HashMap::new(),
            webhooks: HashMap::new(),
            status: RwLock::new(ApiStatus::Initializing),
            auth_gate: tokio::sync::Mutex::new(()),
        };

        let status = api.load_configuration(record).await;
        *api.status.get_mut() = status;

        let api = Arc::new(api);
        api.ctx
            .tags
            .tag_update(&format!("{}/Status", api.name), json!(status.display()))
            .await
            .ok();
        Ok(api)
    }

    async fn load_configuration(&mut self, record: &ApiConfigRecord) -> ApiStatus {
        let config = record.configuration.trim();
        debug!(api = %self.name, "loading configuration");
        if config.is_empty() {
            return ApiStatus::EmptyConfiguration;
        }

        let doc = match parse_document_str(config) {
            Ok(parsed) => parsed.document,
            Err(e) => {
                error!(api = %self.name, error = %e, "error parsing configuration");
                return ApiStatus::Faulted;
            }
        };

        let violations = validate_document(&doc);
        if !violations.is_empty() {
            for violation in &violations {
                error!(api = %self.name, violation = %violation, "configuration violation");
            }
            return ApiStatus::Faulted;
        }

        match self.apply_document(&doc).await {
            Ok(status) => status,
            Err(e) => {
                error!(api = %self.name, error = %e, "error loading configuration");
                ApiStatus::Faulted
            }
        }
    }

    async fn apply_document(&mut self, doc: &ApiDocument) -> Result<ApiStatus, ExecError> {
        let compiled = compile_document(&self.name, doc)?;
        self.auth = compiled.auth;
        self.headers = compiled.headers;
        self.functions = compiled.functions;
        self.webhooks = compiled.webhooks;

        let mut missing_certificate = false;
        let mut identity_pem = None;
        if doc.https_certificates {
            match self.ctx.records.get_certificate(self.id).await? {
                Some(cert) => match (cert.certificate, cert.private_key) {
                    (Some(certificate), Some(private_key))
                        if !certificate.is_empty() && !private_key.is_empty() =>
                    {
                        identity_pem = Some(format!("{certificate}\n{private_key}").into_bytes());
                    }
                    _ => missing_certificate = true,
                },
                None => missing_certificate = true,
            }
        }

        let options = HttpOptions {
            session: self.auth.requires_session() || doc.session,
            verify_tls: doc.https_verification,
            identity_pem,
            ..HttpOptions::default()
        };
        self.http = match &self.ctx.http {
            Some(http) => http.clone(),
            None => Arc::new(ReqwestHttpClient::build(&options).map_err(ExecError::Http)?),
        };

        for (name, spec) in &doc.variables {
            let value = if spec.uuid {
                Some(uuid::Uuid::new_v4().to_string())
            } else {
                spec.default.as_ref().map(crate::vars::value_to_string)
            };
            self.variables
                .declare(name, spec.required, spec.hidden, spec.sensitive, value)
                .await?;
        }

        self.auth.initialize_variables(self).await?;

        if !self.variables.init_complete().await? {
            Ok(ApiStatus::MissingVariables)
        } else if missing_certificate {
            Ok(ApiStatus::MissingCertificate)
        } else {
            Ok(ApiStatus::Initialized)
        }
    }

    pub async fn status(&self) -> ApiStatus {
        *self.status.read().await
    }

    pub async fn set_status(&self, status: ApiStatus) {
        *self.status.write().await = status;
        let _ = self
            .ctx
            .tags
            .tag_update(&format!("{}/Status", self.name), json!(status.display()))
            .await;
    }

    pub fn function(&self, name: &str) -> Result<Arc<Function>, ExecError> {
        self.functions
            .get(name)
            .cloned()
            .ok_or_else(|| ExecError::FunctionNotFound(name.to_string()))
    }

    pub fn functions(&self) -> Vec<Arc<Function>> {
        self.functions.values().cloned().collect()
    }

    pub fn webhook(&self, name: &str) -> Result<Arc<Webhook>, ExecError> {
        self.webhooks
            .get(name)
            .cloned()
            .ok_or_else(|| ExecError::WebhookNotFound(name.to_string()))
    }

    pub fn webhooks(&self) -> Vec<Arc<Webhook>> {
        self.webhooks.values().cloned().collect()
    }

    /// Startup pass: transitions are one-directional; only OAuth2 failure
    /// can later push Running back to NeedsAuthorization.
    pub async fn startup(self: &Arc<Self>) {
        debug!(api = %self.name, "starting up");

        if self.ctx.license_expired {
            self.set_status(ApiStatus::TrialExpired).await;
            self.mark_all(FunctionStatus::TrialExpired).await;
            return;
        }
        if !self.enabled {
            self.set_status(ApiStatus::Disabled).await;
            self.mark_all(FunctionStatus::Disabled).await;
            return;
        }
        if self.status().await != ApiStatus::Initialized {
            return;
        }

        if !self.auth.is_authorized(self) {
            self.set_status(ApiStatus::NeedsAuthorization).await;
            return;
        }

        self.set_status(ApiStatus::Starting).await;

        for webhook in self.webhooks.values() {
            if let Err(e) = webhook.startup(self).await {
                error!(api = %self.name, webhook = %webhook.name, error = %e, "error starting up webhook");
                self.set_status(ApiStatus::Faulted).await;
                return;
            }
        }
        for function in self.functions.values() {
            function.startup(self).await;
        }

        self.set_status(ApiStatus::Running).await;
    }

    async fn mark_all(&self, status: FunctionStatus) {
        for function in self.functions.values() {
            function.mark_inactive(self, status).await;
        }
        for webhook in self.webhooks.values() {
            webhook.mark_inactive(self, status).await;
        }
    }

    /// Best-effort teardown: cancellation failures are logged, never
    /// propagated.
    pub async fn shutdown(&self) {
        debug!(api = %self.name, "shutting down");
        for webhook in self.webhooks.values() {
            webhook.shutdown().await;
        }
        for function in self.functions.values() {
            function.shutdown().await;
        }
    }

    /// Health summary for the function collection.
    pub fn functions_status(&self) -> String {
        let mut running = 0;
        let mut unknown = 0;
        let mut failed = 0;
        for function in self.functions.values() {
            match function.status() {
                FunctionStatus::Success => running += 1,
                FunctionStatus::Unknown => unknown += 1,
                _ => failed += 1,
            }
        }
        format!("{running} running, {failed} failed, {unknown} unknown")
    }

    pub fn webhooks_status(&self) -> String {
        if self.webhooks.is_empty() {
            return String::new();
        }
        let mut running = 0;
        let mut waiting = 0;
        let mut failed = 0;
        for webhook in self.webhooks.values() {
            let check_ok = webhook.check.status() == FunctionStatus::Success;
            let add_ok = matches!(
                webhook.add.status(),
                FunctionStatus::Success | FunctionStatus::Unknown
            );
            if check_ok && add_ok {
                match webhook.handle.status() {
                    FunctionStatus::Success => running += 1,
                    FunctionStatus::Unknown => waiting += 1,
                    _ => failed += 1,
                }
            } else {
                failed += 1;
            }
        }
        format!("{running} running, {failed} failed, {waiting} waiting")
    }
}

impl VariableResolver for Api {
    fn api_name(&self) -> &str {
        &self.name
    }

    fn api_variable(&self, name: &str) -> Option<String> {
        self.variables.get(name)
    }

    fn function_exists(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    fn function_variable(&self, function: &str, name: &str) -> Option<String> {
        self.functions.get(function)?.published_var(name)
    }
}
