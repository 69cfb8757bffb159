use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use apiweave_core::types::{
    BodySpec, BodyType, FunctionSpec, HeaderSpec, Method, ParamSpec, ResponseFormatSpec,
    ResponseFormatType, ResponseType, ScheduleSpec,
};
use apiweave_core::{EvalContext, ValueString};
use base64::Engine as _;
use serde_json::Value as JsonValue;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::actions::Actions;
use crate::api::Api;
use crate::error::ExecError;
use crate::http::HttpBody;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionState {
    Pending,
    Running,
}

impl FunctionState {
    pub fn display(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FunctionStatus {
    #[default]
    Unknown,
    Success,
    Failed,
    Disabled,
    TrialExpired,
}

impl FunctionStatus {
    pub fn display(&self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Success => "Success",
            Self::Failed => "Failed",
            Self::Disabled => "Disabled",
            Self::TrialExpired => "Trial Expired",
        }
    }
}

/// An expression-valued header.
#[derive(Debug, Clone)]
pub struct Header {
    pub key: String,
    pub value: ValueString,
}

impl Header {
    pub fn compile(specs: &[HeaderSpec]) -> Result<Vec<Self>, ExecError> {
        specs
            .iter()
            .map(|spec| {
                Ok(Self {
                    key: spec.key.clone(),
                    value: ValueString::parse(&spec.value)?,
                })
            })
            .collect()
    }

    pub fn evaluate(
        headers: &[Self],
        ctx: &EvalContext<'_>,
    ) -> Result<BTreeMap<String, String>, ExecError> {
        let mut out = BTreeMap::new();
        for header in headers {
            out.insert(header.key.clone(), header.value.value(ctx)?);
        }
        Ok(out)
    }
}

#[derive(Debug, Clone)]
pub enum ParamValue {
    Expr(ValueString),
    Literal(JsonValue),
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub value: ParamValue,
}

impl Param {
    pub fn compile(specs: &[ParamSpec]) -> Result<Vec<Self>, ExecError> {
        specs
            .iter()
            .map(|spec| {
                let value = match &spec.value {
                    JsonValue::String(text) => ParamValue::Expr(ValueString::parse(text)?),
                    other => ParamValue::Literal(other.clone()),
                };
                Ok(Self {
                    name: spec.name.clone(),
                    value,
                })
            })
            .collect()
    }

    pub fn evaluate(
        params: &[Self],
        ctx: &EvalContext<'_>,
    ) -> Result<Vec<(String, String)>, ExecError> {
        let mut out = Vec::with_capacity(params.len());
        for param in params {
            let value = match &param.value {
                ParamValue::Expr(expr) => expr.value(ctx)?,
                ParamValue::Literal(value) => crate::vars::value_to_string(value),
            };
            out.push((param.name.clone(), value));
        }
        Ok(out)
    }

    fn evaluate_json(
        params: &[Self],
        ctx: &EvalContext<'_>,
    ) -> Result<serde_json::Map<String, JsonValue>, ExecError> {
        let mut out = serde_json::Map::new();
        for param in params {
            let value = match &param.value {
                ParamValue::Expr(expr) => JsonValue::String(expr.value(ctx)?),
                ParamValue::Literal(value) => value.clone(),
            };
            out.insert(param.name.clone(), value);
        }
        Ok(out)
    }
}

/// The request body specification, compiled.
#[derive(Debug, Clone, Default)]
pub struct Body {
    kind: BodyType,
    value: Option<ValueString>,
    content_type: Option<String>,
    params: Vec<Param>,
}

impl Body {
    pub fn compile(spec: Option<&BodySpec>) -> Result<Self, ExecError> {
        let Some(spec) = spec else {
            return Ok(Self::default());
        };
        Ok(Self {
            kind: spec.r#type,
            value: spec
                .value
                .as_deref()
                .map(ValueString::parse)
                .transpose()?,
            content_type: spec.content_type.clone(),
            params: Param::compile(&spec.params)?,
        })
    }

    /// Headers contributed by the body content type.
    pub fn headers(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        if self.kind == BodyType::Json {
            out.insert("Content-Type".to_string(), "application/json".to_string());
        } else if let Some(content_type) = &self.content_type {
            out.insert("Content-Type".to_string(), content_type.clone());
        }
        out
    }

    pub fn build(&self, ctx: &EvalContext<'_>) -> Result<Option<HttpBody>, ExecError> {
        match self.kind {
            BodyType::None => Ok(None),
            BodyType::Form => Ok(Some(HttpBody::Form(Param::evaluate(&self.params, ctx)?))),
            BodyType::Text => {
                let value = self
                    .value
                    .as_ref()
                    .ok_or_else(|| ExecError::Config("text body missing value".to_string()))?;
                Ok(Some(HttpBody::Raw(value.value(ctx)?)))
            }
            BodyType::Json => {
                let rendered = if !self.params.is_empty() {
                    JsonValue::Object(Param::evaluate_json(&self.params, ctx)?).to_string()
                } else {
                    let value = self
                        .value
                        .as_ref()
                        .ok_or_else(|| ExecError::Config("json body missing value".to_string()))?;
                    let text = value.value(ctx)?;
                    // Round-trip through serde to reject malformed documents.
                    serde_json::from_str::<JsonValue>(&text)
                        .map_err(|e| ExecError::Processing(format!("invalid json body: {e}")))?
                        .to_string()
                };
                Ok(Some(HttpBody::Raw(rendered)))
            }
        }
    }
}

/// The optional response rewrite applied before action dispatch.
#[derive(Debug, Clone, Default)]
pub struct ResponseFormat {
    kind: ResponseFormatType,
    value: Option<ValueString>,
}

impl ResponseFormat {
    pub fn compile(spec: Option<&ResponseFormatSpec>) -> Result<Self, ExecError> {
        let Some(spec) = spec else {
            return Ok(Self::default());
        };
        Ok(Self {
            kind: spec.r#type,
            value: Some(ValueString::parse(&spec.value)?),
        })
    }

    pub fn format(&self, ctx: &EvalContext<'_>, response: String) -> Result<String, ExecError> {
        let mut response = response;
        if let Some(value) = &self.value {
            let ctx = EvalContext {
                scope: ctx.scope,
                resolver: ctx.resolver,
                response: Some(&response),
                item: ctx.item,
            };
            response = value.value(&ctx)?;
        }
        if self.kind == ResponseFormatType::B64decode {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(response.trim())
                .map_err(|e| ExecError::Processing(format!("base64 decode failed: {e}")))?;
            response = String::from_utf8_lossy(&bytes).to_string();
        }
        Ok(response)
    }
}

/// A named, schedulable HTTP call plus its response handling. Runtime state
/// (status, published variables, schedule handles) lives here; everything
/// else is compiled once from the configuration.
pub struct Function {
    pub name: String,
    /// Path segment under the API for status tags; webhook sub-functions use
    /// `Webhooks/<name>`.
    pub tag_prefix: Option<String>,
    pub url: Option<ValueString>,
    pub method: Method,
    pub headers: Vec<Header>,
    pub params: Vec<Param>,
    pub body: Body,
    pub response_type: ResponseType,
    pub response_format: ResponseFormat,
    pub schedule: Option<ScheduleSpec>,
    pub actions: Actions,
    /// (target, always) — run the target first on every call (`always`) or
    /// only until it has executed once.
    pub depends: Option<(String, bool)>,
    pub redirect_no_headers: bool,
    pub allowed_error_codes: Vec<u16>,

    has_executed: AtomicBool,
    status: RwLock<FunctionStatus>,
    /// Local variables published by the latest invocation, readable through
    /// `{{var::<function>.<name>}}`.
    pub(crate) published_vars: Arc<RwLock<HashMap<String, JsonValue>>>,
    pub(crate) schedule_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Function {
    pub fn compile(
        api_name: &str,
        name: &str,
        tag_prefix: Option<&str>,
        spec: &FunctionSpec,
        relaxed_url: bool,
    ) -> Result<Self, ExecError> {
        let url = match (&spec.url, relaxed_url) {
            (Some(url), _) => Some(ValueString::parse(url)?),
            (None, true) => None,
            (None, false) => {
                return Err(ExecError::Config(format!("function '{name}' missing url")))
            }
        };

        Ok(Self {
            name: name.to_string(),
            tag_prefix: tag_prefix.map(str::to_string),
            url,
            method: spec.method,
            headers: Header::compile(&spec.headers)?,
            params: Param::compile(&spec.params)?,
            body: Body::compile(spec.body.as_ref())?,
            response_type: spec.response_type,
            response_format: ResponseFormat::compile(spec.response_format.as_ref())?,
            schedule: spec.schedule.clone(),
            actions: Actions::compile(
                &spec.actions,
                crate::actions::CompileCtx {
                    api_name,
                    function_name: name,
                },
            )?,
            depends: spec.dependency().map(|(n, always)| (n.to_string(), always)),
            redirect_no_headers: spec.redirect_no_headers,
            allowed_error_codes: spec.allowed_error_codes.iter().map(|c| c.code).collect(),
            has_executed: AtomicBool::new(false),
            status: RwLock::new(FunctionStatus::Unknown),
            published_vars: Arc::new(RwLock::new(HashMap::new())),
            schedule_handles: Mutex::new(Vec::new()),
        })
    }

    pub fn has_executed(&self) -> bool {
        self.has_executed.load(Ordering::Acquire)
    }

    pub fn mark_executed(&self) {
        self.has_executed.store(true, Ordering::Release);
    }

    pub fn status(&self) -> FunctionStatus {
        *self.status.read().expect("status lock")
    }

    pub fn published_var(&self, name: &str) -> Option<String> {
        self.published_vars
            .read()
            .expect("published lock")
            .get(name)
            .map(|v| crate::vars::value_to_string(v))
    }

    fn tag_root(&self, api_name: &str) -> String {
        let prefix = self.tag_prefix.as_deref().unwrap_or("Functions");
        format!("{}/{}/{}", api_name, prefix, self.name)
    }

    pub async fn update_status_tag(&self, api: &Api, tag: &str, value: JsonValue) {
        let path = format!("{}/Status/{}", self.tag_root(&api.name), tag);
        if let Err(e) = api.ctx.tags.tag_update(&path, value).await {
            debug!(path = %path, error = %e, "status tag update failed");
        }
    }

    pub async fn set_status(&self, api: &Api, status: FunctionStatus) {
        *self.status.write().expect("status lock") = status;
        self.update_status_tag(api, "Status", JsonValue::String(status.display().to_string()))
            .await;
    }

    /// Mark disabled/expired without executing (startup short-circuit).
    pub async fn mark_inactive(&self, api: &Api, status: FunctionStatus) {
        self.set_status(api, status).await;
    }

    pub async fn startup(self: &Arc<Self>, api: &Arc<Api>) {
        debug!(function = %self.name, "starting up");
        self.update_status_tag(
            api,
            "State",
            JsonValue::String(FunctionState::Pending.display().to_string()),
        )
        .await;
        self.set_status(api, FunctionStatus::Unknown).await;
        if let Some(schedule) = &self.schedule {
            self.update_status_tag(api, "Schedule", JsonValue::String(schedule.to_string()))
                .await;
            crate::schedule::start(api, self);
        }
    }

    pub async fn shutdown(&self) {
        debug!(function = %self.name, "shutting down");
        for handle in self.schedule_handles.lock().expect("handles lock").drain(..) {
            handle.abort();
        }
        self.actions.shutdown();
    }

    pub fn next_execution(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        match &self.schedule {
            Some(ScheduleSpec::Timer { duration, unit }) => Some(
                chrono::Utc::now()
                    + chrono::Duration::seconds(unit.to_seconds(*duration) as i64),
            ),
            _ => None,
        }
    }
}
