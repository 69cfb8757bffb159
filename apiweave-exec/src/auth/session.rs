use std::sync::atomic::{AtomicBool, Ordering};

use apiweave_core::types::SessionAuthSpec;
use apiweave_core::ValueString;
use serde_json::{json, Value as JsonValue};
use tracing::debug;

use crate::api::Api;
use crate::auth::AuthError;
use crate::error::ExecError;
use crate::executor::ScopeArg;
use crate::function::Param;
use crate::http::{HttpBody, HttpRequest};

pub const VARIABLE_SESSION_USER: &str = "authType-session-username";
pub const VARIABLE_SESSION_PASSWORD: &str = "authType-session-password";

/// Cookie-based login: one successful POST marks the shared session
/// authenticated; the cookie jar carries the state.
pub struct SessionAuth {
    url: ValueString,
    params: Vec<Param>,
    authenticated: AtomicBool,
}

impl SessionAuth {
    pub fn compile(spec: &SessionAuthSpec) -> Result<Self, ExecError> {
        Ok(Self {
            url: ValueString::parse(&spec.url)?,
            params: Param::compile(&spec.params)?,
            authenticated: AtomicBool::new(false),
        })
    }

    pub async fn initialize_variables(&self, api: &Api) -> Result<(), ExecError> {
        api.variables
            .declare(VARIABLE_SESSION_USER, true, false, false, None)
            .await?;
        api.variables
            .declare(VARIABLE_SESSION_PASSWORD, true, false, true, None)
            .await
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }

    pub async fn authenticate(&self, api: &Api, scope: ScopeArg) -> Result<(), ExecError> {
        let ctx = crate::executor::eval_ctx(api, &scope);
        let url = self.url.value(&ctx)?;

        let mut body = serde_json::Map::new();
        body.insert(
            "username".to_string(),
            json!(api.variables.get(VARIABLE_SESSION_USER).unwrap_or_default()),
        );
        body.insert(
            "password".to_string(),
            json!(api
                .variables
                .get(VARIABLE_SESSION_PASSWORD)
                .unwrap_or_default()),
        );
        for (name, value) in Param::evaluate(&self.params, &ctx)? {
            body.insert(name, json!(value));
        }

        let mut request = HttpRequest::new("POST", url.clone());
        request
            .headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        request.body = Some(HttpBody::Raw(JsonValue::Object(body).to_string()));

        debug!(api = %api.name, url = %url, "session login");
        let response = api.http.send(request).await?;

        if response.is_success() {
            self.authenticated.store(true, Ordering::Release);
            Ok(())
        } else {
            debug!(status = response.status, "failed authentication");
            self.authenticated.store(false, Ordering::Release);
            Err(AuthError::FailedLogin {
                kind: "session",
                status: response.status,
            }
            .into())
        }
    }
}
