use apiweave_core::types::TokenAuthSpec;
use apiweave_core::ValueString;
use chrono::{NaiveDateTime, Utc};
use serde_json::{json, Value as JsonValue};
use tracing::{debug, error};

use crate::api::Api;
use crate::auth::AuthError;
use crate::error::ExecError;
use crate::executor::ScopeArg;
use crate::function::{Header, Param};
use crate::http::{HttpBody, HttpRequest};

pub const VARIABLE_TOKEN_USER: &str = "authType-token-username";
pub const VARIABLE_TOKEN_PASSWORD: &str = "authType-token-password";
pub const VARIABLE_TOKEN_EXPIRATION: &str = "authType-token-expiration";

pub const EXPIRATION_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Login POST returning named tokens stored as derived `auth-<name>`
/// variables, with an optional expiration window.
pub struct TokenAuth {
    url: ValueString,
    username_key: ValueString,
    password_key: ValueString,
    headers: Vec<Header>,
    params: Vec<Param>,
    expires_in: Option<i64>,
    tokens: Vec<String>,
}

impl TokenAuth {
    pub fn compile(spec: &TokenAuthSpec) -> Result<Self, ExecError> {
        Ok(Self {
            url: ValueString::parse(&spec.url)?,
            username_key: ValueString::parse(&spec.username_key)?,
            password_key: ValueString::parse(&spec.password_key)?,
            headers: Header::compile(&spec.headers)?,
            params: Param::compile(&spec.params)?,
            expires_in: spec.expires_in,
            tokens: spec.tokens.iter().map(|t| t.name.clone()).collect(),
        })
    }

    pub async fn initialize_variables(&self, api: &Api) -> Result<(), ExecError> {
        api.variables
            .declare(VARIABLE_TOKEN_USER, true, false, false, None)
            .await?;
        api.variables
            .declare(VARIABLE_TOKEN_PASSWORD, true, false, true, None)
            .await?;
        api.variables
            .declare(VARIABLE_TOKEN_EXPIRATION, false, true, false, None)
            .await
    }

    /// A missing `expiresIn` means the tokens never expire; otherwise a
    /// missing or past expiration record means re-login.
    fn has_expired(&self, api: &Api) -> Result<bool, ExecError> {
        if self.expires_in.is_none() {
            return Ok(false);
        }
        match api.variables.get(VARIABLE_TOKEN_EXPIRATION) {
            Some(text) => {
                let expiration = NaiveDateTime::parse_from_str(&text, EXPIRATION_FORMAT)
                    .map_err(|e| ExecError::Auth(AuthError::Expiration(e.to_string())))?
                    .and_utc();
                debug!(expiration = %text, "checking token expiration");
                Ok(expiration <= Utc::now())
            }
            None => Ok(true),
        }
    }

    pub fn is_authenticated(&self, api: &Api) -> Result<bool, ExecError> {
        Ok(!self.has_expired(api)?)
    }

    pub async fn authenticate(&self, api: &Api, scope: ScopeArg) -> Result<(), ExecError> {
        let ctx = crate::executor::eval_ctx(api, &scope);
        let url = self.url.value(&ctx)?;

        let mut headers = Header::evaluate(&self.headers, &ctx)?;
        headers.insert("Content-Type".to_string(), "application/json".to_string());

        let mut body = serde_json::Map::new();
        body.insert(
            self.username_key.value(&ctx)?,
            json!(api.variables.get(VARIABLE_TOKEN_USER).unwrap_or_default()),
        );
        body.insert(
            self.password_key.value(&ctx)?,
            json!(api
                .variables
                .get(VARIABLE_TOKEN_PASSWORD)
                .unwrap_or_default()),
        );
        for (name, value) in Param::evaluate(&self.params, &ctx)? {
            body.insert(name, json!(value));
        }

        let mut request = HttpRequest::new("POST", url.clone());
        request.headers = headers;
        request.body = Some(HttpBody::Raw(JsonValue::Object(body).to_string()));

        debug!(api = %api.name, url = %url, "token login");
        let response = api.http.send(request).await?;

        if !response.is_success() {
            debug!(status = response.status, "failed authentication");
            return Err(AuthError::FailedLogin {
                kind: "token",
                status: response.status,
            }
            .into());
        }

        match serde_json::from_str::<JsonValue>(&response.text()) {
            Ok(parsed) => {
                for token in &self.tokens {
                    if let Some(value) = parsed.get(token).and_then(JsonValue::as_str) {
                        api.variables
                            .set_hidden(&format!("auth-{token}"), value, true)
                            .await?;
                    }
                }
                if let Some(expires_in) = self.expires_in {
                    let expiration = (Utc::now() + chrono::Duration::seconds(expires_in))
                        .format(EXPIRATION_FORMAT)
                        .to_string();
                    api.variables
                        .set(VARIABLE_TOKEN_EXPIRATION, expiration)
                        .await?;
                }
            }
            Err(e) => error!(error = %e, "error parsing token response"),
        }
        Ok(())
    }
}
