mod page;

use apiweave_core::types::{GrantType, OAuth2Spec};
use apiweave_core::{EvalContext, ValueString};
use base64::Engine as _;
use chrono::{NaiveDateTime, Utc};
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::api::{Api, ApiStatus};
use crate::auth::AuthError;
use crate::error::ExecError;
use crate::executor::ScopeArg;
use crate::function::Header;
use crate::http::{HttpBody, HttpRequest};
use crate::sanitize;

use super::token::EXPIRATION_FORMAT;

pub const VARIABLE_CLIENT_ID: &str = "authType-oauth2-client-id";
pub const VARIABLE_CLIENT_SECRET: &str = "authType-oauth2-client-secret";
pub const VARIABLE_USERNAME: &str = "authType-oauth2-username";
pub const VARIABLE_PASSWORD: &str = "authType-oauth2-password";
pub const VARIABLE_AUTHORIZATION_CODE: &str = "authType-oauth2-auth-code";
pub const VARIABLE_ACCESS_TOKEN: &str = "authType-oauth2-access-token";
pub const VARIABLE_TOKEN_TYPE: &str = "authType-oauth2-token-type";
pub const VARIABLE_EXPIRATION: &str = "authType-oauth2-expiration";
pub const VARIABLE_REFRESH_TOKEN: &str = "authType-oauth2-refresh-token";
pub const VARIABLE_2FA_CODE: &str = "authType-oauth2-2fa-code";
pub const VARIABLE_2FA_CODE_WAITING: &str = "authType-oauth2-2fa-code-waiting";
pub const VARIABLE_BEARER_CLIENT_ID: &str = "authType-oauth2-bearer-client-id";
pub const VARIABLE_BEARER_CLIENT_SECRET: &str = "authType-oauth2-bearer-client-secret";
pub const VARIABLE_BEARER_ACCESS_TOKEN: &str = "authType-oauth2-bearer-access-token";
pub const VARIABLE_PKCE_CODE_VERIFIER: &str = "authType-oauth2-pkce-code-verifier";
pub const VARIABLE_PKCE_CODE_CHALLENGE: &str = "authType-oauth2-pkce-code-challenge";

/// State carried across the multi-step authorization-page flow.
#[derive(Default)]
pub(crate) struct PageFlow {
    pub user_agent: Option<String>,
    pub redirect_url: Option<String>,
    pub params: Vec<(String, String)>,
    pub body: Vec<(String, String)>,
}

pub struct OAuth2 {
    grant_type: GrantType,
    auth_url: Option<ValueString>,
    access_token_url: ValueString,
    access_token_key: String,
    pub(crate) username_input: String,
    pub(crate) password_input: String,
    bearer_access_token_url: Option<ValueString>,
    redirect_url: Option<ValueString>,
    pub(crate) captcha_url: Option<ValueString>,
    headers: Vec<Header>,
    scope: Option<String>,
    client_id: Option<ValueString>,
    client_secret: Option<ValueString>,
    bearer_client_id: Option<ValueString>,
    bearer_client_secret: Option<ValueString>,
    bearer_grant_type: Option<String>,
    two_factor: bool,
    captcha: bool,
    pkce: bool,
    auth_code: bool,
    random_user_agent: bool,
    pub(crate) flow: Mutex<PageFlow>,
}

impl OAuth2 {
    pub fn compile(spec: &OAuth2Spec) -> Result<Self, ExecError> {
        if spec.grant_type == GrantType::Authorizationcode && spec.auth_url.is_none() {
            return Err(ExecError::Config("oauth2: missing auth url".to_string()));
        }
        if spec.grant_type != GrantType::Clientcredentials && spec.scope.is_none() {
            return Err(ExecError::Config("oauth2: missing scope".to_string()));
        }

        Ok(Self {
            grant_type: spec.grant_type,
            auth_url: spec.auth_url.as_deref().map(ValueString::parse).transpose()?,
            access_token_url: ValueString::parse(&spec.access_token_url)?,
            access_token_key: spec.access_token_key.clone(),
            username_input: spec.username_input.clone(),
            password_input: spec.password_input.clone(),
            bearer_access_token_url: spec
                .bearer_access_token_url
                .as_deref()
                .map(ValueString::parse)
                .transpose()?,
            redirect_url: spec
                .redirect_url
                .as_deref()
                .map(ValueString::parse)
                .transpose()?,
            captcha_url: spec
                .captcha_url
                .as_deref()
                .map(ValueString::parse)
                .transpose()?,
            headers: Header::compile(&spec.headers)?,
            scope: spec.scope.clone(),
            client_id: spec.client_id.as_deref().map(ValueString::parse).transpose()?,
            client_secret: spec
                .client_secret
                .as_deref()
                .map(ValueString::parse)
                .transpose()?,
            bearer_client_id: spec
                .bearer_client_id
                .as_deref()
                .map(ValueString::parse)
                .transpose()?,
            bearer_client_secret: spec
                .bearer_client_secret
                .as_deref()
                .map(ValueString::parse)
                .transpose()?,
            bearer_grant_type: spec.bearer_grant_type.clone(),
            two_factor: spec.two_factor,
            captcha: spec.captcha,
            pkce: spec.pkce,
            auth_code: spec.auth_code,
            random_user_agent: spec.random_user_agent,
            flow: Mutex::new(PageFlow::default()),
        })
    }

    pub async fn initialize_variables(&self, api: &Api) -> Result<(), ExecError> {
        let vars = &api.variables;

        if self.client_id.is_none() {
            vars.declare(VARIABLE_CLIENT_ID, true, false, false, None).await?;
        }

        if self.grant_type == GrantType::Password || self.pkce {
            vars.declare(VARIABLE_USERNAME, true, false, false, None).await?;
            vars.declare(VARIABLE_PASSWORD, true, false, true, None).await?;
        } else if self.client_secret.is_none() {
            vars.declare(VARIABLE_CLIENT_SECRET, true, false, true, None).await?;
        }

        if self.grant_type == GrantType::Authorizationcode {
            vars.declare(VARIABLE_AUTHORIZATION_CODE, false, true, true, None).await?;

            if self.pkce {
                vars.declare(VARIABLE_PKCE_CODE_VERIFIER, false, true, true, None).await?;
                vars.declare(VARIABLE_PKCE_CODE_CHALLENGE, false, true, true, None).await?;
            }

            if self.requires_bearer_token() {
                if self.bearer_client_id.is_none() {
                    vars.declare(VARIABLE_BEARER_CLIENT_ID, true, false, false, None).await?;
                }
                if self.bearer_client_secret.is_none() {
                    vars.declare(VARIABLE_BEARER_CLIENT_SECRET, true, false, true, None).await?;
                }
                vars.declare(VARIABLE_BEARER_ACCESS_TOKEN, false, true, true, None).await?;
            }
        }

        if self.two_factor {
            vars.declare(VARIABLE_2FA_CODE, false, true, true, None).await?;
            vars.declare(VARIABLE_2FA_CODE_WAITING, false, true, false, None).await?;
        }

        vars.declare(VARIABLE_ACCESS_TOKEN, false, true, true, None).await?;
        vars.declare(VARIABLE_TOKEN_TYPE, false, true, false, None).await?;
        vars.declare(VARIABLE_EXPIRATION, false, true, false, None).await?;
        vars.declare(VARIABLE_REFRESH_TOKEN, false, true, true, None).await
    }

    pub fn requires_bearer_token(&self) -> bool {
        self.bearer_access_token_url.is_some()
    }

    pub fn requires_pkce(&self) -> bool {
        self.pkce
    }

    pub fn requires_captcha(&self) -> bool {
        self.captcha
    }

    pub(crate) fn random_user_agent(&self) -> bool {
        self.random_user_agent
    }

    pub(crate) fn scope(&self) -> &str {
        self.scope.as_deref().unwrap_or_default()
    }

    fn plain_ctx<'a>(&self, api: &'a Api) -> EvalContext<'a> {
        EvalContext::new(api)
    }

    pub(crate) fn actual_client_id(&self, api: &Api) -> String {
        if let Some(client_id) = &self.client_id {
            if let Ok(value) = client_id.value(&self.plain_ctx(api)) {
                return value;
            }
        }
        api.variables.get(VARIABLE_CLIENT_ID).unwrap_or_default()
    }

    fn actual_client_secret(&self, api: &Api) -> Option<String> {
        if let Some(client_secret) = &self.client_secret {
            if let Ok(value) = client_secret.value(&self.plain_ctx(api)) {
                return Some(value);
            }
        }
        api.variables.get(VARIABLE_CLIENT_SECRET)
    }

    fn actual_bearer_client_id(&self, api: &Api) -> String {
        if let Some(id) = &self.bearer_client_id {
            if let Ok(value) = id.value(&self.plain_ctx(api)) {
                return value;
            }
        }
        api.variables.get(VARIABLE_BEARER_CLIENT_ID).unwrap_or_default()
    }

    fn actual_bearer_client_secret(&self, api: &Api) -> String {
        if let Some(secret) = &self.bearer_client_secret {
            if let Ok(value) = secret.value(&self.plain_ctx(api)) {
                return value;
            }
        }
        api.variables
            .get(VARIABLE_BEARER_CLIENT_SECRET)
            .unwrap_or_default()
    }

    /// Where the provider should send the operator back to.
    pub(crate) fn actual_redirect_url(&self, api: &Api) -> String {
        if let Some(redirect) = &self.redirect_url {
            if let Ok(value) = redirect.value(&self.plain_ctx(api)) {
                return value;
            }
        }
        format!("{}/system/oauth2", api.ctx.base_url.trim_end_matches('/'))
    }

    pub(crate) fn redirect_state(&self, api: &Api) -> String {
        format!("?id={}", api.id)
    }

    /// `None` means no expiration has been recorded yet; callers treat that
    /// as "not authenticated" but also as "do not attempt a refresh grant".
    fn has_expired(&self, api: &Api) -> Result<Option<bool>, ExecError> {
        let Some(text) = api.variables.get(VARIABLE_EXPIRATION) else {
            return Ok(None);
        };
        let expiration = NaiveDateTime::parse_from_str(&text, EXPIRATION_FORMAT)
            .map_err(|e| ExecError::Auth(AuthError::Expiration(e.to_string())))?
            .and_utc();
        debug!(expiration = %text, "checking oauth2 expiration");
        Ok(Some(expiration <= Utc::now()))
    }

    pub fn headers(&self, api: &Api) -> std::collections::BTreeMap<String, String> {
        let mut out = std::collections::BTreeMap::new();
        if self.requires_bearer_token() {
            let token = api
                .variables
                .get(VARIABLE_BEARER_ACCESS_TOKEN)
                .unwrap_or_default();
            out.insert("Authorization".to_string(), format!("Bearer {token}"));
        } else {
            let token_type = api.variables.get(VARIABLE_TOKEN_TYPE).unwrap_or_default();
            let token = api.variables.get(VARIABLE_ACCESS_TOKEN).unwrap_or_default();
            out.insert("Authorization".to_string(), format!("{token_type} {token}"));
        }
        out
    }

    pub fn is_authorized(&self, api: &Api) -> bool {
        if self.grant_type == GrantType::Authorizationcode {
            return api.variables.get(VARIABLE_AUTHORIZATION_CODE).is_some();
        }
        true
    }

    pub async fn is_authenticated(&self, api: &Api) -> Result<bool, ExecError> {
        let expired = self.has_expired(api)?;

        if self.grant_type == GrantType::Authorizationcode
            && api.variables.get(VARIABLE_AUTHORIZATION_CODE).is_none()
        {
            return Err(AuthError::NoAuthorizationCode.into());
        }
        if self.two_factor && api.variables.get(VARIABLE_2FA_CODE_WAITING).is_some() {
            api.set_status(ApiStatus::Needs2faCode).await;
            return Err(AuthError::Waiting2fa.into());
        }
        if api.variables.get(VARIABLE_ACCESS_TOKEN).is_none() {
            return Ok(false);
        }
        if self.requires_bearer_token()
            && api.variables.get(VARIABLE_BEARER_ACCESS_TOKEN).is_none()
        {
            return Ok(false);
        }
        // No expiration recorded counts as expired here.
        Ok(expired == Some(false))
    }

    /// Grant parameters for the token POST, varying by grant type and by
    /// whether this attempt may use the refresh token.
    fn grant_parameters(
        &self,
        api: &Api,
        expired: Option<bool>,
    ) -> Vec<(String, String)> {
        let mut params = Vec::new();

        if self.grant_type != GrantType::Clientcredentials {
            params.push(("client_id".to_string(), self.actual_client_id(api)));
        }

        if self.grant_type == GrantType::Password {
            params.push(("scope".to_string(), self.scope().to_string()));
            params.push((
                "username".to_string(),
                api.variables.get(VARIABLE_USERNAME).unwrap_or_default(),
            ));
            params.push((
                "password".to_string(),
                api.variables.get(VARIABLE_PASSWORD).unwrap_or_default(),
            ));
        } else if self.grant_type != GrantType::Clientcredentials {
            if let Some(secret) = self.actual_client_secret(api) {
                params.push(("client_secret".to_string(), secret));
            }
        }

        let refresh_token = api.variables.get(VARIABLE_REFRESH_TOKEN);
        if expired == Some(true) && refresh_token.is_some() {
            params.push((
                "refresh_token".to_string(),
                refresh_token.unwrap_or_default(),
            ));
            params.push(("grant_type".to_string(), GrantType::Refresh.wire().to_string()));
            params.push(("scope".to_string(), self.scope().to_string()));
        } else {
            params.push(("grant_type".to_string(), self.grant_type.wire().to_string()));

            if self.grant_type == GrantType::Authorizationcode {
                params.push((
                    "code".to_string(),
                    api.variables
                        .get(VARIABLE_AUTHORIZATION_CODE)
                        .unwrap_or_default(),
                ));
                params.push(("redirect_uri".to_string(), self.actual_redirect_url(api)));
                params.push(("scope".to_string(), self.scope().to_string()));
                params.push(("state".to_string(), self.redirect_state(api)));

                if self.pkce {
                    params.push((
                        "code_verifier".to_string(),
                        api.variables
                            .get(VARIABLE_PKCE_CODE_VERIFIER)
                            .unwrap_or_default(),
                    ));
                }
            }
        }

        params
    }

    async fn clear_token_variables(&self, api: &Api) -> Result<(), ExecError> {
        api.variables.clear(VARIABLE_AUTHORIZATION_CODE).await?;
        api.variables.clear(VARIABLE_ACCESS_TOKEN).await?;
        api.variables.clear(VARIABLE_REFRESH_TOKEN).await?;
        api.variables.clear(VARIABLE_EXPIRATION).await?;
        if self.requires_bearer_token() {
            api.variables.clear(VARIABLE_BEARER_ACCESS_TOKEN).await?;
        }
        Ok(())
    }

    /// Fatal authentication failure: drop all OAuth state and flip the API
    /// to NeedsAuthorization (unless a 2FA exchange is mid-flight).
    async fn needs_auth(&self, api: &Api) {
        if let Err(e) = self.clear_token_variables(api).await {
            error!(error = %e, "error clearing oauth2 state");
        }

        if api.status().await != ApiStatus::Needs2faCode {
            api.set_status(ApiStatus::NeedsAuthorization).await;
            api.shutdown().await;
            let _ = api.variables.clear(VARIABLE_2FA_CODE).await;
            let _ = api.variables.clear(VARIABLE_2FA_CODE_WAITING).await;
        }
    }

    pub async fn authenticate(&self, api: &Api, scope: ScopeArg) -> Result<(), ExecError> {
        let ctx = crate::executor::eval_ctx(api, &scope);
        let url = self.access_token_url.value(&ctx)?;
        let expired = self.has_expired(api)?;
        let params = self.grant_parameters(api, expired);

        let mut headers = Header::evaluate(&self.headers, &ctx)?;

        if self.grant_type == GrantType::Clientcredentials {
            let auth = format!(
                "{}:{}",
                self.actual_client_id(api),
                self.actual_client_secret(api).unwrap_or_default()
            );
            headers.insert(
                "Authorization".to_string(),
                format!(
                    "Basic {}",
                    base64::engine::general_purpose::STANDARD.encode(auth)
                ),
            );
        }

        let mut needs_2fa = false;
        if self.two_factor {
            match api.variables.get(VARIABLE_2FA_CODE) {
                Some(code) => {
                    headers.insert("2fa-support".to_string(), "true".to_string());
                    headers.insert("2fa-code".to_string(), code);
                }
                None => needs_2fa = true,
            }
        }

        if self.random_user_agent {
            let mut flow = self.flow.lock().await;
            let agent = flow
                .user_agent
                .get_or_insert_with(page::generate_user_agent)
                .clone();
            headers.insert("User-Agent".to_string(), agent);
        }

        let mut request = HttpRequest::new("POST", url.clone());
        request.headers = headers;
        request.body = Some(HttpBody::Form(params.clone()));

        debug!(
            api = %api.name,
            url = %url,
            body = %sanitize::params_for_log(&params),
            "oauth2 token request"
        );

        let response = api.http.send(request).await?;
        let response_text = response.text();
        debug!(api = %api.name, status = response.status, "oauth2 token response");

        if response.is_success() {
            match self.store_tokens(api, &response_text).await {
                Ok(()) => {
                    if self.requires_bearer_token() {
                        if let Err(e) = self.bearer_exchange(api, &scope).await {
                            self.needs_auth(api).await;
                            return Err(e);
                        }
                    }
                    Ok(())
                }
                Err(e) => {
                    error!(error = %e, "oauth2: error handling token response");
                    self.needs_auth(api).await;
                    Err(AuthError::NeedsAuthorization("oauth2").into())
                }
            }
        } else if response.status == 412 && needs_2fa {
            // The provider wants a second factor: stage "waiting", clear the
            // stale tokens and surface a recoverable error.
            api.variables.set(VARIABLE_2FA_CODE_WAITING, "yes").await?;
            api.set_status(ApiStatus::Needs2faCode).await;
            self.clear_token_variables(api).await?;
            Err(AuthError::Waiting2fa.into())
        } else {
            self.needs_auth(api).await;
            Err(AuthError::NeedsAuthorization("oauth2").into())
        }
    }

    async fn store_tokens(&self, api: &Api, response: &str) -> Result<(), ExecError> {
        let parsed: JsonValue = serde_json::from_str(response)
            .map_err(|e| ExecError::Processing(format!("oauth2: invalid token response: {e}")))?;

        let access_token = parsed
            .get(&self.access_token_key)
            .and_then(JsonValue::as_str)
            .ok_or_else(|| {
                ExecError::Processing(format!(
                    "oauth2: token response missing '{}'",
                    self.access_token_key
                ))
            })?;
        let token_type = parsed
            .get("token_type")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| {
                ExecError::Processing("oauth2: token response missing 'token_type'".to_string())
            })?;
        let expires_in = parsed
            .get("expires_in")
            .and_then(JsonValue::as_i64)
            .ok_or_else(|| {
                ExecError::Processing("oauth2: token response missing 'expires_in'".to_string())
            })?;

        let expiration = (Utc::now() + chrono::Duration::seconds(expires_in))
            .format(EXPIRATION_FORMAT)
            .to_string();

        api.variables.set(VARIABLE_ACCESS_TOKEN, access_token).await?;
        api.variables.set(VARIABLE_TOKEN_TYPE, token_type).await?;
        api.variables.set(VARIABLE_EXPIRATION, expiration).await?;

        if let Some(refresh) = parsed.get("refresh_token").and_then(JsonValue::as_str) {
            api.variables.set(VARIABLE_REFRESH_TOKEN, refresh).await?;
        }

        api.variables.clear(VARIABLE_2FA_CODE).await?;
        Ok(())
    }

    /// Trade the primary access token for a secondary bearer token.
    async fn bearer_exchange(&self, api: &Api, scope: &ScopeArg) -> Result<(), ExecError> {
        let ctx = crate::executor::eval_ctx(api, scope);
        let url = self
            .bearer_access_token_url
            .as_ref()
            .expect("bearer exchange requires url")
            .value(&ctx)?;

        let access_token = api.variables.get(VARIABLE_ACCESS_TOKEN).unwrap_or_default();

        let mut request = HttpRequest::new("POST", url.clone());
        request
            .headers
            .insert("Authorization".to_string(), format!("Bearer {access_token}"));
        request.body = Some(HttpBody::Form(vec![
            (
                "grant_type".to_string(),
                self.bearer_grant_type.clone().unwrap_or_default(),
            ),
            ("client_id".to_string(), self.actual_bearer_client_id(api)),
            (
                "client_secret".to_string(),
                self.actual_bearer_client_secret(api),
            ),
        ]));

        debug!(api = %api.name, url = %url, "oauth2 bearer token request");
        let response = api.http.send(request).await?;

        if !response.is_success() {
            return Err(ExecError::Processing(
                "oauth2: failed to get bearer access token".to_string(),
            ));
        }

        let parsed: JsonValue = serde_json::from_str(&response.text())
            .map_err(|e| ExecError::Processing(format!("oauth2: invalid bearer response: {e}")))?;
        let token = parsed
            .get("access_token")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| {
                ExecError::Processing("oauth2: bearer response missing 'access_token'".to_string())
            })?;
        api.variables.set(VARIABLE_BEARER_ACCESS_TOKEN, token).await
    }

    /// The provider authorization URL an operator should visit for the
    /// authorization-code grant.
    pub async fn authorization_url(&self, api: &Api) -> Result<String, ExecError> {
        let ctx = self.plain_ctx(api);
        let url = self
            .auth_url
            .as_ref()
            .ok_or_else(|| ExecError::Config("oauth2: missing auth url".to_string()))?
            .value(&ctx)?;

        if self.pkce {
            if self.auth_code {
                {
                    let mut flow = self.flow.lock().await;
                    flow.user_agent = None;
                }
                self.generate_code_challenge(api).await;
                let challenge = api
                    .variables
                    .get(VARIABLE_PKCE_CODE_CHALLENGE)
                    .unwrap_or_default();
                Ok(page::join_query(
                    &url,
                    &[
                        ("client_id", &self.actual_client_id(api)),
                        ("code_challenge", &challenge),
                        ("code_challenge_method", "S256"),
                        ("redirect_uri", &self.actual_redirect_url(api)),
                        ("response_type", "code"),
                        ("scope", self.scope()),
                        ("state", &self.redirect_state(api)),
                    ],
                ))
            } else {
                Ok(url)
            }
        } else {
            Ok(page::join_query(
                &url,
                &[
                    ("client_id", &self.actual_client_id(api)),
                    ("redirect_uri", &self.actual_redirect_url(api)),
                    ("response_type", "code"),
                    ("scope", self.scope()),
                    ("state", &self.redirect_state(api)),
                    ("access_type", "offline"),
                    ("prompt", "consent"),
                ],
            ))
        }
    }

    pub(crate) async fn generate_code_challenge(&self, api: &Api) {
        let verifier = page::generate_code_verifier();
        let challenge = page::code_challenge(&verifier);
        if let Err(e) = api
            .variables
            .set_hidden(VARIABLE_PKCE_CODE_VERIFIER, verifier, true)
            .await
        {
            error!(error = %e, "error storing code verifier");
        }
        if let Err(e) = api
            .variables
            .set_hidden(VARIABLE_PKCE_CODE_CHALLENGE, challenge, true)
            .await
        {
            error!(error = %e, "error storing code challenge");
        }
    }

    pub(crate) fn auth_url_value(&self, api: &Api) -> Option<String> {
        self.auth_url
            .as_ref()
            .and_then(|url| url.value(&self.plain_ctx(api)).ok())
    }

    /// Store an authorization code delivered by the redirect endpoint and
    /// invalidate the previous token set.
    pub async fn set_authorization_code(&self, api: &Api, code: &str) -> Result<(), ExecError> {
        api.variables.set(VARIABLE_AUTHORIZATION_CODE, code).await?;
        api.variables.clear(VARIABLE_ACCESS_TOKEN).await?;
        api.variables.clear(VARIABLE_REFRESH_TOKEN).await?;
        api.variables.clear(VARIABLE_EXPIRATION).await?;
        Ok(())
    }
}
