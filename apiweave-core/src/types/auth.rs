use serde::{Deserialize, Serialize};

use crate::types::{HeaderSpec, ParamSpec};

/// Authentication scheme, discriminated by the configuration's `type` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthSpec {
    None,
    Basic,
    Bearer,
    Session(SessionAuthSpec),
    Token(TokenAuthSpec),
    #[serde(rename = "oauth2")]
    OAuth2(OAuth2Spec),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionAuthSpec {
    /// Login POST target; expression-valued.
    pub url: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<ParamSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenAuthSpec {
    pub url: String,

    #[serde(default = "default_username_key")]
    #[serde(rename = "usernameKey")]
    pub username_key: String,

    #[serde(default = "default_password_key")]
    #[serde(rename = "passwordKey")]
    pub password_key: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<HeaderSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<ParamSpec>,

    /// Seconds until the returned tokens expire; absent means they never do.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "expiresIn")]
    pub expires_in: Option<i64>,

    /// Response keys stored as derived `auth-<name>` variables.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tokens: Vec<TokenName>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenName {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantType {
    #[default]
    #[serde(alias = "authorization_code")]
    Authorizationcode,
    #[serde(alias = "client_credentials")]
    Clientcredentials,
    Password,
    #[serde(alias = "refresh_token")]
    Refresh,
}

impl GrantType {
    /// The wire value sent as `grant_type`.
    pub fn wire(&self) -> &'static str {
        match self {
            Self::Authorizationcode => "authorization_code",
            Self::Clientcredentials => "client_credentials",
            Self::Password => "password",
            Self::Refresh => "refresh_token",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuth2Spec {
    #[serde(default)]
    #[serde(rename = "grantType")]
    pub grant_type: GrantType,

    /// Authorization page URL; required for the authorization-code grant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "authUrl")]
    pub auth_url: Option<String>,

    #[serde(rename = "accessTokenUrl")]
    pub access_token_url: String,

    /// Response key holding the access token.
    #[serde(default = "default_access_token_key")]
    #[serde(rename = "accessTokenKey")]
    pub access_token_key: String,

    /// Login form field names for the authorization-page flow.
    #[serde(default = "default_username_key")]
    #[serde(rename = "usernameInput")]
    pub username_input: String,

    #[serde(default = "default_password_key")]
    #[serde(rename = "passwordInput")]
    pub password_input: String,

    /// Second token exchange: trade the access token for a bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "bearerAccessTokenUrl")]
    pub bearer_access_token_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "redirectUrl")]
    pub redirect_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "captchaUrl")]
    pub captcha_url: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<HeaderSpec>,

    /// Required for every grant except client credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "clientId")]
    pub client_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "clientSecret")]
    pub client_secret: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "bearerClientId")]
    pub bearer_client_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "bearerClientSecret")]
    pub bearer_client_secret: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "bearerGrantType")]
    pub bearer_grant_type: Option<String>,

    #[serde(default)]
    #[serde(rename = "2fa")]
    pub two_factor: bool,

    #[serde(default)]
    pub captcha: bool,

    #[serde(default)]
    pub pkce: bool,

    /// PKCE flow driven through the hosted authorization page.
    #[serde(default)]
    #[serde(rename = "authCode")]
    pub auth_code: bool,

    /// Present a sticky generated User-Agent during authorization.
    #[serde(default)]
    #[serde(rename = "randomUserAgent")]
    pub random_user_agent: bool,
}

fn default_access_token_key() -> String {
    "access_token".to_string()
}

fn default_username_key() -> String {
    "username".to_string()
}

fn default_password_key() -> String {
    "password".to_string()
}
