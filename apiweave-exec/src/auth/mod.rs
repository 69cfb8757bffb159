pub mod basic;
pub mod oauth2;
pub mod session;
pub mod token;

pub use oauth2::OAuth2;
pub use session::SessionAuth;
pub use token::TokenAuth;

use std::collections::BTreeMap;

use apiweave_core::types::AuthSpec;

use crate::api::Api;
use crate::error::ExecError;
use crate::executor::ScopeArg;

#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("oauth2: no authorization code")]
    NoAuthorizationCode,
    #[error("oauth2: waiting for 2fa code")]
    Waiting2fa,
    #[error("{0}: need to authorize")]
    NeedsAuthorization(&'static str),
    #[error("{kind}: failed login ({status})")]
    FailedLogin { kind: &'static str, status: u16 },
    #[error("error checking expiration date: {0}")]
    Expiration(String),
}

/// The authentication scheme of one API, dispatched on the configuration's
/// `type` discriminator.
pub enum AuthStrategy {
    None,
    Basic,
    Bearer,
    Session(SessionAuth),
    Token(TokenAuth),
    OAuth2(OAuth2),
}

impl AuthStrategy {
    pub fn compile(spec: Option<&AuthSpec>) -> Result<Self, ExecError> {
        Ok(match spec {
            None | Some(AuthSpec::None) => Self::None,
            Some(AuthSpec::Basic) => Self::Basic,
            Some(AuthSpec::Bearer) => Self::Bearer,
            Some(AuthSpec::Session(s)) => Self::Session(SessionAuth::compile(s)?),
            Some(AuthSpec::Token(s)) => Self::Token(TokenAuth::compile(s)?),
            Some(AuthSpec::OAuth2(s)) => Self::OAuth2(OAuth2::compile(s)?),
        })
    }

    /// Session-scoped cookie jar needed across calls.
    pub fn requires_session(&self) -> bool {
        matches!(self, Self::Session(_))
    }

    /// Declare the variables this strategy reads and writes, so operators
    /// see required credentials and runtime state stays persisted.
    pub async fn initialize_variables(&self, api: &Api) -> Result<(), ExecError> {
        match self {
            Self::None => Ok(()),
            Self::Basic => basic::initialize_basic(api).await,
            Self::Bearer => basic::initialize_bearer(api).await,
            Self::Session(s) => s.initialize_variables(api).await,
            Self::Token(s) => s.initialize_variables(api).await,
            Self::OAuth2(s) => s.initialize_variables(api).await,
        }
    }

    /// Whether the operator-side prerequisite (an authorization grant) is
    /// satisfied; only OAuth2's authorization-code flow can say no.
    pub fn is_authorized(&self, api: &Api) -> bool {
        match self {
            Self::OAuth2(s) => s.is_authorized(api),
            _ => true,
        }
    }

    /// May raise to signal "waiting for external input" (authorization
    /// code, pending 2FA).
    pub async fn is_authenticated(&self, api: &Api) -> Result<bool, ExecError> {
        match self {
            Self::None | Self::Basic | Self::Bearer => Ok(true),
            Self::Session(s) => Ok(s.is_authenticated()),
            Self::Token(s) => s.is_authenticated(api),
            Self::OAuth2(s) => s.is_authenticated(api).await,
        }
    }

    pub async fn authenticate(&self, api: &Api, scope: ScopeArg) -> Result<(), ExecError> {
        match self {
            Self::None | Self::Basic | Self::Bearer => Ok(()),
            Self::Session(s) => s.authenticate(api, scope).await,
            Self::Token(s) => s.authenticate(api, scope).await,
            Self::OAuth2(s) => s.authenticate(api, scope).await,
        }
    }

    /// Headers this strategy contributes to every call.
    pub async fn headers(&self, api: &Api) -> Result<BTreeMap<String, String>, ExecError> {
        match self {
            Self::None | Self::Session(_) | Self::Token(_) => Ok(BTreeMap::new()),
            Self::Basic => basic::basic_headers(api),
            Self::Bearer => basic::bearer_headers(api),
            Self::OAuth2(s) => Ok(s.headers(api)),
        }
    }

    pub fn as_oauth2(&self) -> Option<&OAuth2> {
        match self {
            Self::OAuth2(s) => Some(s),
            _ => None,
        }
    }
}
