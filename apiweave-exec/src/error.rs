use apiweave_core::ValueStringError;
use apiweave_store::StoreError;

use crate::auth::AuthError;
use crate::http::HttpError;

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Expr(#[from] ValueStringError),
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("function '{0}' doesn't exist")]
    FunctionNotFound(String),
    #[error("webhook '{0}' doesn't exist")]
    WebhookNotFound(String),
    #[error("webhook key '{0}' doesn't exist")]
    WebhookKeyNotFound(String),
    #[error("redirect location not found")]
    RedirectLocationMissing,
    #[error("too many redirects ({0})")]
    TooManyRedirects(usize),
    #[error("{0}")]
    Processing(String),
}

impl ExecError {
    pub fn processing(message: impl std::fmt::Display) -> Self {
        Self::Processing(message.to_string())
    }
}
