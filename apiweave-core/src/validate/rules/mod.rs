pub mod actions;
pub mod auth;
pub mod functions;
pub mod headers;
pub mod webhooks;
