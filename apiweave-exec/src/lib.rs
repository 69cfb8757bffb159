#![forbid(unsafe_code)]

//! Runtime engine for apiweave.
//!
//! Configuration parsing and the expression language live in
//! `apiweave-core`; the store contracts live in `apiweave-store`. This crate
//! compiles parsed documents into running API instances: authentication
//! strategies, the function execution pipeline, the response action
//! pipeline, webhook key lifecycles and schedules.

pub mod actions;
pub mod api;
pub mod auth;
pub mod compile;
pub mod condition;
pub mod error;
pub mod executor;
pub mod function;
pub mod http;
pub mod registry;
pub mod sanitize;
pub mod schedule;
pub mod script;
pub mod vars;
pub mod webhook;

pub use api::{Api, ApiStatus, EngineContext};
pub use auth::{AuthError, AuthStrategy};
pub use error::ExecError;
pub use function::{Function, FunctionStatus};
pub use http::{HttpBody, HttpClient, HttpError, HttpOptions, HttpRequest, HttpResponse, ReqwestHttpClient};
pub use registry::ApiRegistry;
pub use script::{NoopScriptBridge, ScriptBridge};
pub use vars::{ApiVariables, HandlerVars, InvocationVars};
