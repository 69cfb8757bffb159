use std::collections::HashMap;
use std::sync::Arc;

use apiweave_core::types::ApiDocument;

use crate::auth::AuthStrategy;
use crate::error::ExecError;
use crate::function::{Function, Header};
use crate::webhook::Webhook;

/// A document compiled into runtime objects: parsed expressions, closed
/// strategy/action enums, webhook sub-functions.
pub struct CompiledApi {
    pub auth: AuthStrategy,
    pub headers: Vec<Header>,
    pub functions: HashMap<String, Arc<Function>>,
    pub webhooks: HashMap<String, Arc<Webhook>>,
}

pub fn compile_document(api_name: &str, doc: &ApiDocument) -> Result<CompiledApi, ExecError> {
    let auth = AuthStrategy::compile(doc.auth_type.as_ref())?;
    let headers = Header::compile(&doc.headers)?;

    let mut functions = HashMap::new();
    for (name, spec) in &doc.functions {
        let function = Function::compile(api_name, name, None, spec, false)
            .map_err(|e| ExecError::Config(format!("error parsing function '{name}': {e}")))?;
        functions.insert(name.clone(), Arc::new(function));
    }

    let mut webhooks = HashMap::new();
    for (name, spec) in &doc.webhooks {
        let webhook = Webhook::compile(api_name, name, spec)
            .map_err(|e| ExecError::Config(format!("error parsing webhook '{name}': {e}")))?;
        webhooks.insert(name.clone(), Arc::new(webhook));
    }

    Ok(CompiledApi {
        auth,
        headers,
        functions,
        webhooks,
    })
}
