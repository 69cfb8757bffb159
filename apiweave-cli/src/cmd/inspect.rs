use std::path::Path;

use apiweave_core::parse_document_str;
use apiweave_core::types::AuthSpec;
use serde::Serialize;

use crate::exit_codes;
use crate::output::{print_error, print_result};
use crate::OutputArgs;

#[derive(Serialize)]
struct InspectResult {
    auth: String,
    session: bool,
    headers: usize,
    variables: Vec<VariableSummary>,
    functions: Vec<FunctionSummary>,
    webhooks: Vec<String>,
}

#[derive(Serialize)]
struct VariableSummary {
    name: String,
    required: bool,
    sensitive: bool,
}

#[derive(Serialize)]
struct FunctionSummary {
    name: String,
    method: String,
    url: Option<String>,
    schedule: Option<String>,
    actions: Vec<String>,
    depends: Option<String>,
}

pub async fn inspect_cmd(path: &Path, output: OutputArgs) -> i32 {
    let content = match std::fs::read_to_string(path) {
        Ok(v) => v,
        Err(e) => {
            print_error(
                output.format,
                output.quiet,
                &format!("failed to read {}: {e}", path.display()),
            );
            return exit_codes::RUNTIME_ERROR;
        }
    };

    let doc = match parse_document_str(&content) {
        Ok(p) => p.document,
        Err(e) => {
            print_error(output.format, output.quiet, &e.to_string());
            return exit_codes::VALIDATION_FAILED;
        }
    };

    let auth = match &doc.auth_type {
        None | Some(AuthSpec::None) => "none",
        Some(AuthSpec::Basic) => "basic",
        Some(AuthSpec::Bearer) => "bearer",
        Some(AuthSpec::Session(_)) => "session",
        Some(AuthSpec::Token(_)) => "token",
        Some(AuthSpec::OAuth2(_)) => "oauth2",
    };

    let result = InspectResult {
        auth: auth.to_string(),
        session: doc.session,
        headers: doc.headers.len(),
        variables: doc
            .variables
            .iter()
            .map(|(name, spec)| VariableSummary {
                name: name.clone(),
                required: spec.required,
                sensitive: spec.sensitive,
            })
            .collect(),
        functions: doc
            .functions
            .iter()
            .map(|(name, spec)| FunctionSummary {
                name: name.clone(),
                method: spec.method.as_str().to_string(),
                url: spec.url.clone(),
                schedule: spec.schedule.as_ref().map(|s| s.to_string()),
                actions: spec.actions.iter().map(|a| a.kind().to_string()).collect(),
                depends: spec.dependency().map(|(name, _)| name.to_string()),
            })
            .collect(),
        webhooks: doc.webhooks.keys().cloned().collect(),
    };
    print_result(output.format, output.quiet, &result);
    exit_codes::SUCCESS
}
