use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use apiweave_core::types::{Method, ResponseType};
use apiweave_core::{EvalContext, VariableScope};
use base64::Engine as _;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, error};

use crate::api::Api;
use crate::error::ExecError;
use crate::function::{Function, FunctionState, FunctionStatus, Header, Param};
use crate::http::{HttpRequest, HttpResponse};
use crate::sanitize;
use crate::vars::InvocationVars;

/// The variable scope a caller threads into an invocation (a handler scope,
/// a webhook key scope), if any.
pub type ScopeArg = Option<Arc<dyn VariableScope>>;

const MAX_REDIRECTS: usize = 5;

/// Execute and return the final HTTP status (`None` when the call failed
/// before a response was received).
pub async fn call_blocking(
    api: &Arc<Api>,
    function: &Arc<Function>,
    scope: ScopeArg,
) -> Option<u16> {
    execute(api, function, scope).await
}

/// Execute, discarding the status.
///
/// Returns a boxed future so the mutually-recursive `execute` cycle
/// (via function actions) has a concrete `Send` boundary; otherwise the
/// compiler cannot prove the spawned retry/webhook/schedule tasks are `Send`.
pub fn execute_blocking<'a>(
    api: &'a Arc<Api>,
    function: &'a Arc<Function>,
    scope: ScopeArg,
) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        execute(api, function, scope).await;
    })
}

/// Submit an execution without waiting for it.
pub fn execute_async(api: Arc<Api>, function: Arc<Function>, scope: ScopeArg) {
    tokio::spawn(async move {
        execute(&api, &function, scope).await;
    });
}

async fn execute(api: &Arc<Api>, function: &Arc<Function>, scope: ScopeArg) -> Option<u16> {
    let started = Instant::now();

    function
        .update_status_tag(api, "LastExecution", json!(chrono::Utc::now().to_rfc3339()))
        .await;
    function
        .update_status_tag(api, "State", json!(FunctionState::Running.display()))
        .await;

    // Each invocation owns its local variable store; publication to the
    // function-wide map happens write-through inside InvocationVars.
    let invocation = InvocationVars::new(function.name.clone(), function.published_vars.clone());

    let result = run_with_reauth(api, function, &scope, &invocation).await;

    let ret = match result {
        Ok(status) => Some(status),
        Err(e) => {
            error!(api = %api.name, function = %function.name, error = %e, "error with request");
            function.set_status(api, FunctionStatus::Failed).await;
            function
                .update_status_tag(api, "Response", json!(e.to_string()))
                .await;
            None
        }
    };

    function
        .update_status_tag(api, "State", json!(FunctionState::Pending.display()))
        .await;
    let next = function
        .next_execution()
        .map(|t| json!(t.to_rfc3339()))
        .unwrap_or(JsonValue::Null);
    function.update_status_tag(api, "NextExecution", next).await;
    function
        .update_status_tag(
            api,
            "LastExecutionDuration",
            json!(started.elapsed().as_millis() as u64),
        )
        .await;

    ret
}

/// Authenticate up front when needed; on a 401, force exactly one
/// re-authentication and retry the whole call once. A second 401 is the
/// final answer.
async fn run_with_reauth(
    api: &Arc<Api>,
    function: &Arc<Function>,
    scope: &ScopeArg,
    invocation: &InvocationVars,
) -> Result<u16, ExecError> {
    {
        let _gate = api.auth_gate.lock().await;
        if !api.auth.is_authenticated(api).await? {
            api.auth.authenticate(api, scope.clone()).await?;
        }
    }

    let mut status = send_and_process(api, function, scope, invocation).await?;
    if status == 401 {
        {
            let _gate = api.auth_gate.lock().await;
            api.auth.authenticate(api, scope.clone()).await?;
        }
        status = send_and_process(api, function, scope, invocation).await?;
    }
    Ok(status)
}

async fn send_and_process(
    api: &Arc<Api>,
    function: &Arc<Function>,
    scope: &ScopeArg,
    invocation: &InvocationVars,
) -> Result<u16, ExecError> {
    let setup_started = Instant::now();

    if let Some((target, always)) = &function.depends {
        let dependency = api.function(target)?;
        if *always || !dependency.has_executed() {
            Box::pin(execute(api, &dependency, scope.clone())).await;
        }
    }

    let ctx = eval_ctx(api, scope);

    // Header precedence: API-level, auth strategy, function-level, body.
    let mut headers = Header::evaluate(&api.headers, &ctx)?;
    headers.extend(api.auth.headers(api).await?);
    headers.extend(Header::evaluate(&function.headers, &ctx)?);
    headers.extend(function.body.headers());

    let url = function
        .url
        .as_ref()
        .ok_or_else(|| ExecError::Config(format!("function '{}' has no url", function.name)))?
        .value(&ctx)?;
    let params = Param::evaluate(&function.params, &ctx)?;
    let body = function.body.build(&ctx)?;

    let mut request = HttpRequest::new(function.method.as_str(), url.clone());
    request.headers = headers;
    request.query = params;
    request.body = body;
    request.follow_redirects = !function.redirect_no_headers;

    let setup_ms = setup_started.elapsed().as_millis() as u64;

    debug!(
        api = %api.name,
        function = %function.name,
        method = function.method.as_str(),
        url = %url,
        headers = %sanitize::headers_for_log(&request.headers),
        body = %request.body_for_log(),
        "request"
    );

    let call_started = Instant::now();
    let mut response = api.http.send(request).await?;

    if function.redirect_no_headers && response.is_redirect() {
        response = follow_redirects(api, function, &ctx, &url, response).await?;
    }
    let call_ms = call_started.elapsed().as_millis() as u64;

    let status = response.status;
    let mut success = (200..300).contains(&status);
    let mut is_error = status >= 400;
    if is_error && function.allowed_error_codes.contains(&status) {
        success = true;
        is_error = false;
    }

    let response_text = if function.response_type == ResponseType::Bytes {
        debug!(api = %api.name, function = %function.name, "base64 encoding response");
        base64::engine::general_purpose::STANDARD.encode(&response.body)
    } else {
        response.text()
    };

    let content_type = response
        .header("Content-Type")
        .map(str::to_string)
        .unwrap_or_else(|| function.response_type.content_type().to_string());

    debug!(
        api = %api.name,
        function = %function.name,
        status,
        content_type = %content_type,
        response = %response_text,
        "response"
    );

    function
        .update_status_tag(api, "ResponseCode", json!(status))
        .await;
    function
        .set_status(
            api,
            if success {
                FunctionStatus::Success
            } else {
                FunctionStatus::Failed
            },
        )
        .await;
    function
        .update_status_tag(
            api,
            "Response",
            json!(if is_error { response_text.clone() } else { String::new() }),
        )
        .await;

    if is_error {
        error!(api = %api.name, function = %function.name, status, "error executing function");
    }

    let mut process_ms = 0;
    if success {
        let process_started = Instant::now();
        let formatted = function.response_format.format(&ctx, response_text)?;
        function
            .actions
            .handle_response(api, function, invocation, scope.clone(), status, &content_type, &formatted)
            .await?;
        process_ms = process_started.elapsed().as_millis() as u64;
    }

    function
        .update_status_tag(api, "LastExecutionSetupDuration", json!(setup_ms))
        .await;
    function
        .update_status_tag(api, "LastExecutionCallDuration", json!(call_ms))
        .await;
    function
        .update_status_tag(api, "LastExecutionProcessDuration", json!(process_ms))
        .await;

    function.mark_executed();

    Ok(status)
}

/// Manual redirect loop for `redirectNoHeaders`: follow up to five hops,
/// demoting to GET (and dropping the body) on 301/302/303, re-issuing
/// without the default headers.
async fn follow_redirects(
    api: &Arc<Api>,
    function: &Arc<Function>,
    ctx: &EvalContext<'_>,
    base_url: &str,
    mut response: HttpResponse,
) -> Result<HttpResponse, ExecError> {
    let mut current_url = base_url.to_string();

    for _ in 0..MAX_REDIRECTS {
        let location = response
            .header("Location")
            .ok_or(ExecError::RedirectLocationMissing)?;

        let target = url::Url::parse(&current_url)
            .and_then(|base| base.join(location))
            .map_err(|e| ExecError::Processing(format!("invalid redirect location: {e}")))?
            .to_string();

        let demote = matches!(response.status, 301 | 302 | 303);
        let method = if demote {
            Method::Get
        } else {
            function.method
        };
        let body = if demote {
            None
        } else {
            function.body.build(ctx)?
        };

        debug!(
            api = %api.name,
            function = %function.name,
            method = method.as_str(),
            url = %target,
            "redirect"
        );

        let mut request = HttpRequest::new(method.as_str(), target.clone());
        request.body = body;
        request.follow_redirects = false;

        response = api.http.send(request).await?;
        current_url = target;

        if !response.is_redirect() {
            return Ok(response);
        }
    }

    Err(ExecError::TooManyRedirects(MAX_REDIRECTS))
}

pub(crate) fn eval_ctx<'a>(api: &'a Api, scope: &'a ScopeArg) -> EvalContext<'a> {
    EvalContext {
        scope: scope.as_deref(),
        resolver: api,
        response: None,
        item: None,
    }
}
