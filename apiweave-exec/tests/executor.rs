mod common;

use apiweave_exec::executor::call_blocking;
use apiweave_exec::FunctionStatus;
use common::{build_api, redirect_response, MockHttp};

const TOKEN_AUTH_CONFIG: &str = r#"
authType:
  type: token
  url: https://auth.example/login
  tokens:
    - name: sid
functions:
  poll:
    url: https://api.example/data
    responseType: json
    actions:
      - action: variable
        name: last
        value: "{{response}}"
"#;

#[tokio::test]
async fn a_401_triggers_exactly_one_reauthentication_and_retry() {
    let http = MockHttp::new();
    http.respond("GET", "https://api.example/data", 401, "");
    http.respond("POST", "https://auth.example/login", 200, r#"{"sid":"s1"}"#);
    http.respond("GET", "https://api.example/data", 200, r#"{"ok":true}"#);

    let h = build_api(TOKEN_AUTH_CONFIG, http.clone()).await;
    let function = h.api.function("poll").unwrap();

    let status = call_blocking(&h.api, &function, None).await;

    assert_eq!(status, Some(200));
    assert_eq!(http.request_count("GET", "https://api.example/data"), 2);
    assert_eq!(http.request_count("POST", "https://auth.example/login"), 1);
    assert_eq!(function.status(), FunctionStatus::Success);
}

#[tokio::test]
async fn a_second_consecutive_401_is_a_failure_not_another_retry() {
    let http = MockHttp::new();
    http.respond("GET", "https://api.example/data", 401, "");
    http.respond("POST", "https://auth.example/login", 200, r#"{"sid":"s1"}"#);
    http.respond("GET", "https://api.example/data", 401, "");

    let h = build_api(TOKEN_AUTH_CONFIG, http.clone()).await;
    let function = h.api.function("poll").unwrap();

    let status = call_blocking(&h.api, &function, None).await;

    assert_eq!(status, Some(401));
    assert_eq!(http.request_count("GET", "https://api.example/data"), 2);
    assert_eq!(http.request_count("POST", "https://auth.example/login"), 1);
    assert_eq!(function.status(), FunctionStatus::Failed);
}

#[tokio::test]
async fn allowed_error_codes_count_as_success() {
    let config = r#"
functions:
  poll:
    url: https://api.example/maybe-missing
    allowedErrorCodes:
      - code: 404
    actions:
      - action: variable
        name: last
        value: "{{response}}"
"#;
    let http = MockHttp::new();
    http.respond("GET", "https://api.example/maybe-missing", 404, "gone");

    let h = build_api(config, http.clone()).await;
    let function = h.api.function("poll").unwrap();

    let status = call_blocking(&h.api, &function, None).await;

    assert_eq!(status, Some(404));
    assert_eq!(function.status(), FunctionStatus::Success);
    // Dispatch ran: the variable action captured the body.
    assert_eq!(function.published_var("last").as_deref(), Some("gone"));
}

#[tokio::test]
async fn an_unlisted_error_code_fails_and_skips_actions() {
    let config = r#"
functions:
  poll:
    url: https://api.example/data
    actions:
      - action: variable
        name: last
        value: "{{response}}"
"#;
    let http = MockHttp::new();
    http.respond("GET", "https://api.example/data", 500, "boom");

    let h = build_api(config, http.clone()).await;
    let function = h.api.function("poll").unwrap();

    let status = call_blocking(&h.api, &function, None).await;

    assert_eq!(status, Some(500));
    assert_eq!(function.status(), FunctionStatus::Failed);
    assert_eq!(function.published_var("last"), None);
}

#[tokio::test]
async fn redirect_no_headers_follows_manually_and_demotes_to_get() {
    let config = r#"
functions:
  submit:
    url: https://api.example/start
    method: post
    redirectNoHeaders: true
    body:
      type: text
      value: payload
    headers:
      - key: X-Custom
        value: yes
"#;
    let http = MockHttp::new();
    http.respond_with(
        "POST",
        "https://api.example/start",
        redirect_response("https://api.example/start", 302, "/landing"),
    );
    http.respond("GET", "https://api.example/landing", 200, "done");

    let h = build_api(config, http.clone()).await;
    let function = h.api.function("submit").unwrap();

    let status = call_blocking(&h.api, &function, None).await;
    assert_eq!(status, Some(200));

    let requests = http.requests();
    assert_eq!(requests.len(), 2);
    // First hop carries the configured headers and never auto-follows.
    assert!(!requests[0].follow_redirects);
    assert!(requests[0].headers.contains_key("X-Custom"));
    // 302 demotes to GET, drops the body and re-issues without headers.
    assert_eq!(requests[1].method, "GET");
    assert_eq!(requests[1].url, "https://api.example/landing");
    assert!(requests[1].body.is_none());
    assert!(requests[1].headers.is_empty());
}

#[tokio::test]
async fn too_many_redirects_is_a_call_failure() {
    let config = r#"
functions:
  submit:
    url: https://api.example/loop0
    redirectNoHeaders: true
"#;
    let http = MockHttp::new();
    for i in 0..6 {
        http.respond_with(
            "GET",
            &format!("https://api.example/loop{i}"),
            redirect_response(
                &format!("https://api.example/loop{i}"),
                302,
                &format!("/loop{}", i + 1),
            ),
        );
    }

    let h = build_api(config, http.clone()).await;
    let function = h.api.function("submit").unwrap();

    let status = call_blocking(&h.api, &function, None).await;
    assert_eq!(status, None);
    assert_eq!(function.status(), FunctionStatus::Failed);
}

#[tokio::test]
async fn dependency_runs_once_unless_always() {
    let config = r#"
functions:
  login:
    url: https://api.example/login
  poll:
    url: https://api.example/data
    depends: login
"#;
    let http = MockHttp::new();

    let h = build_api(config, http.clone()).await;
    let function = h.api.function("poll").unwrap();

    call_blocking(&h.api, &function, None).await;
    call_blocking(&h.api, &function, None).await;

    // `depends` (without always) runs the dependency only until it has
    // executed once.
    assert_eq!(http.request_count("GET", "https://api.example/login"), 1);
    assert_eq!(http.request_count("GET", "https://api.example/data"), 2);
}

#[tokio::test]
async fn depends_always_runs_before_every_call() {
    let config = r#"
functions:
  login:
    url: https://api.example/login
  poll:
    url: https://api.example/data
    dependsAlways: login
"#;
    let http = MockHttp::new();

    let h = build_api(config, http.clone()).await;
    let function = h.api.function("poll").unwrap();

    call_blocking(&h.api, &function, None).await;
    call_blocking(&h.api, &function, None).await;

    assert_eq!(http.request_count("GET", "https://api.example/login"), 2);
}

#[tokio::test]
async fn headers_merge_api_then_function() {
    let config = r#"
headers:
  - key: Accept
    value: application/json
  - key: X-Scope
    value: api
functions:
  poll:
    url: https://api.example/data
    headers:
      - key: X-Scope
        value: function
"#;
    let http = MockHttp::new();

    let h = build_api(config, http.clone()).await;
    let function = h.api.function("poll").unwrap();
    call_blocking(&h.api, &function, None).await;

    let requests = http.requests();
    let headers = &requests[0].headers;
    assert_eq!(headers.get("Accept").map(String::as_str), Some("application/json"));
    // Function-level headers win over API-level ones.
    assert_eq!(headers.get("X-Scope").map(String::as_str), Some("function"));
}

#[tokio::test]
async fn response_format_rewrites_before_dispatch() {
    let config = r#"
functions:
  poll:
    url: https://api.example/wrapped
    responseType: json
    responseFormat:
      value: "{{jsonPath::$.payload}}"
    actions:
      - action: variable
        name: inner
        value: "{{response}}"
"#;
    let http = MockHttp::new();
    http.respond(
        "GET",
        "https://api.example/wrapped",
        200,
        r#"{"payload":"aGk="}"#,
    );

    let h = build_api(config, http.clone()).await;
    let function = h.api.function("poll").unwrap();
    call_blocking(&h.api, &function, None).await;

    assert_eq!(function.published_var("inner").as_deref(), Some("aGk="));
}
