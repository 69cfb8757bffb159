mod common;

use apiweave_exec::auth::oauth2::{
    VARIABLE_2FA_CODE_WAITING, VARIABLE_ACCESS_TOKEN, VARIABLE_EXPIRATION, VARIABLE_REFRESH_TOKEN,
    VARIABLE_TOKEN_TYPE,
};
use apiweave_exec::auth::token::EXPIRATION_FORMAT;
use apiweave_exec::ApiStatus;
use chrono::Utc;
use common::{build_api, Harness, MockHttp};

const CLIENT_CREDENTIALS_CONFIG: &str = r#"
authType:
  type: oauth2
  grantType: clientcredentials
  accessTokenUrl: https://login.example/token
  clientId: my-client
  clientSecret: my-secret
functions:
  poll:
    url: https://api.example/data
"#;

const PASSWORD_2FA_CONFIG: &str = r#"
authType:
  type: oauth2
  grantType: password
  accessTokenUrl: https://login.example/token
  scope: read
  clientId: my-client
  clientSecret: my-secret
  "2fa": true
functions:
  poll:
    url: https://api.example/data
"#;

fn expiration_in(seconds: i64) -> String {
    (Utc::now() + chrono::Duration::seconds(seconds))
        .format(EXPIRATION_FORMAT)
        .to_string()
}

async fn oauth2_of(h: &Harness) -> &apiweave_exec::auth::oauth2::OAuth2 {
    h.api.auth.as_oauth2().expect("oauth2 strategy")
}

#[tokio::test]
async fn not_authenticated_without_a_stored_token() {
    let http = MockHttp::new();
    let h = build_api(CLIENT_CREDENTIALS_CONFIG, http).await;
    let oauth2 = oauth2_of(&h).await;
    assert!(!oauth2.is_authenticated(&h.api).await.unwrap());
}

#[tokio::test]
async fn a_token_without_recorded_expiration_is_not_authenticated() {
    let http = MockHttp::new();
    let h = build_api(CLIENT_CREDENTIALS_CONFIG, http).await;
    h.api
        .variables
        .set(VARIABLE_ACCESS_TOKEN, "tok")
        .await
        .unwrap();

    let oauth2 = oauth2_of(&h).await;
    assert!(!oauth2.is_authenticated(&h.api).await.unwrap());
}

#[tokio::test]
async fn a_past_expiration_invalidates_a_present_token() {
    let http = MockHttp::new();
    let h = build_api(CLIENT_CREDENTIALS_CONFIG, http).await;
    h.api.variables.set(VARIABLE_ACCESS_TOKEN, "tok").await.unwrap();
    h.api
        .variables
        .set(VARIABLE_EXPIRATION, expiration_in(-60))
        .await
        .unwrap();

    let oauth2 = oauth2_of(&h).await;
    assert!(!oauth2.is_authenticated(&h.api).await.unwrap());
}

#[tokio::test]
async fn a_future_expiration_authenticates() {
    let http = MockHttp::new();
    let h = build_api(CLIENT_CREDENTIALS_CONFIG, http).await;
    h.api.variables.set(VARIABLE_ACCESS_TOKEN, "tok").await.unwrap();
    h.api
        .variables
        .set(VARIABLE_EXPIRATION, expiration_in(3600))
        .await
        .unwrap();

    let oauth2 = oauth2_of(&h).await;
    assert!(oauth2.is_authenticated(&h.api).await.unwrap());
}

#[tokio::test]
async fn successful_authentication_stores_the_token_set() {
    let http = MockHttp::new();
    http.respond(
        "POST",
        "https://login.example/token",
        200,
        r#"{"access_token":"tok","token_type":"Bearer","expires_in":3600,"refresh_token":"ref"}"#,
    );

    let h = build_api(CLIENT_CREDENTIALS_CONFIG, http.clone()).await;
    let oauth2 = oauth2_of(&h).await;
    oauth2.authenticate(&h.api, None).await.unwrap();

    assert_eq!(h.api.variables.get(VARIABLE_ACCESS_TOKEN).as_deref(), Some("tok"));
    assert_eq!(h.api.variables.get(VARIABLE_TOKEN_TYPE).as_deref(), Some("Bearer"));
    assert_eq!(h.api.variables.get(VARIABLE_REFRESH_TOKEN).as_deref(), Some("ref"));
    assert!(h.api.variables.get(VARIABLE_EXPIRATION).is_some());
    assert!(oauth2.is_authenticated(&h.api).await.unwrap());

    // Client credentials go out as a Basic authorization header.
    let login = &http.requests()[0];
    assert!(login
        .headers
        .get("Authorization")
        .map(|v| v.starts_with("Basic "))
        .unwrap_or(false));
}

#[tokio::test]
async fn failed_authentication_clears_state_and_needs_authorization() {
    let http = MockHttp::new();
    http.respond("POST", "https://login.example/token", 400, r#"{"error":"denied"}"#);

    let h = build_api(CLIENT_CREDENTIALS_CONFIG, http).await;
    h.api.variables.set(VARIABLE_ACCESS_TOKEN, "stale").await.unwrap();
    h.api
        .variables
        .set(VARIABLE_EXPIRATION, expiration_in(3600))
        .await
        .unwrap();

    let oauth2 = oauth2_of(&h).await;
    assert!(oauth2.authenticate(&h.api, None).await.is_err());

    assert_eq!(h.api.variables.get(VARIABLE_ACCESS_TOKEN), None);
    assert_eq!(h.api.variables.get(VARIABLE_REFRESH_TOKEN), None);
    assert_eq!(h.api.variables.get(VARIABLE_EXPIRATION), None);
    assert_eq!(h.api.status().await, ApiStatus::NeedsAuthorization);
    assert!(!oauth2.is_authenticated(&h.api).await.unwrap());
}

#[tokio::test]
async fn a_412_with_pending_2fa_stages_waiting_and_recovers() {
    let http = MockHttp::new();
    http.respond("POST", "https://login.example/token", 412, "");

    let h = build_api(PASSWORD_2FA_CONFIG, http).await;
    let oauth2 = oauth2_of(&h).await;

    assert!(oauth2.authenticate(&h.api, None).await.is_err());

    assert_eq!(
        h.api.variables.get(VARIABLE_2FA_CODE_WAITING).as_deref(),
        Some("yes")
    );
    assert_eq!(h.api.status().await, ApiStatus::Needs2faCode);
    // The pending second factor surfaces as a raised state, not a plain
    // "not authenticated".
    assert!(oauth2.is_authenticated(&h.api).await.is_err());
}

#[tokio::test]
async fn refresh_parameters_are_used_only_after_a_recorded_expiry() {
    let http = MockHttp::new();
    http.respond(
        "POST",
        "https://login.example/token",
        200,
        r#"{"access_token":"tok2","token_type":"Bearer","expires_in":3600}"#,
    );

    let h = build_api(CLIENT_CREDENTIALS_CONFIG, http.clone()).await;
    h.api.variables.set(VARIABLE_ACCESS_TOKEN, "tok").await.unwrap();
    h.api.variables.set(VARIABLE_REFRESH_TOKEN, "ref").await.unwrap();
    h.api
        .variables
        .set(VARIABLE_EXPIRATION, expiration_in(-60))
        .await
        .unwrap();

    let oauth2 = oauth2_of(&h).await;
    oauth2.authenticate(&h.api, None).await.unwrap();

    let body = http.requests()[0].body_for_log();
    assert!(body.contains("grant_type=refresh_token"), "{body}");
}

#[tokio::test]
async fn no_recorded_expiration_never_sends_refresh_parameters() {
    let http = MockHttp::new();
    http.respond(
        "POST",
        "https://login.example/token",
        200,
        r#"{"access_token":"tok2","token_type":"Bearer","expires_in":3600}"#,
    );

    let h = build_api(CLIENT_CREDENTIALS_CONFIG, http.clone()).await;
    // A refresh token without a recorded expiration: the original treats
    // "nothing recorded" as expired for authentication purposes but still
    // sends the non-refresh grant.
    h.api.variables.set(VARIABLE_REFRESH_TOKEN, "ref").await.unwrap();

    let oauth2 = oauth2_of(&h).await;
    oauth2.authenticate(&h.api, None).await.unwrap();

    let body = http.requests()[0].body_for_log();
    assert!(body.contains("grant_type=client_credentials"), "{body}");
    assert!(!body.contains("refresh_token"), "{body}");
}
