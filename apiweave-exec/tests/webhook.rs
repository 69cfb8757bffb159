mod common;

use std::time::Duration;

use apiweave_exec::ApiStatus;
use apiweave_store::{RecordStore, TagStore, WriteQuality};
use common::{build_api, MockHttp};
use serde_json::json;

const WEBHOOK_CONFIG: &str = r#"
webhooks:
  device:
    checkOnStart: true
    key: main
    ttl: 1
    check:
      url: https://api.example/hooks/main
    add:
      url: https://api.example/hooks
      method: post
      actions:
        - action: variable
          name: id
          value: "{{jsonPath::$.id}}"
    remove:
      url: https://api.example/hooks/main
      method: delete
    handle:
      actions:
        - action: tag
          type: jsonexpand
          path: acme/device
"#;

async fn settle() {
    tokio::time::sleep(Duration::from_millis(250)).await;
}

#[tokio::test]
async fn startup_registers_the_default_key_when_absent() {
    let http = MockHttp::new();
    // Not registered yet: the check misses, the add succeeds and returns
    // the external id.
    http.respond("GET", "https://api.example/hooks/main", 404, "");
    http.respond("POST", "https://api.example/hooks", 200, r#"{"id":"ext-1"}"#);

    let h = build_api(WEBHOOK_CONFIG, http.clone()).await;
    h.api.startup().await;
    settle().await;

    assert_eq!(h.api.status().await, ApiStatus::Running);

    let webhook = h.api.webhook("device").unwrap();
    let key = webhook.key("main").unwrap();
    assert!(key.exists());
    assert_eq!(key.id().as_deref(), Some("ext-1"));
    assert!(key.recheck_scheduled());

    // The captured id was persisted on the key record.
    let records = h.records.list_webhook_keys(1, "device").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].uid.as_deref(), Some("ext-1"));
    assert_eq!(
        records[0].url,
        "http://gateway.local:8088/system/webhook/1/device/main"
    );
}

#[tokio::test]
async fn failed_check_and_add_leave_the_key_absent_without_recheck() {
    let http = MockHttp::new();
    http.respond("GET", "https://api.example/hooks/main", 500, "");
    http.respond("POST", "https://api.example/hooks", 500, "");

    let h = build_api(WEBHOOK_CONFIG, http.clone()).await;
    h.api.startup().await;
    settle().await;

    let webhook = h.api.webhook("device").unwrap();
    let key = webhook.key("main").unwrap();
    assert!(!key.exists());
    assert!(!key.recheck_scheduled());
}

#[tokio::test]
async fn an_existing_registration_skips_the_add_call() {
    let http = MockHttp::new();
    http.respond("GET", "https://api.example/hooks/main", 200, "{}");

    let h = build_api(WEBHOOK_CONFIG, http.clone()).await;
    h.api.startup().await;
    settle().await;

    let webhook = h.api.webhook("device").unwrap();
    assert!(webhook.key("main").unwrap().exists());
    assert_eq!(http.request_count("POST", "https://api.example/hooks"), 0);
}

#[tokio::test]
async fn delivery_runs_the_handle_actions_in_the_key_scope() {
    let http = MockHttp::new();
    http.respond("GET", "https://api.example/hooks/main", 200, "{}");

    let h = build_api(WEBHOOK_CONFIG, http.clone()).await;
    h.api.startup().await;
    settle().await;

    let webhook = h.api.webhook("device").unwrap();
    let key = webhook.key("main").unwrap();
    webhook
        .handle_delivery(&h.api, &key, "application/json", r#"{"motion": true}"#)
        .await
        .unwrap();

    assert_eq!(
        h.tags.read_tag("acme/device/motion").await.unwrap(),
        json!(true)
    );
}

#[tokio::test]
async fn remove_write_tears_the_key_down_best_effort() {
    let http = MockHttp::new();
    http.respond("GET", "https://api.example/hooks/main", 200, "{}");
    http.respond("DELETE", "https://api.example/hooks/main", 200, "{}");

    let h = build_api(WEBHOOK_CONFIG, http.clone()).await;
    h.api.startup().await;
    settle().await;

    let quality = h
        .tags
        .write_external("acme/Webhooks/device/main/Remove", json!(true))
        .await;
    assert_eq!(quality, WriteQuality::Good);

    assert_eq!(http.request_count("DELETE", "https://api.example/hooks/main"), 1);
    let webhook = h.api.webhook("device").unwrap();
    assert!(webhook.key("main").is_err());
    assert!(h.records.list_webhook_keys(1, "device").await.unwrap().is_empty());
    assert!(!h.tags.tag_exists("acme/Webhooks/device/main/Exists").await);
}

#[tokio::test]
async fn a_failed_remove_call_still_drops_local_state() {
    let http = MockHttp::new();
    http.respond("GET", "https://api.example/hooks/main", 200, "{}");
    http.respond("DELETE", "https://api.example/hooks/main", 500, "");

    let h = build_api(WEBHOOK_CONFIG, http.clone()).await;
    h.api.startup().await;
    settle().await;

    let quality = h
        .tags
        .write_external("acme/Webhooks/device/main/Remove", json!(true))
        .await;
    assert_eq!(quality, WriteQuality::Error);

    // Teardown is best-effort: the record and in-memory key are gone even
    // though the remote call failed.
    let webhook = h.api.webhook("device").unwrap();
    assert!(webhook.key("main").is_err());
    assert!(h.records.list_webhook_keys(1, "device").await.unwrap().is_empty());
}
