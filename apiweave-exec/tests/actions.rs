mod common;

use std::time::Duration;

use apiweave_exec::executor::call_blocking;
use apiweave_store::{RecordStore, TagStore};
use common::{build_api, MockHttp};
use serde_json::json;

#[tokio::test]
async fn function_action_invokes_the_target_per_item() {
    let config = r#"
functions:
  list:
    url: https://api.example/list
    responseType: json
    actions:
      - action: function
        type: direct
        function: item
        items: "{{jsonPath::$.devices[*]}}"
        variables:
          - name: device
            value: "{{jsonPath::item::$.id}}"
  item:
    url: "https://api.example/device/{{var::handler.device}}"
"#;
    let http = MockHttp::new();
    http.respond(
        "GET",
        "https://api.example/list",
        200,
        r#"{"devices":[{"id":"a"},{"id":"b"}]}"#,
    );

    let h = build_api(config, http.clone()).await;
    let function = h.api.function("list").unwrap();
    call_blocking(&h.api, &function, None).await;

    assert_eq!(http.request_count("GET", "https://api.example/device/a"), 1);
    assert_eq!(http.request_count("GET", "https://api.example/device/b"), 1);
}

#[tokio::test]
async fn condition_action_branches_true_and_false() {
    let config = r#"
functions:
  poll:
    url: https://api.example/state
    responseType: json
    actions:
      - action: function
        type: condition
        conditionKey: "{{jsonPath::$.state}}"
        conditionOperator: eq
        conditionValue: "on"
        trueFunction: enable
        falseFunction: disable
  enable:
    url: https://api.example/enable
  disable:
    url: https://api.example/disable
"#;
    let http = MockHttp::new();
    http.respond("GET", "https://api.example/state", 200, r#"{"state":"off"}"#);
    http.respond("GET", "https://api.example/state", 200, r#"{"state":"on"}"#);

    let h = build_api(config, http.clone()).await;
    let function = h.api.function("poll").unwrap();

    call_blocking(&h.api, &function, None).await;
    assert_eq!(http.request_count("GET", "https://api.example/disable"), 1);
    assert_eq!(http.request_count("GET", "https://api.example/enable"), 0);

    call_blocking(&h.api, &function, None).await;
    assert_eq!(http.request_count("GET", "https://api.example/enable"), 1);
}

#[tokio::test]
async fn condition_retries_are_bounded_by_max() {
    let config = r#"
functions:
  poll:
    url: https://api.example/state
    responseType: json
    actions:
      - action: function
        type: condition
        conditionKey: "{{jsonPath::$.ready}}"
        conditionOperator: eq
        conditionValue: "true"
        trueFunction: done
        retry:
          duration: 0
          unit: seconds
          max: 2
  done:
    url: https://api.example/done
"#;
    let http = MockHttp::new();

    let h = build_api(config, http.clone()).await;
    let function = h.api.function("poll").unwrap();

    // Every poll sees "not ready": the initial call plus at most two
    // rescheduled attempts.
    for _ in 0..4 {
        http.respond("GET", "https://api.example/state", 200, r#"{"ready":false}"#);
    }
    call_blocking(&h.api, &function, None).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(http.request_count("GET", "https://api.example/state"), 3);
    assert_eq!(http.request_count("GET", "https://api.example/done"), 0);
}

#[tokio::test]
async fn run_if_condition_gates_an_action_without_error() {
    let config = r#"
functions:
  poll:
    url: https://api.example/state
    responseType: json
    actions:
      - action: variable
        name: gated
        value: ran
        runIf:
          type: condition
          conditionKey: "{{jsonPath::$.enabled}}"
          conditionOperator: eq
          conditionValue: "true"
      - action: variable
        name: always
        value: ran
"#;
    let http = MockHttp::new();
    http.respond("GET", "https://api.example/state", 200, r#"{"enabled":false}"#);
    http.respond("GET", "https://api.example/state", 200, r#"{"enabled":true}"#);

    let h = build_api(config, http.clone()).await;
    let function = h.api.function("poll").unwrap();

    call_blocking(&h.api, &function, None).await;
    assert_eq!(function.published_var("gated"), None);
    // A skipped gate does not affect later actions.
    assert_eq!(function.published_var("always").as_deref(), Some("ran"));

    call_blocking(&h.api, &function, None).await;
    assert_eq!(function.published_var("gated").as_deref(), Some("ran"));
}

#[tokio::test]
async fn store_file_persists_bytes_and_record() {
    let config = r#"
functions:
  snapshot:
    url: https://api.example/camera
    responseType: bytes
    actions:
      - action: storefile
        fileId: img-1
        fileName: snapshot
        extension: txt
        contentType: text/plain
        path: acme/camera
"#;
    let http = MockHttp::new();
    http.respond("GET", "https://api.example/camera", 200, "hello");

    let h = build_api(config, http.clone()).await;
    let function = h.api.function("snapshot").unwrap();
    call_blocking(&h.api, &function, None).await;

    let stored = std::env::temp_dir().join("apiweave-tests/acme/snapshot.txt");
    assert_eq!(std::fs::read_to_string(&stored).unwrap(), "hello");

    let record = h
        .records
        .find_file(1, "snapshot")
        .await
        .unwrap()
        .expect("file record");
    assert_eq!(record.file_id, "img-1");
    assert_eq!(record.content_type, "text/plain");
    assert_eq!(record.access_token.len(), 20);

    let url = h.tags.read_tag("acme/camera/FileURL").await.unwrap();
    assert_eq!(
        url,
        json!(format!("/system/api-file/1/{}", record.access_token))
    );
}

#[tokio::test]
async fn store_file_run_if_skips_when_the_id_is_already_stored() {
    let config = r#"
functions:
  snapshot:
    url: https://api.example/camera
    responseType: bytes
    actions:
      - action: storefile
        fileId: rev-1
        fileName: gated
        extension: txt
        contentType: text/plain
        path: acme/camera
        runIf:
          type: storeFileIdNotExists
          fileId: rev-1
          fileName: gated
"#;
    let http = MockHttp::new();
    http.respond("GET", "https://api.example/camera", 200, "hello");
    http.respond("GET", "https://api.example/camera", 200, "hello");

    let h = build_api(config, http.clone()).await;
    let function = h.api.function("snapshot").unwrap();

    call_blocking(&h.api, &function, None).await;
    let first = h.records.find_file(1, "gated").await.unwrap();
    call_blocking(&h.api, &function, None).await;
    let second = h.records.find_file(1, "gated").await.unwrap();

    // The second pass is gated off: same access token, no rewrite.
    assert_eq!(
        first.expect("record").access_token,
        second.expect("record").access_token
    );
}
