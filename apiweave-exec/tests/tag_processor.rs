mod common;

use apiweave_exec::executor::call_blocking;
use apiweave_store::{TagStore, UdtMember};
use common::{build_api, MockHttp};
use serde_json::json;

const PROFILE_RESPONSE: &str = r#"{"id": 1, "profile": {"name": "Bob"}}"#;

fn profile_config(mode: &str) -> String {
    format!(
        r#"
functions:
  profile:
    url: https://api.example/profile
    responseType: json
    actions:
      - action: tag
        type: {mode}
        path: acme
        udts:
          - id: Profile
            items: "{{{{jsonPath::$.profile}}}}"
"#
    )
}

#[tokio::test]
async fn jsonwrite_emits_only_leaves_inside_groups() {
    let http = MockHttp::new();
    http.respond("GET", "https://api.example/profile", 200, PROFILE_RESPONSE);

    let h = build_api(&profile_config("jsonwrite"), http).await;
    let function = h.api.function("profile").unwrap();
    call_blocking(&h.api, &function, None).await;

    // Exactly one written leaf, inside the group.
    assert_eq!(
        h.tags.read_tag("acme/Profile/name").await.unwrap(),
        json!("Bob")
    );
    // `id` sits outside the declared group and is pruned.
    assert!(!h.tags.tag_exists("acme/id").await);

    // One group definition with one field, one instance at the group path.
    let def = h.tags.definition("acme/Profile").await.expect("definition");
    assert_eq!(def.members.len(), 1);
    match &def.members[0] {
        UdtMember::Value { path, .. } => assert_eq!(path, "name"),
        other => panic!("unexpected member: {other:?}"),
    }
}

#[tokio::test]
async fn jsonexpand_emits_everything() {
    let http = MockHttp::new();
    http.respond("GET", "https://api.example/profile", 200, PROFILE_RESPONSE);

    let h = build_api(&profile_config("jsonexpand"), http).await;
    let function = h.api.function("profile").unwrap();
    call_blocking(&h.api, &function, None).await;

    assert_eq!(h.tags.read_tag("acme/id").await.unwrap(), json!(1));
    assert_eq!(
        h.tags.read_tag("acme/Profile/name").await.unwrap(),
        json!("Bob")
    );
}

#[tokio::test]
async fn reprocessing_the_same_response_is_idempotent() {
    let http = MockHttp::new();
    http.respond("GET", "https://api.example/profile", 200, PROFILE_RESPONSE);
    http.respond("GET", "https://api.example/profile", 200, PROFILE_RESPONSE);

    let h = build_api(&profile_config("jsonwrite"), http).await;
    let function = h.api.function("profile").unwrap();
    call_blocking(&h.api, &function, None).await;
    call_blocking(&h.api, &function, None).await;

    let def = h.tags.definition("acme/Profile").await.expect("definition");
    assert_eq!(def.members.len(), 1);
    assert_eq!(
        h.tags.read_tag("acme/Profile/name").await.unwrap(),
        json!("Bob")
    );
}

#[tokio::test]
async fn renames_apply_at_original_locations() {
    let config = r#"
functions:
  device:
    url: https://api.example/device
    responseType: json
    actions:
      - action: tag
        type: jsonexpand
        path: acme
        rename:
          - items: "{{jsonPath::$.t}}"
            name: Temperature
"#;
    let http = MockHttp::new();
    http.respond(
        "GET",
        "https://api.example/device",
        200,
        r#"{"t": 21.5, "h": 40}"#,
    );

    let h = build_api(config, http).await;
    let function = h.api.function("device").unwrap();
    call_blocking(&h.api, &function, None).await;

    assert_eq!(
        h.tags.read_tag("acme/Temperature").await.unwrap(),
        json!(21.5)
    );
    assert!(!h.tags.tag_exists("acme/t").await);
    assert_eq!(h.tags.read_tag("acme/h").await.unwrap(), json!(40));
}

#[tokio::test]
async fn arrays_become_indexed_children() {
    let config = r#"
functions:
  list:
    url: https://api.example/list
    responseType: json
    actions:
      - action: tag
        type: jsonexpand
        path: acme/devices
"#;
    let http = MockHttp::new();
    http.respond(
        "GET",
        "https://api.example/list",
        200,
        r#"[{"id":"a"},{"id":"b"}]"#,
    );

    let h = build_api(config, http).await;
    let function = h.api.function("list").unwrap();
    call_blocking(&h.api, &function, None).await;

    assert_eq!(h.tags.read_tag("acme/devices/0/id").await.unwrap(), json!("a"));
    assert_eq!(h.tags.read_tag("acme/devices/1/id").await.unwrap(), json!("b"));
}

#[tokio::test]
async fn nested_groups_compose_instead_of_flattening() {
    let config = r#"
functions:
  site:
    url: https://api.example/site
    responseType: json
    actions:
      - action: tag
        type: jsonwrite
        path: acme
        udts:
          - id: Site
            items: "{{jsonPath::$.site}}"
          - id: Meter
            items: "{{jsonPath::$.site.meter}}"
"#;
    let http = MockHttp::new();
    http.respond(
        "GET",
        "https://api.example/site",
        200,
        r#"{"site": {"label": "plant", "meter": {"kwh": 42}}}"#,
    );

    let h = build_api(config, http).await;
    let function = h.api.function("site").unwrap();
    call_blocking(&h.api, &function, None).await;

    // Leaf group first, then the parent composed from it.
    let meter = h.tags.definition("acme/Meter").await.expect("meter definition");
    assert!(matches!(&meter.members[0], UdtMember::Value { path, .. } if path == "kwh"));

    let site = h.tags.definition("acme/Site").await.expect("site definition");
    let nested: Vec<_> = site
        .members
        .iter()
        .filter(|m| matches!(m, UdtMember::Nested { .. }))
        .collect();
    assert_eq!(nested.len(), 1);
    match nested[0] {
        UdtMember::Nested { def_path, path } => {
            assert_eq!(def_path, "acme/Meter");
            assert_eq!(path, "Meter");
        }
        _ => unreachable!(),
    }

    // Direct members come from the site's own leaves, not the meter's.
    assert!(site
        .members
        .iter()
        .any(|m| matches!(m, UdtMember::Value { path, .. } if path == "label")));
    assert!(!site
        .members
        .iter()
        .any(|m| matches!(m, UdtMember::Value { path, .. } if path.contains("kwh"))));

    assert_eq!(h.tags.read_tag("acme/Site/label").await.unwrap(), json!("plant"));
    assert_eq!(h.tags.read_tag("acme/Site/Meter/kwh").await.unwrap(), json!(42));
}

#[tokio::test]
async fn text_mode_writes_opaque_response() {
    let config = r#"
functions:
  raw:
    url: https://api.example/raw
    actions:
      - action: tag
        type: text
        path: acme/raw
"#;
    let http = MockHttp::new();
    http.respond("GET", "https://api.example/raw", 200, "not json at all");

    let h = build_api(config, http).await;
    let function = h.api.function("raw").unwrap();
    call_blocking(&h.api, &function, None).await;

    assert_eq!(
        h.tags.read_tag("acme/raw/Value").await.unwrap(),
        json!("not json at all")
    );
}

#[tokio::test]
async fn switch_mode_writes_first_matching_case() {
    let config = r#"
functions:
  state:
    url: https://api.example/state
    responseType: json
    actions:
      - action: tag
        type: switch
        path: acme
        cases:
          - conditionKey: "{{jsonPath::$.state}}"
            conditionOperator: eq
            conditionValue: armed
            variables:
              - name: path
                value: Alarm/State
              - name: value
                value: Armed
          - conditionKey: "{{jsonPath::$.state}}"
            conditionOperator: eq
            conditionValue: disarmed
            variables:
              - name: path
                value: Alarm/State
              - name: value
                value: Disarmed
"#;
    let http = MockHttp::new();
    http.respond(
        "GET",
        "https://api.example/state",
        200,
        r#"{"state":"disarmed"}"#,
    );

    let h = build_api(config, http).await;
    let function = h.api.function("state").unwrap();
    call_blocking(&h.api, &function, None).await;

    assert_eq!(
        h.tags.read_tag("acme/Alarm/State").await.unwrap(),
        json!("Disarmed")
    );
}

#[tokio::test]
async fn declared_tags_honor_add_if_not_exists_and_defaults() {
    let config = r#"
functions:
  poll:
    url: https://api.example/data
    responseType: json
    actions:
      - action: tag
        type: jsonexpand
        path: acme
        tags:
          - name: Refresh
            dataType: boolean
            defaultValue: "false"
"#;
    let http = MockHttp::new();
    http.respond("GET", "https://api.example/data", 200, r#"{"v": 1}"#);

    let h = build_api(config, http).await;
    let function = h.api.function("poll").unwrap();
    call_blocking(&h.api, &function, None).await;

    assert!(h.tags.tag_exists("acme/Refresh").await);
    assert_eq!(h.tags.read_tag("acme/Refresh").await.unwrap(), json!("false"));
}
