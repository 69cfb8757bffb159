use apiweave_core::types::{
    ActionSpec, AuthSpec, FunctionActionType, GrantType, Method, ResponseType, ScheduleSpec,
    TagMode,
};
use apiweave_core::{parse_document_str, validate_document};

const FULL_DOCUMENT: &str = r#"
authType:
  type: oauth2
  grantType: authorizationcode
  authUrl: https://login.vendor.example/authorize
  accessTokenUrl: https://login.vendor.example/token
  scope: devices:read devices:write
  clientId: gateway-client
session: true
headers:
  - key: Accept
    value: application/json
variables:
  siteId:
    required: true
  installKey:
    uuid: true
    hidden: true
functions:
  devices:
    url: https://api.vendor.example/v1/devices
    method: get
    responseType: json
    schedule:
      type: timer
      duration: 5
      unit: minutes
    actions:
      - action: tag
        type: jsonwrite
        path: "{{var::apiName}}/Devices"
        udts:
          - id: Device
            items: "{{jsonPath::$.devices[*]}}"
            name: "{{jsonPath::item::$.label}}"
      - action: function
        type: condition
        conditionKey: "{{jsonPath::$.count}}"
        conditionOperator: gt
        conditionValue: 0
        trueFunction: refresh
  refresh:
    url: https://api.vendor.example/v1/devices/refresh
    method: post
    schedule:
      type: manual
webhooks:
  motion:
    checkOnStart: true
    key: "{{var::siteId}}"
    ttl: 7
    check:
      url: https://api.vendor.example/v1/hooks/{{var::siteId}}
    add:
      url: https://api.vendor.example/v1/hooks
      method: post
      body:
        type: json
        params:
          - name: url
            value: "{{var::webhook.url}}"
    remove:
      url: https://api.vendor.example/v1/hooks/{{var::siteId}}
      method: delete
    handle:
      actions:
        - action: tag
          type: jsonexpand
          path: "{{var::apiName}}/Motion"
"#;

#[test]
fn full_document_parses_and_validates() {
    let parsed = parse_document_str(FULL_DOCUMENT).unwrap();
    let doc = parsed.document;

    match &doc.auth_type {
        Some(AuthSpec::OAuth2(oauth2)) => {
            assert_eq!(oauth2.grant_type, GrantType::Authorizationcode);
            assert_eq!(oauth2.access_token_key, "access_token");
        }
        other => panic!("unexpected auth: {other:?}"),
    }
    assert!(doc.session);

    let devices = &doc.functions["devices"];
    assert_eq!(devices.method, Method::Get);
    assert_eq!(devices.response_type, ResponseType::Json);
    assert_eq!(
        devices.schedule,
        Some(ScheduleSpec::Timer {
            duration: 5,
            unit: apiweave_core::types::TimeUnitSpec::Minutes
        })
    );

    match &devices.actions[0] {
        ActionSpec::Tag(tag) => {
            assert_eq!(tag.r#type, TagMode::Jsonwrite);
            assert_eq!(tag.udts.len(), 1);
            assert_eq!(tag.udts[0].id, "Device");
        }
        other => panic!("unexpected action: {other:?}"),
    }
    match &devices.actions[1] {
        ActionSpec::Function(spec) => {
            assert_eq!(spec.r#type, FunctionActionType::Condition);
            assert_eq!(spec.true_function.as_deref(), Some("refresh"));
        }
        other => panic!("unexpected action: {other:?}"),
    }

    let webhook = &doc.webhooks["motion"];
    assert!(webhook.check_on_start);
    assert_eq!(webhook.ttl, Some(7));
    assert!(webhook.handle.url.is_none());

    let violations = validate_document(&doc);
    assert!(violations.is_empty(), "unexpected violations: {violations:?}");
}

#[test]
fn unknown_action_discriminator_is_a_parse_error() {
    let doc = r#"
functions:
  poll:
    url: https://api.example/x
    actions:
      - action: teleport
"#;
    assert!(parse_document_str(doc).is_err());
}

#[test]
fn unknown_auth_discriminator_is_a_parse_error() {
    let doc = r#"
authType:
  type: kerberos
"#;
    assert!(parse_document_str(doc).is_err());
}

#[test]
fn variables_default_to_required() {
    let doc = parse_document_str("variables:\n  apiKey: {}\n").unwrap().document;
    assert!(doc.variables["apiKey"].required);
    assert!(!doc.variables["apiKey"].sensitive);
}
