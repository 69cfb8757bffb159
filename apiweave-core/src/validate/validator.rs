use crate::error::Violation;
use crate::types::ApiDocument;

use super::rules;

/// Walk the whole document collecting violations. Parse-level shape errors
/// (missing required keys, unknown discriminators) are already rejected by
/// the deserializer; this pass covers expression syntax and
/// cross-references.
pub fn validate_document(document: &ApiDocument) -> Vec<Violation> {
    let mut violations = Vec::new();

    rules::auth::validate(&mut violations, document);
    rules::headers::validate(&mut violations, document);
    rules::functions::validate(&mut violations, document);
    rules::webhooks::validate(&mut violations, document);

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_document_str;

    fn violations_of(yaml: &str) -> Vec<String> {
        let doc = parse_document_str(yaml).unwrap().document;
        validate_document(&doc)
            .into_iter()
            .map(|v| v.to_string())
            .collect()
    }

    #[test]
    fn valid_document_has_no_violations() {
        let v = violations_of(
            r#"
authType:
  type: oauth2
  grantType: clientcredentials
  accessTokenUrl: https://login.example.com/token
functions:
  poll:
    url: https://api.example.com/devices
    schedule:
      type: cron
      cron: "*/5 * * * *"
    actions:
      - action: tag
        type: jsonexpand
"#,
        );
        assert!(v.is_empty(), "unexpected violations: {v:?}");
    }

    #[test]
    fn oauth2_authorization_code_requires_auth_url() {
        let v = violations_of(
            r#"
authType:
  type: oauth2
  accessTokenUrl: https://login.example.com/token
  scope: read
"#,
        );
        assert!(v.iter().any(|m| m.contains("authUrl")), "{v:?}");
    }

    #[test]
    fn missing_dependency_is_reported() {
        let v = violations_of(
            r#"
functions:
  poll:
    url: https://api.example.com/devices
    depends: login
"#,
        );
        assert!(v.iter().any(|m| m.contains("depends")), "{v:?}");
    }

    #[test]
    fn bad_expression_is_reported() {
        let v = violations_of(
            r#"
functions:
  poll:
    url: "https://api.example.com/{{bogus::x}}"
"#,
        );
        assert!(v.iter().any(|m| m.contains("bogus")), "{v:?}");
    }

    #[test]
    fn bad_cron_is_reported() {
        let v = violations_of(
            r#"
functions:
  poll:
    url: https://api.example.com/devices
    schedule:
      type: cron
      cron: "not a cron"
"#,
        );
        assert!(v.iter().any(|m| m.contains("cron")), "{v:?}");
    }

    #[test]
    fn webhook_check_requires_url() {
        let v = violations_of(
            r#"
webhooks:
  device:
    check:
      method: get
    add:
      url: https://api.example.com/hooks
    remove:
      url: https://api.example.com/hooks/remove
    handle:
      actions:
        - action: tag
          type: jsonexpand
"#,
        );
        assert!(v.iter().any(|m| m.contains("check") && m.contains("url")), "{v:?}");
    }
}
