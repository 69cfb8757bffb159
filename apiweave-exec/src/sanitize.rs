use std::collections::BTreeMap;

const REDACTED: &str = "<redacted>";

/// Header names whose values never reach the logs.
const SENSITIVE_HEADERS: &[&str] = &["authorization", "cookie", "set-cookie", "2fa-code"];

/// Render headers for request/response traces with credentials removed.
pub fn headers_for_log(headers: &BTreeMap<String, String>) -> String {
    let mut out = String::from("{");
    for (i, (k, v)) in headers.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(k);
        out.push('=');
        if SENSITIVE_HEADERS.iter().any(|s| k.eq_ignore_ascii_case(s)) {
            out.push_str(REDACTED);
        } else {
            out.push_str(v);
        }
    }
    out.push('}');
    out
}

/// Render form parameters, redacting well-known credential fields.
pub fn params_for_log(params: &[(String, String)]) -> String {
    const SENSITIVE_PARAMS: &[&str] = &[
        "password",
        "client_secret",
        "code",
        "code_verifier",
        "refresh_token",
    ];
    let mut out = String::from("{");
    for (i, (k, v)) in params.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(k);
        out.push('=');
        if SENSITIVE_PARAMS.iter().any(|s| k.eq_ignore_ascii_case(s)) {
            out.push_str(REDACTED);
        } else {
            out.push_str(v);
        }
    }
    out.push('}');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_is_redacted() {
        let mut headers = BTreeMap::new();
        headers.insert("Authorization".to_string(), "Bearer abc".to_string());
        headers.insert("Accept".to_string(), "application/json".to_string());
        let rendered = headers_for_log(&headers);
        assert!(rendered.contains("Accept=application/json"));
        assert!(!rendered.contains("abc"));
    }
}
