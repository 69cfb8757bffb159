use crate::error::Violation;
use crate::types::{ApiDocument, AuthSpec, GrantType};
use crate::validate::check_expression;

pub fn validate(violations: &mut Vec<Violation>, document: &ApiDocument) {
    let Some(auth) = &document.auth_type else {
        return;
    };

    match auth {
        AuthSpec::None | AuthSpec::Basic | AuthSpec::Bearer => {}
        AuthSpec::Session(spec) => {
            check_expression(violations, "authType.url", Some(&spec.url));
            for (i, p) in spec.params.iter().enumerate() {
                if let Some(text) = p.value.as_str() {
                    check_expression(violations, &format!("authType.params[{i}].value"), Some(text));
                }
            }
        }
        AuthSpec::Token(spec) => {
            check_expression(violations, "authType.url", Some(&spec.url));
            for (i, h) in spec.headers.iter().enumerate() {
                check_expression(
                    violations,
                    &format!("authType.headers[{i}].value"),
                    Some(&h.value),
                );
            }
        }
        AuthSpec::OAuth2(spec) => {
            if spec.grant_type == GrantType::Authorizationcode && spec.auth_url.is_none() {
                violations.push(Violation::new(
                    "authType",
                    "oauth2 authorization-code grant requires authUrl",
                ));
            }
            if spec.grant_type != GrantType::Clientcredentials && spec.scope.is_none() {
                violations.push(Violation::new("authType", "oauth2 requires scope"));
            }
            check_expression(violations, "authType.authUrl", spec.auth_url.as_deref());
            check_expression(
                violations,
                "authType.accessTokenUrl",
                Some(&spec.access_token_url),
            );
            check_expression(
                violations,
                "authType.bearerAccessTokenUrl",
                spec.bearer_access_token_url.as_deref(),
            );
            check_expression(violations, "authType.redirectUrl", spec.redirect_url.as_deref());
            check_expression(violations, "authType.captchaUrl", spec.captcha_url.as_deref());
            check_expression(violations, "authType.clientId", spec.client_id.as_deref());
            check_expression(
                violations,
                "authType.clientSecret",
                spec.client_secret.as_deref(),
            );
            for (i, h) in spec.headers.iter().enumerate() {
                check_expression(
                    violations,
                    &format!("authType.headers[{i}].value"),
                    Some(&h.value),
                );
            }
        }
    }
}
