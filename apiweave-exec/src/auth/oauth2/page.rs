//! The authorization-page flow: simulate a form login against the
//! provider's hosted page, follow redirects to capture the returned code,
//! optionally pausing for a CAPTCHA image.

use std::sync::LazyLock;

use base64::Engine as _;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, error};

use crate::api::Api;
use crate::error::ExecError;
use crate::http::{HttpBody, HttpRequest, HttpResponse};

use super::{OAuth2, VARIABLE_PASSWORD, VARIABLE_USERNAME};

static FORM_ACTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<form[^>]*\baction\s*=\s*"([^"]*)""#).expect("valid regex")
});
static INPUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<input\b[^>]*>").expect("valid regex"));
static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)\b(type|name|value)\s*=\s*"([^"]*)""#).expect("valid regex")
});

impl OAuth2 {
    /// Fetch the provider's login page, post credentials through its form
    /// and either capture the authorization code or return the CAPTCHA
    /// image the operator must solve first.
    pub async fn authorization_page(&self, api: &Api) -> Result<Option<Vec<u8>>, ExecError> {
        {
            let mut flow = self.flow.lock().await;
            *flow = super::PageFlow::default();
        }
        self.generate_code_challenge(api).await;

        let auth_url = self
            .auth_url_value(api)
            .ok_or_else(|| ExecError::Config("oauth2: missing auth url".to_string()))?;
        let challenge = api
            .variables
            .get(super::VARIABLE_PKCE_CODE_CHALLENGE)
            .unwrap_or_default();
        let params: Vec<(String, String)> = vec![
            ("client_id".to_string(), self.actual_client_id(api)),
            ("code_challenge".to_string(), challenge),
            ("code_challenge_method".to_string(), "S256".to_string()),
            ("redirect_uri".to_string(), self.actual_redirect_url(api)),
            ("response_type".to_string(), "code".to_string()),
            ("scope".to_string(), self.scope().to_string()),
            ("state".to_string(), self.redirect_state(api)),
        ];

        let mut request = HttpRequest::new("GET", auth_url.clone());
        request.query = params.clone();
        self.apply_user_agent(&mut request).await;

        debug!(api = %api.name, url = %auth_url, "fetching authorization page");
        let response = api.http.send(request).await?;
        if !response.is_success() {
            return Err(ExecError::Processing(
                "oauth2: failed to get login page".to_string(),
            ));
        }

        let page = response.text();
        let action = parse_form_action(&page).ok_or_else(|| {
            ExecError::Processing("oauth2: login page has no form".to_string())
        })?;
        let form_url = resolve_base(&response.url, &action)?;

        let mut body = parse_hidden_inputs(&page);
        body.push((
            self.username_input.clone(),
            api.variables.get(VARIABLE_USERNAME).unwrap_or_default(),
        ));
        body.push((
            self.password_input.clone(),
            api.variables.get(VARIABLE_PASSWORD).unwrap_or_default(),
        ));

        {
            let mut flow = self.flow.lock().await;
            flow.redirect_url = Some(form_url.clone());
            flow.params = params;
            flow.body = body.clone();
        }

        let mut request = HttpRequest::new("POST", form_url.clone());
        request.body = Some(HttpBody::Form(body));
        request.follow_redirects = false;
        self.apply_user_agent(&mut request).await;

        debug!(api = %api.name, url = %form_url, "posting login form");
        let response = api.http.send(request).await?;

        if response.is_success() {
            if self.requires_captcha() {
                let captcha_url = self
                    .captcha_url
                    .as_ref()
                    .ok_or_else(|| {
                        ExecError::Config("oauth2: captcha flow missing captchaUrl".to_string())
                    })?
                    .value(&apiweave_core::EvalContext::new(api))?;

                let mut request = HttpRequest::new("GET", captcha_url);
                self.apply_user_agent(&mut request).await;
                let response = api.http.send(request).await?;
                if response.is_success() {
                    return Ok(Some(response.body));
                }
                return Err(ExecError::Processing(
                    "oauth2: failed to get captcha image".to_string(),
                ));
            }
            self.chase_authorization_code(api, response).await;
            Ok(None)
        } else if response.status == 302 {
            self.chase_authorization_code(api, response).await;
            Ok(None)
        } else {
            Err(ExecError::Processing(
                "oauth2: failed to get authorization code".to_string(),
            ))
        }
    }

    /// Resume the login flow with the operator-submitted CAPTCHA answer.
    pub async fn submit_captcha(&self, api: &Api, captcha_code: &str) -> Result<(), ExecError> {
        let (url, params, mut body) = {
            let flow = self.flow.lock().await;
            let url = flow.redirect_url.clone().ok_or_else(|| {
                ExecError::Processing("oauth2: no login flow in progress".to_string())
            })?;
            (url, flow.params.clone(), flow.body.clone())
        };
        body.push(("captcha".to_string(), captcha_code.to_string()));

        let mut request = HttpRequest::new("POST", url.clone());
        request.query = params;
        request.body = Some(HttpBody::Form(body));
        request.follow_redirects = false;
        self.apply_user_agent(&mut request).await;

        debug!(api = %api.name, url = %url, "re-posting login form with captcha");
        let response = api.http.send(request).await?;
        self.chase_authorization_code(api, response).await;
        Ok(())
    }

    /// Follow 302 hops manually until the provider redirects back to our
    /// redirect URL, then pull `code` out of the location query.
    pub(crate) async fn chase_authorization_code(&self, api: &Api, mut response: HttpResponse) {
        let redirect_url = self.actual_redirect_url(api);
        let mut location = None;

        loop {
            if response.status != 302 {
                break;
            }
            let Some(loc) = response.header("Location").map(str::to_string) else {
                break;
            };

            if loc.starts_with(&redirect_url) {
                location = Some(loc);
                break;
            }

            let target = match resolve_base(&response.url, &loc) {
                Ok(t) => t,
                Err(e) => {
                    error!(error = %e, "error resolving redirect location");
                    return;
                }
            };

            let mut request = HttpRequest::new("GET", target);
            request.follow_redirects = false;
            self.apply_user_agent(&mut request).await;

            response = match api.http.send(request).await {
                Ok(r) => r,
                Err(e) => {
                    error!(error = %e, "error following authorization redirect");
                    return;
                }
            };
            location = response.header("Location").map(str::to_string);
        }

        let Some(location) = location else {
            error!("couldn't find redirect location for authorization code");
            return;
        };

        match parse_location_query(&location) {
            Some(code) => {
                debug!("found authorization code");
                if let Err(e) = self.set_authorization_code(api, &code).await {
                    error!(error = %e, "error setting authorization code");
                }
            }
            None => error!(location = %location, "couldn't find code in location header"),
        }
    }

    async fn apply_user_agent(&self, request: &mut HttpRequest) {
        if self.random_user_agent() {
            let mut flow = self.flow.lock().await;
            let agent = flow.user_agent.get_or_insert_with(generate_user_agent).clone();
            request.headers.insert("User-Agent".to_string(), agent);
        }
    }
}

pub(crate) fn parse_form_action(page: &str) -> Option<String> {
    FORM_ACTION_RE
        .captures(page)
        .map(|caps| caps[1].to_string())
}

pub(crate) fn parse_hidden_inputs(page: &str) -> Vec<(String, String)> {
    let mut inputs = Vec::new();
    for tag in INPUT_RE.find_iter(page) {
        let mut kind = None;
        let mut name = None;
        let mut value = None;
        for caps in ATTR_RE.captures_iter(tag.as_str()) {
            match caps[1].to_ascii_lowercase().as_str() {
                "type" => kind = Some(caps[2].to_string()),
                "name" => name = Some(caps[2].to_string()),
                "value" => value = Some(caps[2].to_string()),
                _ => {}
            }
        }
        if kind.as_deref() == Some("hidden") {
            if let Some(name) = name {
                inputs.push((name, value.unwrap_or_default()));
            }
        }
    }
    inputs
}

/// Resolve a possibly relative location against the URL the response came
/// from.
fn resolve_base(response_url: &str, location: &str) -> Result<String, ExecError> {
    if location.is_empty() {
        return Ok(response_url.to_string());
    }
    url::Url::parse(response_url)
        .and_then(|base| base.join(location))
        .map(|u| u.to_string())
        .map_err(|e| ExecError::Processing(format!("invalid location '{location}': {e}")))
}

fn parse_location_query(location: &str) -> Option<String> {
    let url = url::Url::parse(location).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == "code")
        .map(|(_, v)| v.to_string())
}

pub(crate) fn generate_user_agent() -> String {
    (0..5)
        .map(|_| (b'a' + fastrand::u8(..26)) as char)
        .collect()
}

pub(crate) fn generate_code_verifier() -> String {
    const ALPHABET: &[u8] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";
    (0..64)
        .map(|_| ALPHABET[fastrand::usize(..ALPHABET.len())] as char)
        .collect()
}

pub(crate) fn code_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
}

pub(crate) fn join_query(url: &str, params: &[(&str, &str)]) -> String {
    let mut out = String::from(url);
    out.push(if url.contains('?') { '&' } else { '?' });
    for (i, (k, v)) in params.iter().enumerate() {
        if i > 0 {
            out.push('&');
        }
        out.push_str(&format!("{}={}", k, urlencoding::encode(v)));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_action_and_hidden_inputs() {
        let page = r#"
            <html><body>
            <form method="post" action="/login/submit">
              <input type="hidden" name="csrf" value="abc123">
              <input type="text" name="username">
              <input type="hidden" name="flow" value="oauth">
            </form>
            </body></html>
        "#;
        assert_eq!(parse_form_action(page).as_deref(), Some("/login/submit"));
        assert_eq!(
            parse_hidden_inputs(page),
            vec![
                ("csrf".to_string(), "abc123".to_string()),
                ("flow".to_string(), "oauth".to_string())
            ]
        );
    }

    #[test]
    fn code_challenge_is_urlsafe_sha256() {
        let challenge = code_challenge("test-verifier");
        assert!(!challenge.contains('='));
        assert!(!challenge.contains('+'));
        assert_eq!(challenge.len(), 43);
    }

    #[test]
    fn join_query_appends() {
        let url = join_query("https://x.example/auth", &[("a", "1"), ("b", "c d")]);
        assert_eq!(url, "https://x.example/auth?a=1&b=c%20d");
    }
}
