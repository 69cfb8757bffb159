use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

#[derive(Debug, Clone, thiserror::Error)]
pub enum HttpError {
    #[error("timeout")]
    Timeout,
    #[error("connect/dns/tls error: {0}")]
    Network(String),
    #[error("http client error: {0}")]
    Other(String),
}

#[derive(Debug, Clone)]
pub enum HttpBody {
    Raw(String),
    Form(Vec<(String, String)>),
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub query: Vec<(String, String)>,
    pub body: Option<HttpBody>,
    /// When false the transport must not follow redirects; the caller owns
    /// hop-following.
    pub follow_redirects: bool,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: BTreeMap::new(),
            query: Vec::new(),
            body: None,
            follow_redirects: true,
        }
    }

    pub fn body_for_log(&self) -> String {
        match &self.body {
            None => "none".to_string(),
            Some(HttpBody::Raw(text)) => text.clone(),
            Some(HttpBody::Form(params)) => crate::sanitize::params_for_log(params),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// Final URL of the exchange (after any transport-followed redirects).
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 300 | 301 | 302 | 303 | 307 | 308)
    }
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, req: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// Per-API transport options derived from the configuration document.
#[derive(Debug, Clone)]
pub struct HttpOptions {
    /// Share a cookie jar across all calls of the API.
    pub session: bool,
    pub verify_tls: bool,
    /// PEM bundle (certificate + private key) presented as client identity.
    pub identity_pem: Option<Vec<u8>>,
    pub timeout: Duration,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            session: false,
            verify_tls: true,
            identity_pem: None,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Transport over reqwest. Two clients share one cookie jar: the default
/// client follows redirects, the manual one never does.
pub struct ReqwestHttpClient {
    follow: reqwest::Client,
    manual: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn build(options: &HttpOptions) -> Result<Self, HttpError> {
        let jar = options
            .session
            .then(|| Arc::new(reqwest::cookie::Jar::default()));

        let follow = Self::builder(options, jar.clone(), reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| HttpError::Other(e.to_string()))?;
        let manual = Self::builder(options, jar, reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| HttpError::Other(e.to_string()))?;

        Ok(Self { follow, manual })
    }

    fn builder(
        options: &HttpOptions,
        jar: Option<Arc<reqwest::cookie::Jar>>,
        redirect: reqwest::redirect::Policy,
    ) -> reqwest::ClientBuilder {
        let mut builder = reqwest::Client::builder()
            .redirect(redirect)
            .timeout(options.timeout)
            .user_agent(concat!("apiweave/", env!("CARGO_PKG_VERSION")));

        if let Some(jar) = jar {
            builder = builder.cookie_provider(jar);
        }
        if !options.verify_tls {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(pem) = &options.identity_pem {
            if let Ok(identity) = reqwest::Identity::from_pem(pem) {
                builder = builder.identity(identity);
            }
        }
        builder
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send(&self, req: HttpRequest) -> Result<HttpResponse, HttpError> {
        let client = if req.follow_redirects {
            &self.follow
        } else {
            &self.manual
        };

        let method: reqwest::Method = req
            .method
            .parse()
            .map_err(|_| HttpError::Other(format!("invalid method '{}'", req.method)))?;

        let mut rb = client.request(method, &req.url);
        for (k, v) in &req.headers {
            rb = rb.header(k, v);
        }
        if !req.query.is_empty() {
            rb = rb.query(&req.query);
        }
        match req.body {
            Some(HttpBody::Raw(text)) => rb = rb.body(text),
            Some(HttpBody::Form(params)) => rb = rb.form(&params),
            None => {}
        }

        let resp = rb.send().await.map_err(map_reqwest_error)?;
        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();

        let mut headers = BTreeMap::new();
        for (k, v) in resp.headers().iter() {
            if let Ok(s) = v.to_str() {
                headers.insert(k.to_string(), s.to_string());
            }
        }

        let body = resp.bytes().await.map_err(map_reqwest_error)?.to_vec();

        Ok(HttpResponse {
            status,
            url: final_url,
            headers,
            body,
        })
    }
}

fn map_reqwest_error(e: reqwest::Error) -> HttpError {
    if e.is_timeout() {
        return HttpError::Timeout;
    }
    if e.is_connect() || e.is_request() {
        return HttpError::Network(e.to_string());
    }
    HttpError::Other(e.to_string())
}
