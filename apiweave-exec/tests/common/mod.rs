#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use apiweave_exec::{
    Api, EngineContext, HttpClient, HttpError, HttpRequest, HttpResponse, NoopScriptBridge,
};
use apiweave_store::{ApiConfigRecord, MemoryRecordStore, MemoryTagStore};
use async_trait::async_trait;

/// Scripted transport: responses are queued per (method, url) and consumed
/// in order; every sent request is recorded.
#[derive(Default)]
pub struct MockHttp {
    routes: Mutex<HashMap<(String, String), VecDeque<HttpResponse>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockHttp {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, method: &str, url: &str, status: u16, body: &str) {
        self.respond_with(method, url, response(url, status, body));
    }

    pub fn respond_with(&self, method: &str, url: &str, resp: HttpResponse) {
        self.routes
            .lock()
            .expect("routes lock")
            .entry((method.to_string(), url.to_string()))
            .or_default()
            .push_back(resp);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn request_count(&self, method: &str, url: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method && r.url == url)
            .count()
    }
}

pub fn response(url: &str, status: u16, body: &str) -> HttpResponse {
    HttpResponse {
        status,
        url: url.to_string(),
        headers: Default::default(),
        body: body.as_bytes().to_vec(),
    }
}

pub fn redirect_response(url: &str, status: u16, location: &str) -> HttpResponse {
    let mut resp = response(url, status, "");
    resp.headers
        .insert("Location".to_string(), location.to_string());
    resp
}

#[async_trait]
impl HttpClient for MockHttp {
    async fn send(&self, req: HttpRequest) -> Result<HttpResponse, HttpError> {
        self.requests.lock().expect("requests lock").push(req.clone());
        let mut routes = self.routes.lock().expect("routes lock");
        let queued = routes
            .get_mut(&(req.method.clone(), req.url.clone()))
            .and_then(VecDeque::pop_front);
        Ok(queued.unwrap_or_else(|| response(&req.url, 200, "{}")))
    }
}

pub struct Harness {
    pub api: Arc<Api>,
    pub tags: Arc<MemoryTagStore>,
    pub records: Arc<MemoryRecordStore>,
    pub http: Arc<MockHttp>,
}

/// Build an instance named `acme` around the given configuration and the
/// scripted transport.
pub async fn build_api(configuration: &str, http: Arc<MockHttp>) -> Harness {
    build_named_api("acme", configuration, http).await
}

pub async fn build_named_api(name: &str, configuration: &str, http: Arc<MockHttp>) -> Harness {
    let tags = Arc::new(MemoryTagStore::new());
    let records = Arc::new(MemoryRecordStore::new());

    let ctx = Arc::new(EngineContext {
        tags: tags.clone(),
        records: records.clone(),
        scripts: Arc::new(NoopScriptBridge),
        base_url: "http://gateway.local:8088".to_string(),
        data_dir: std::env::temp_dir().join("apiweave-tests"),
        license_expired: false,
        http: Some(http.clone()),
    });

    let record = ApiConfigRecord {
        id: 1,
        name: name.to_string(),
        enabled: true,
        configuration: configuration.to_string(),
    };

    let api = Api::initialize(ctx, &record).await.expect("api initializes");
    Harness {
        api,
        tags,
        records,
        http,
    }
}
