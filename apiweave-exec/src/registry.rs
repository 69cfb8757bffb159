use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use apiweave_store::{ApiConfigRecord, ConfigEvent, StoredFileRecord};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::api::{Api, EngineContext};
use crate::error::ExecError;

/// Owns every running API instance, keyed by record id, and reacts to
/// configuration record changes by tearing the affected instance down and
/// rebuilding it. Created and owned by the top-level process; anything
/// needing cross-API lookup receives a reference.
pub struct ApiRegistry {
    ctx: Arc<EngineContext>,
    apis: RwLock<HashMap<i64, Arc<Api>>>,
}

impl ApiRegistry {
    pub fn new(ctx: Arc<EngineContext>) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            apis: RwLock::new(HashMap::new()),
        })
    }

    /// Load every configuration record, start the instances and begin
    /// watching for record changes.
    pub async fn start(self: &Arc<Self>) -> Result<(), ExecError> {
        let records = self.ctx.records.list_api_configs().await?;
        for record in records {
            self.build_and_start(&record).await;
        }

        let mut events = self.ctx.records.watch_api_configs().await;
        let registry: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                match event {
                    ConfigEvent::Added(record) | ConfigEvent::Updated(record) => {
                        info!(api = %record.name, "configuration changed, rebuilding");
                        registry.build_and_start(&record).await;
                    }
                    ConfigEvent::Deleted { id } => {
                        info!(id, "configuration deleted, shutting down");
                        registry.remove(id).await;
                    }
                }
            }
        });
        Ok(())
    }

    /// Full teardown + rebuild for one record.
    async fn build_and_start(&self, record: &ApiConfigRecord) {
        self.remove(record.id).await;

        match Api::initialize(self.ctx.clone(), record).await {
            Ok(api) => {
                api.startup().await;
                let status = api.status().await.display();
                debug!(api = %api.name, status, "instance started");
                self.apis.write().await.insert(record.id, api);
            }
            Err(e) => {
                error!(api = %record.name, error = %e, "error initializing instance");
            }
        }
    }

    async fn remove(&self, id: i64) {
        if let Some(existing) = self.apis.write().await.remove(&id) {
            existing.shutdown().await;
        }
    }

    pub async fn shutdown(&self) {
        let apis: Vec<_> = self.apis.write().await.drain().map(|(_, a)| a).collect();
        futures_util::future::join_all(apis.iter().map(|api| api.shutdown())).await;
    }

    pub async fn api(&self, id: i64) -> Option<Arc<Api>> {
        self.apis.read().await.get(&id).cloned()
    }

    pub async fn api_by_name(&self, name: &str) -> Option<Arc<Api>> {
        self.apis
            .read()
            .await
            .values()
            .find(|a| a.name == name)
            .cloned()
    }

    pub async fn apis(&self) -> Vec<Arc<Api>> {
        self.apis.read().await.values().cloned().collect()
    }

    /// OAuth2 redirect endpoint: store the delivered authorization code and
    /// rebuild the instance so the next startup pass authenticates with it.
    pub async fn oauth_callback(&self, api_id: i64, code: &str) -> Result<(), ExecError> {
        let api = self
            .api(api_id)
            .await
            .ok_or_else(|| ExecError::Processing(format!("no api with id {api_id}")))?;
        let oauth2 = api
            .auth
            .as_oauth2()
            .ok_or_else(|| ExecError::Config("api does not use oauth2".to_string()))?;
        oauth2.set_authorization_code(&api, code).await?;

        if let Some(record) = self.ctx.records.get_api_config(api_id).await? {
            self.build_and_start(&record).await;
        }
        Ok(())
    }

    /// Webhook delivery endpoint: forward the raw body into the matching
    /// key's handle cycle.
    pub async fn webhook_delivery(
        &self,
        api_id: i64,
        webhook: &str,
        key: &str,
        content_type: &str,
        body: &str,
    ) -> Result<(), ExecError> {
        let api = self
            .api(api_id)
            .await
            .ok_or_else(|| ExecError::Processing(format!("no api with id {api_id}")))?;
        let webhook = api.webhook(webhook)?;
        let webhook_key = webhook.key(key)?;
        webhook
            .handle_delivery(&api, &webhook_key, content_type, body)
            .await
    }

    /// Stored-file retrieval endpoint, keyed by access token.
    pub async fn stored_file(
        &self,
        access_token: &str,
    ) -> Result<Option<(StoredFileRecord, PathBuf)>, ExecError> {
        let Some(record) = self.ctx.records.find_file_by_token(access_token).await? else {
            return Ok(None);
        };
        let Some(api) = self.api(record.api_id).await else {
            return Ok(None);
        };
        let path = self
            .ctx
            .data_dir
            .join(&api.name)
            .join(format!("{}.{}", record.file_name, record.extension));
        Ok(Some((record, path)))
    }
}
