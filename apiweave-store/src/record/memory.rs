use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};

use crate::types::{
    ApiConfigRecord, CertificateRecord, ConfigEvent, StoreError, StoredFileRecord, VariableRecord,
    WebhookKeyRecord,
};

use super::RecordStore;

#[derive(Default)]
struct Inner {
    configs: HashMap<i64, ApiConfigRecord>,
    variables: HashMap<(i64, String), VariableRecord>,
    webhook_keys: HashMap<(i64, String, String), WebhookKeyRecord>,
    files: HashMap<(i64, String), StoredFileRecord>,
    certificates: HashMap<i64, CertificateRecord>,
    watchers: Vec<mpsc::UnboundedSender<ConfigEvent>>,
}

/// In-memory reference implementation of [`RecordStore`].
#[derive(Default)]
pub struct MemoryRecordStore {
    inner: RwLock<Inner>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a configuration record and notify watchers.
    pub async fn put_api_config(&self, record: ApiConfigRecord) {
        let mut inner = self.inner.write().await;
        let event = if inner.configs.contains_key(&record.id) {
            ConfigEvent::Updated(record.clone())
        } else {
            ConfigEvent::Added(record.clone())
        };
        inner.configs.insert(record.id, record);
        inner.watchers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub async fn remove_api_config(&self, id: i64) {
        let mut inner = self.inner.write().await;
        if inner.configs.remove(&id).is_some() {
            inner
                .watchers
                .retain(|tx| tx.send(ConfigEvent::Deleted { id }).is_ok());
        }
    }

    pub async fn put_certificate(&self, record: CertificateRecord) {
        self.inner
            .write()
            .await
            .certificates
            .insert(record.api_id, record);
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn list_api_configs(&self) -> Result<Vec<ApiConfigRecord>, StoreError> {
        let inner = self.inner.read().await;
        let mut configs: Vec<_> = inner.configs.values().cloned().collect();
        configs.sort_by_key(|c| c.id);
        Ok(configs)
    }

    async fn get_api_config(&self, id: i64) -> Result<Option<ApiConfigRecord>, StoreError> {
        Ok(self.inner.read().await.configs.get(&id).cloned())
    }

    async fn watch_api_configs(&self) -> mpsc::UnboundedReceiver<ConfigEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.write().await.watchers.push(tx);
        rx
    }

    async fn list_variables(&self, api_id: i64) -> Result<Vec<VariableRecord>, StoreError> {
        let inner = self.inner.read().await;
        let mut records: Vec<_> = inner
            .variables
            .values()
            .filter(|r| r.api_id == api_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(records)
    }

    async fn upsert_variable(&self, record: VariableRecord) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .variables
            .insert((record.api_id, record.key.clone()), record);
        Ok(())
    }

    async fn delete_variable(&self, api_id: i64, key: &str) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .variables
            .remove(&(api_id, key.to_string()));
        Ok(())
    }

    async fn list_webhook_keys(
        &self,
        api_id: i64,
        name: &str,
    ) -> Result<Vec<WebhookKeyRecord>, StoreError> {
        let inner = self.inner.read().await;
        let mut records: Vec<_> = inner
            .webhook_keys
            .values()
            .filter(|r| r.api_id == api_id && r.name == name)
            .cloned()
            .collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(records)
    }

    async fn upsert_webhook_key(&self, record: WebhookKeyRecord) -> Result<(), StoreError> {
        self.inner.write().await.webhook_keys.insert(
            (record.api_id, record.name.clone(), record.key.clone()),
            record,
        );
        Ok(())
    }

    async fn delete_webhook_key(
        &self,
        api_id: i64,
        name: &str,
        key: &str,
    ) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .webhook_keys
            .remove(&(api_id, name.to_string(), key.to_string()));
        Ok(())
    }

    async fn find_file(
        &self,
        api_id: i64,
        file_name: &str,
    ) -> Result<Option<StoredFileRecord>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .files
            .get(&(api_id, file_name.to_string()))
            .cloned())
    }

    async fn find_file_by_token(
        &self,
        access_token: &str,
    ) -> Result<Option<StoredFileRecord>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .files
            .values()
            .find(|f| f.access_token == access_token)
            .cloned())
    }

    async fn upsert_file(&self, record: StoredFileRecord) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .files
            .insert((record.api_id, record.file_name.clone()), record);
        Ok(())
    }

    async fn get_certificate(&self, api_id: i64) -> Result<Option<CertificateRecord>, StoreError> {
        Ok(self.inner.read().await.certificates.get(&api_id).cloned())
    }
}
