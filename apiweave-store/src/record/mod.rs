mod memory;

pub use memory::MemoryRecordStore;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::types::{
    ApiConfigRecord, CertificateRecord, ConfigEvent, StoreError, StoredFileRecord, VariableRecord,
    WebhookKeyRecord,
};

/// Persistence for the engine's records. Implementations are external
/// collaborators; the engine only relies on this contract.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // API configurations
    async fn list_api_configs(&self) -> Result<Vec<ApiConfigRecord>, StoreError>;

    async fn get_api_config(&self, id: i64) -> Result<Option<ApiConfigRecord>, StoreError>;

    /// Change feed of add/update/delete notifications.
    async fn watch_api_configs(&self) -> mpsc::UnboundedReceiver<ConfigEvent>;

    // Variables
    async fn list_variables(&self, api_id: i64) -> Result<Vec<VariableRecord>, StoreError>;

    async fn upsert_variable(&self, record: VariableRecord) -> Result<(), StoreError>;

    async fn delete_variable(&self, api_id: i64, key: &str) -> Result<(), StoreError>;

    // Webhook keys
    async fn list_webhook_keys(
        &self,
        api_id: i64,
        name: &str,
    ) -> Result<Vec<WebhookKeyRecord>, StoreError>;

    async fn upsert_webhook_key(&self, record: WebhookKeyRecord) -> Result<(), StoreError>;

    async fn delete_webhook_key(
        &self,
        api_id: i64,
        name: &str,
        key: &str,
    ) -> Result<(), StoreError>;

    // Stored files
    async fn find_file(
        &self,
        api_id: i64,
        file_name: &str,
    ) -> Result<Option<StoredFileRecord>, StoreError>;

    async fn find_file_by_token(
        &self,
        access_token: &str,
    ) -> Result<Option<StoredFileRecord>, StoreError>;

    async fn upsert_file(&self, record: StoredFileRecord) -> Result<(), StoreError>;

    // Certificates
    async fn get_certificate(&self, api_id: i64) -> Result<Option<CertificateRecord>, StoreError>;
}
