mod memory;

pub use memory::MemoryTagStore;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::types::{StoreError, TagDataType, UdtDefinition, UdtInstance};

/// Quality code returned by write handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteQuality {
    Good,
    Error,
}

/// Receives external writes to a handled tag path.
#[async_trait]
pub trait WriteHandler: Send + Sync {
    async fn write(&self, path: &str, value: JsonValue) -> WriteQuality;
}

/// Stream of value changes for one subscribed path.
pub struct TagSubscription {
    pub path: String,
    pub receiver: mpsc::UnboundedReceiver<JsonValue>,
}

/// The hierarchical live-value store the engine writes into. Paths are
/// slash-delimited (`api/Functions/poll/Status/State`).
#[async_trait]
pub trait TagStore: Send + Sync {
    /// Create the tag if it does not exist; apply the default when the
    /// current value is null.
    async fn configure_tag(
        &self,
        path: &str,
        data_type: TagDataType,
        default: Option<JsonValue>,
    ) -> Result<(), StoreError>;

    async fn tag_update(&self, path: &str, value: JsonValue) -> Result<(), StoreError>;

    async fn read_tag(&self, path: &str) -> Result<JsonValue, StoreError>;

    async fn tag_exists(&self, path: &str) -> bool;

    async fn tag_is_null(&self, path: &str) -> bool;

    /// Remove a tag and everything beneath it.
    async fn remove_tag(&self, path: &str) -> Result<(), StoreError>;

    async fn register_write_handler(
        &self,
        path: &str,
        handler: Arc<dyn WriteHandler>,
    ) -> Result<(), StoreError>;

    /// Registering an existing definition again replaces it; callers treat
    /// this as a no-op for unchanged shapes.
    async fn register_udt_definition(&self, definition: UdtDefinition) -> Result<(), StoreError>;

    /// Materialize a definition's members beneath the instance path.
    async fn register_udt_instance(&self, instance: UdtInstance) -> Result<(), StoreError>;

    /// Route an external write: dispatches to the registered handler, or
    /// performs a plain update when none is installed.
    async fn write_external(&self, path: &str, value: JsonValue) -> WriteQuality;

    async fn subscribe(&self, path: &str) -> Result<TagSubscription, StoreError>;
}
