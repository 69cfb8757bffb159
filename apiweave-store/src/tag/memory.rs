use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::types::{StoreError, TagDataType, UdtDefinition, UdtInstance, UdtMember};

use super::{TagStore, TagSubscription, WriteHandler, WriteQuality};

#[derive(Debug, Clone)]
struct TagRecord {
    value: JsonValue,
    data_type: TagDataType,
}

#[derive(Default)]
struct Inner {
    tags: HashMap<String, TagRecord>,
    handlers: HashMap<String, Arc<dyn WriteHandler>>,
    definitions: HashMap<String, UdtDefinition>,
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<JsonValue>>>,
}

/// In-memory reference implementation of [`TagStore`], used by tests and the
/// CLI runtime.
#[derive(Default)]
pub struct MemoryTagStore {
    inner: RwLock<Inner>,
}

impl MemoryTagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every tag path and value, for inspection.
    pub async fn snapshot(&self) -> Vec<(String, JsonValue)> {
        let inner = self.inner.read().await;
        let mut entries: Vec<_> = inner
            .tags
            .iter()
            .map(|(k, v)| (k.clone(), v.value.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub async fn definition(&self, path: &str) -> Option<UdtDefinition> {
        self.inner.read().await.definitions.get(path).cloned()
    }

    async fn notify(&self, path: &str, value: &JsonValue) {
        let mut inner = self.inner.write().await;
        if let Some(senders) = inner.subscribers.get_mut(path) {
            senders.retain(|tx| tx.send(value.clone()).is_ok());
        }
    }

    fn materialize(
        inner: &mut Inner,
        def_path: &str,
        instance_path: &str,
    ) -> Result<(), StoreError> {
        let definition = inner
            .definitions
            .get(def_path)
            .cloned()
            .ok_or_else(|| StoreError::UdtNotFound(def_path.to_string()))?;

        for member in &definition.members {
            let path = format!("{}/{}", instance_path, member.path());
            match member {
                UdtMember::Nested { def_path, .. } => {
                    Self::materialize(inner, def_path, &path)?;
                }
                UdtMember::Value {
                    data_type, default, ..
                } => {
                    inner.tags.entry(path).or_insert_with(|| TagRecord {
                        value: default.clone().unwrap_or(JsonValue::Null),
                        data_type: *data_type,
                    });
                }
                UdtMember::Expression { data_type, .. }
                | UdtMember::Derived { data_type, .. } => {
                    inner.tags.entry(path).or_insert_with(|| TagRecord {
                        value: JsonValue::Null,
                        data_type: *data_type,
                    });
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TagStore for MemoryTagStore {
    async fn configure_tag(
        &self,
        path: &str,
        data_type: TagDataType,
        default: Option<JsonValue>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let record = inner.tags.entry(path.to_string()).or_insert_with(|| TagRecord {
            value: JsonValue::Null,
            data_type,
        });
        if record.value.is_null() {
            if let Some(default) = default {
                record.value = default;
            }
        }
        Ok(())
    }

    async fn tag_update(&self, path: &str, value: JsonValue) -> Result<(), StoreError> {
        {
            let mut inner = self.inner.write().await;
            let data_type = TagDataType::of_value(&value);
            inner
                .tags
                .entry(path.to_string())
                .and_modify(|r| r.value = value.clone())
                .or_insert_with(|| TagRecord {
                    value: value.clone(),
                    data_type,
                });
        }
        self.notify(path, &value).await;
        Ok(())
    }

    async fn read_tag(&self, path: &str) -> Result<JsonValue, StoreError> {
        let inner = self.inner.read().await;
        inner
            .tags
            .get(path)
            .map(|r| r.value.clone())
            .ok_or_else(|| StoreError::TagNotFound(path.to_string()))
    }

    async fn tag_exists(&self, path: &str) -> bool {
        self.inner.read().await.tags.contains_key(path)
    }

    async fn tag_is_null(&self, path: &str) -> bool {
        self.inner
            .read()
            .await
            .tags
            .get(path)
            .map(|r| r.value.is_null())
            .unwrap_or(true)
    }

    async fn remove_tag(&self, path: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let prefix = format!("{path}/");
        inner
            .tags
            .retain(|k, _| k != path && !k.starts_with(&prefix));
        inner.handlers.retain(|k, _| k != path && !k.starts_with(&prefix));
        Ok(())
    }

    async fn register_write_handler(
        &self,
        path: &str,
        handler: Arc<dyn WriteHandler>,
    ) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .handlers
            .insert(path.to_string(), handler);
        Ok(())
    }

    async fn register_udt_definition(&self, definition: UdtDefinition) -> Result<(), StoreError> {
        debug!(path = %definition.path, members = definition.members.len(), "registering udt definition");
        self.inner
            .write()
            .await
            .definitions
            .insert(definition.path.clone(), definition);
        Ok(())
    }

    async fn register_udt_instance(&self, instance: UdtInstance) -> Result<(), StoreError> {
        debug!(def = %instance.def_path, path = %instance.path, "registering udt instance");
        let mut inner = self.inner.write().await;
        Self::materialize(&mut inner, &instance.def_path, &instance.path)
    }

    async fn write_external(&self, path: &str, value: JsonValue) -> WriteQuality {
        let handler = self.inner.read().await.handlers.get(path).cloned();
        match handler {
            Some(handler) => handler.write(path, value).await,
            None => match self.tag_update(path, value).await {
                Ok(()) => WriteQuality::Good,
                Err(_) => WriteQuality::Error,
            },
        }
    }

    async fn subscribe(&self, path: &str) -> Result<TagSubscription, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .write()
            .await
            .subscribers
            .entry(path.to_string())
            .or_default()
            .push(tx);
        Ok(TagSubscription {
            path: path.to_string(),
            receiver: rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn configure_preserves_existing_values() {
        let store = MemoryTagStore::new();
        store.tag_update("a/b", json!(42)).await.unwrap();
        store
            .configure_tag("a/b", TagDataType::Int, Some(json!(0)))
            .await
            .unwrap();
        assert_eq!(store.read_tag("a/b").await.unwrap(), json!(42));
    }

    #[tokio::test]
    async fn instance_materializes_members() {
        let store = MemoryTagStore::new();
        let mut def = UdtDefinition::new("acme/Profile");
        def.members.push(UdtMember::Value {
            path: "name".to_string(),
            data_type: TagDataType::String,
            default: None,
        });
        store.register_udt_definition(def).await.unwrap();
        store
            .register_udt_instance(UdtInstance {
                def_path: "acme/Profile".to_string(),
                path: "acme/users/0".to_string(),
            })
            .await
            .unwrap();
        assert!(store.tag_exists("acme/users/0/name").await);
    }

    #[tokio::test]
    async fn subscription_sees_updates() {
        let store = MemoryTagStore::new();
        let mut sub = store.subscribe("plant/run").await.unwrap();
        store.tag_update("plant/run", json!(true)).await.unwrap();
        assert_eq!(sub.receiver.recv().await, Some(json!(true)));
    }

    #[tokio::test]
    async fn remove_tag_drops_children() {
        let store = MemoryTagStore::new();
        store.tag_update("a/b/c", json!(1)).await.unwrap();
        store.tag_update("a/b", json!(2)).await.unwrap();
        store.remove_tag("a/b").await.unwrap();
        assert!(!store.tag_exists("a/b").await);
        assert!(!store.tag_exists("a/b/c").await);
    }
}
