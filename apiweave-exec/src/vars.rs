use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use apiweave_core::VariableScope;
use apiweave_store::{RecordStore, VariableRecord};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::ExecError;

/// Variables persisted on one API: an in-memory cache over the record store.
/// Reads are synchronous (the expression engine is pure); writes persist
/// through the record store.
pub struct ApiVariables {
    api_id: i64,
    records: Arc<dyn RecordStore>,
    cache: RwLock<HashMap<String, VariableRecord>>,
    /// Keys declared by the current configuration pass.
    declared: RwLock<Vec<String>>,
}

/// Keys with this prefix hold auth-strategy state created at runtime and
/// survive configuration reloads.
const INTERNAL_PREFIX: &str = "auth-";

impl ApiVariables {
    pub async fn load(api_id: i64, records: Arc<dyn RecordStore>) -> Result<Self, ExecError> {
        let existing = records.list_variables(api_id).await?;
        let mut cache = HashMap::new();
        for record in existing {
            debug!(api_id, key = %record.key, "loading variable from the record store");
            cache.insert(record.key.clone(), record);
        }
        Ok(Self {
            api_id,
            records,
            cache: RwLock::new(cache),
            declared: RwLock::new(Vec::new()),
        })
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.cache
            .read()
            .expect("variables lock")
            .get(name)
            .and_then(|r| r.value.clone())
    }

    /// Declare a configuration-owned variable, creating or updating flags.
    /// An existing value is kept unless a new one is supplied.
    pub async fn declare(
        &self,
        name: &str,
        required: bool,
        hidden: bool,
        sensitive: bool,
        value: Option<String>,
    ) -> Result<(), ExecError> {
        let record = {
            let mut cache = self.cache.write().expect("variables lock");
            let record = cache
                .entry(name.to_string())
                .and_modify(|r| {
                    if value.is_some() {
                        r.value = value.clone();
                    }
                    r.required = required;
                    r.hidden = hidden;
                    r.sensitive = sensitive;
                })
                .or_insert_with(|| VariableRecord {
                    api_id: self.api_id,
                    key: name.to_string(),
                    value: value.clone(),
                    required,
                    hidden,
                    sensitive,
                });
            record.clone()
        };
        self.declared.write().expect("declared lock").push(name.to_string());
        self.records.upsert_variable(record).await?;
        Ok(())
    }

    /// Store a runtime value.
    pub async fn set(&self, name: &str, value: impl Into<String>) -> Result<(), ExecError> {
        self.set_internal(name, Some(value.into()), false, false).await
    }

    /// Store a runtime value with hidden/sensitive flags (derived tokens).
    pub async fn set_hidden(
        &self,
        name: &str,
        value: impl Into<String>,
        sensitive: bool,
    ) -> Result<(), ExecError> {
        self.set_internal(name, Some(value.into()), true, sensitive).await
    }

    pub async fn clear(&self, name: &str) -> Result<(), ExecError> {
        let record = {
            let mut cache = self.cache.write().expect("variables lock");
            match cache.get_mut(name) {
                Some(record) => {
                    debug!(key = name, "clearing variable");
                    record.value = None;
                    Some(record.clone())
                }
                None => None,
            }
        };
        if let Some(record) = record {
            self.records.upsert_variable(record).await?;
        }
        Ok(())
    }

    async fn set_internal(
        &self,
        name: &str,
        value: Option<String>,
        hidden: bool,
        sensitive: bool,
    ) -> Result<(), ExecError> {
        let record = {
            let mut cache = self.cache.write().expect("variables lock");
            let record = cache
                .entry(name.to_string())
                .and_modify(|r| {
                    if value.is_some() {
                        r.value = value.clone();
                    }
                })
                .or_insert_with(|| VariableRecord {
                    api_id: self.api_id,
                    key: name.to_string(),
                    value: value.clone(),
                    required: false,
                    hidden,
                    sensitive,
                });
            record.clone()
        };
        self.records.upsert_variable(record).await?;
        Ok(())
    }

    /// Reload epilogue: required declared variables must have values before
    /// the API can start; records no longer declared (and not runtime auth
    /// state) are deleted.
    pub async fn init_complete(&self) -> Result<bool, ExecError> {
        let declared = self.declared.read().expect("declared lock").clone();
        let (valid, stale) = {
            let cache = self.cache.read().expect("variables lock");
            let mut valid = true;
            let mut stale = Vec::new();
            for record in cache.values() {
                if declared.contains(&record.key) {
                    if record.required && record.value.is_none() {
                        valid = false;
                    }
                } else if !record.key.starts_with(INTERNAL_PREFIX) {
                    stale.push(record.key.clone());
                }
            }
            (valid, stale)
        };

        for key in stale {
            debug!(key = %key, "deleting undeclared variable");
            self.cache.write().expect("variables lock").remove(&key);
            self.records.delete_variable(self.api_id, &key).await?;
        }
        Ok(valid)
    }

    /// Non-hidden variables for inspection (values of sensitive ones elided).
    pub fn visible(&self) -> Vec<(String, Option<String>, bool)> {
        let cache = self.cache.read().expect("variables lock");
        let mut out: Vec<_> = cache
            .values()
            .filter(|r| !r.hidden)
            .map(|r| {
                let value = if r.sensitive {
                    r.value.as_ref().map(|_| "********".to_string())
                } else {
                    r.value.clone()
                };
                (r.key.clone(), value, r.required)
            })
            .collect();
        out.sort();
        out
    }
}

pub(crate) fn value_to_string(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

/// Per-invocation local variables of one function call. Writes go through to
/// the function's published map so later calls and cross-function lookups
/// (`{{var::<function>.<name>}}`) observe the latest values, while reads
/// prefer this invocation's own writes.
pub struct InvocationVars {
    name: String,
    local: RwLock<HashMap<String, JsonValue>>,
    published: Arc<RwLock<HashMap<String, JsonValue>>>,
}

impl InvocationVars {
    pub fn new(name: impl Into<String>, published: Arc<RwLock<HashMap<String, JsonValue>>>) -> Self {
        Self {
            name: name.into(),
            local: RwLock::new(HashMap::new()),
            published,
        }
    }

    pub fn set(&self, name: &str, value: JsonValue) {
        self.local
            .write()
            .expect("invocation lock")
            .insert(name.to_string(), value.clone());
        self.published
            .write()
            .expect("published lock")
            .insert(name.to_string(), value);
    }
}

impl VariableScope for InvocationVars {
    fn store_name(&self) -> &str {
        &self.name
    }

    fn get(&self, name: &str) -> Option<String> {
        if let Some(value) = self.local.read().expect("invocation lock").get(name) {
            return Some(value_to_string(value));
        }
        self.published
            .read()
            .expect("published lock")
            .get(name)
            .map(value_to_string)
    }
}

/// Variables captured for a handler-scoped invocation (function actions,
/// write handlers). The scope name is always `handler`.
pub struct HandlerVars {
    local: RwLock<HashMap<String, JsonValue>>,
}

impl HandlerVars {
    pub fn new() -> Self {
        Self {
            local: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_map(map: HashMap<String, JsonValue>) -> Self {
        Self {
            local: RwLock::new(map),
        }
    }

    pub fn put(&self, name: &str, value: JsonValue) {
        self.local
            .write()
            .expect("handler lock")
            .insert(name.to_string(), value);
    }

    pub fn snapshot(&self) -> HashMap<String, JsonValue> {
        self.local.read().expect("handler lock").clone()
    }
}

impl Default for HandlerVars {
    fn default() -> Self {
        Self::new()
    }
}

impl VariableScope for HandlerVars {
    fn store_name(&self) -> &str {
        "handler"
    }

    fn get(&self, name: &str) -> Option<String> {
        self.local
            .read()
            .expect("handler lock")
            .get(name)
            .map(value_to_string)
    }
}
