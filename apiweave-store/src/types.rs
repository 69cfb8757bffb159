use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("tag '{0}' doesn't exist")]
    TagNotFound(String),
    #[error("udt definition '{0}' doesn't exist")]
    UdtNotFound(String),
    #[error("record not found: {0}")]
    RecordNotFound(String),
    #[error("store error: {0}")]
    Other(String),
}

/// Data type of one tag in the live-value store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagDataType {
    #[default]
    String,
    Int,
    Float,
    Boolean,
    DateTime,
    Json,
}

impl TagDataType {
    /// Infer the tag type of a JSON leaf.
    pub fn of_value(value: &JsonValue) -> Self {
        match value {
            JsonValue::Bool(_) => Self::Boolean,
            JsonValue::Number(n) if n.is_i64() || n.is_u64() => Self::Int,
            JsonValue::Number(_) => Self::Float,
            JsonValue::String(_) | JsonValue::Null => Self::String,
            JsonValue::Array(_) | JsonValue::Object(_) => Self::Json,
        }
    }
}

/// One member of a composite-group definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UdtMember {
    Value {
        path: String,
        data_type: TagDataType,
        default: Option<JsonValue>,
    },
    Expression {
        path: String,
        data_type: TagDataType,
        expression: String,
    },
    Derived {
        path: String,
        data_type: TagDataType,
        source: String,
        read: String,
        write: String,
    },
    /// Composition: a nested group definition mounted at a relative path.
    Nested { def_path: String, path: String },
}

impl UdtMember {
    pub fn path(&self) -> &str {
        match self {
            Self::Value { path, .. }
            | Self::Expression { path, .. }
            | Self::Derived { path, .. }
            | Self::Nested { path, .. } => path,
        }
    }
}

/// The shape of a composite group.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UdtDefinition {
    pub path: String,
    pub members: Vec<UdtMember>,
}

impl UdtDefinition {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            members: Vec::new(),
        }
    }
}

/// A bound occurrence of a definition at a concrete path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UdtInstance {
    pub def_path: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableRecord {
    pub api_id: i64,
    pub key: String,
    pub value: Option<String>,
    pub required: bool,
    pub hidden: bool,
    pub sensitive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookKeyRecord {
    pub api_id: i64,
    /// Owning webhook name.
    pub name: String,
    pub key: String,
    /// External id returned by the remote registration call.
    pub uid: Option<String>,
    /// Callback URL delivered to the remote side.
    pub url: String,
    pub ttl: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFileRecord {
    pub api_id: i64,
    pub file_id: String,
    pub file_name: String,
    pub extension: String,
    pub content_type: String,
    pub access_token: String,
    pub last_update: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRecord {
    pub api_id: i64,
    pub certificate: Option<String>,
    pub private_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfigRecord {
    pub id: i64,
    pub name: String,
    pub enabled: bool,
    pub configuration: String,
}

/// Change notification emitted by the record store for API configurations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigEvent {
    Added(ApiConfigRecord),
    Updated(ApiConfigRecord),
    Deleted { id: i64 },
}
