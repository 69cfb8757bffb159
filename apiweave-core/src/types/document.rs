use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::types::{AuthSpec, FunctionSpec, HeaderSpec, WebhookSpec};

/// The declarative configuration document for one API.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ApiDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "authType")]
    pub auth_type: Option<AuthSpec>,

    /// Share one cookie jar across all calls of this API.
    #[serde(default)]
    pub session: bool,

    #[serde(default = "default_true")]
    #[serde(rename = "httpsVerification")]
    pub https_verification: bool,

    /// Present a client certificate from the certificate record.
    #[serde(default)]
    #[serde(rename = "httpsCertificates")]
    pub https_certificates: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<HeaderSpec>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, VariableSpec>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub functions: BTreeMap<String, FunctionSpec>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub webhooks: BTreeMap<String, WebhookSpec>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VariableSpec {
    #[serde(default = "default_true")]
    pub required: bool,

    #[serde(default)]
    pub sensitive: bool,

    #[serde(default)]
    pub hidden: bool,

    /// Generate a UUID v4 default the first time the variable is created.
    #[serde(default)]
    pub uuid: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
}
