use serde::{Deserialize, Serialize};

use crate::types::FunctionSpec;

/// An inbound webhook: registration management plus delivery handling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookSpec {
    /// Probe/register the default key at startup.
    #[serde(default)]
    #[serde(rename = "checkOnStart")]
    pub check_on_start: bool,

    /// Default key; required when `checkOnStart` is set. Expression-valued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Re-check interval in days.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,

    /// Existence probe.
    pub check: FunctionSpec,

    /// Registration call; its `id` variable captures the external id.
    pub add: FunctionSpec,

    /// De-registration call.
    pub remove: FunctionSpec,

    /// Delivery processing; parsed with relaxed URL requirements.
    pub handle: FunctionSpec,
}
