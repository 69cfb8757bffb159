use serde::{Deserialize, Serialize};

use crate::types::{DataTypeSpec, VariableActionSpec};

/// A statically declared field written/registered alongside response values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagSpec {
    /// Iteration source; absent means the field applies once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<String>,

    /// Relative path prefix; expression-valued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Expression-valued leaf name.
    pub name: String,

    #[serde(rename = "dataType")]
    pub data_type: DataTypeSpec,

    /// Written only when the current value is null.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "defaultValue")]
    pub default_value: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Host-evaluated expression field (registered, not written).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived: Option<DerivedSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<HandlerSpec>,

    #[serde(default = "default_true")]
    #[serde(rename = "addIfNotExists")]
    pub add_if_not_exists: bool,
}

fn default_true() -> bool {
    true
}

/// Read/write pair projected from another path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedSpec {
    pub source: String,
    pub read: String,
    pub write: String,
}

/// Installed write handler for a declared field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerSpec {
    /// Function invoked on write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,

    /// Reset the written value to false after handling.
    #[serde(default)]
    pub reset: bool,

    /// Variables captured into the handler-local scope.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<VariableActionSpec>,
}

/// A composite-group declaration: which response locations form a reusable
/// structural grouping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UdtSpec {
    pub id: String,

    /// Definition path; defaults to `<api>/<id>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "defPath")]
    pub def_path: Option<String>,

    /// Locations (normalized JSON paths) forming instances of this group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Instance node name; defaults to the id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Group-local declared fields applied per instance.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<TagSpec>,
}

/// Renames a response location before paths are computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameSpec {
    /// Locations (normalized JSON paths) to rename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<String>,

    /// Expression-valued replacement name.
    pub name: String,
}
