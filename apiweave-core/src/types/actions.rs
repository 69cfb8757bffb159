use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::types::{RenameSpec, TagSpec, TimeUnitSpec, UdtSpec};

/// A response-triggered side effect, discriminated by the `action` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ActionSpec {
    Variable(VariableActionSpec),
    Tag(TagActionSpec),
    Script(ScriptActionSpec),
    Function(FunctionActionSpec),
    Webhook(WebhookActionSpec),
    #[serde(rename = "storefile")]
    StoreFile(StoreFileActionSpec),
}

impl ActionSpec {
    pub fn run_if(&self) -> Option<&RunIfSpec> {
        match self {
            Self::Variable(a) => a.run_if.as_ref(),
            Self::Tag(a) => a.run_if.as_ref(),
            Self::Script(a) => a.run_if.as_ref(),
            Self::Function(a) => a.run_if.as_ref(),
            Self::Webhook(a) => a.run_if.as_ref(),
            Self::StoreFile(a) => a.run_if.as_ref(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Variable(_) => "variable",
            Self::Tag(_) => "tag",
            Self::Script(_) => "script",
            Self::Function(_) => "function",
            Self::Webhook(_) => "webhook",
            Self::StoreFile(_) => "storefile",
        }
    }
}

/// Pre-condition gate evaluated before an action runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RunIfSpec {
    Condition(CaseSpec),
    StoreFileIdNotExists {
        #[serde(rename = "fileId")]
        file_id: String,
        #[serde(rename = "fileName")]
        file_name: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatorSpec {
    #[default]
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
}

impl OperatorSpec {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Neq => "!=",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::In => "in",
        }
    }
}

/// One comparison case: key/operator/value plus case-local variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseSpec {
    #[serde(rename = "conditionKey")]
    pub condition_key: String,

    #[serde(default)]
    #[serde(rename = "conditionOperator")]
    pub condition_operator: OperatorSpec,

    #[serde(rename = "conditionValue")]
    pub condition_value: JsonValue,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<NamedValueSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedValueSpec {
    pub name: String,
    /// Expression-valued.
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableActionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "runIf")]
    pub run_if: Option<RunIfSpec>,

    pub name: String,

    /// Expression computing the stored value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Alternative: read the value from the live-value store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "tagPath")]
    pub tag_path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagMode {
    #[default]
    Jsonwrite,
    Jsonexpand,
    Text,
    Switch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagActionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "runIf")]
    pub run_if: Option<RunIfSpec>,

    pub r#type: TagMode,

    /// Root path for written values; defaults to the API name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Expression narrowing the response before the walk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub udts: Vec<UdtSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<TagSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rename: Vec<RenameSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cases: Vec<CaseSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptActionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "runIf")]
    pub run_if: Option<RunIfSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    /// Expression naming the hosted routine.
    pub script: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionActionType {
    #[default]
    Direct,
    Condition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionActionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "runIf")]
    pub run_if: Option<RunIfSpec>,

    #[serde(default)]
    pub r#type: FunctionActionType,

    /// Direct mode target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "trueFunction")]
    pub true_function: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "falseFunction")]
    pub false_function: Option<String>,

    /// Iteration source; absent means one iteration with no item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<VariableActionSpec>,

    /// Condition-mode comparison, flattened into the action map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "conditionKey")]
    pub condition_key: Option<String>,

    #[serde(default)]
    #[serde(rename = "conditionOperator")]
    pub condition_operator: OperatorSpec,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "conditionValue")]
    pub condition_value: Option<JsonValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetrySpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySpec {
    #[serde(default = "default_retry_duration")]
    pub duration: u64,

    #[serde(default)]
    pub unit: TimeUnitSpec,

    #[serde(default = "default_retry_max")]
    pub max: u32,
}

fn default_retry_duration() -> u64 {
    5
}

fn default_retry_max() -> u32 {
    5
}

impl std::fmt::Display for RetrySpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.duration, self.unit.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookActionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "runIf")]
    pub run_if: Option<RunIfSpec>,

    /// Webhook name; expression-valued.
    pub name: String,

    /// Registration key; expression-valued.
    pub key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Re-check interval in days.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variables: Vec<VariableActionSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreFileActionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "runIf")]
    pub run_if: Option<RunIfSpec>,

    #[serde(rename = "fileId")]
    pub file_id: String,

    #[serde(rename = "fileName")]
    pub file_name: String,

    #[serde(default = "default_extension")]
    pub extension: String,

    #[serde(default = "default_content_type")]
    #[serde(rename = "contentType")]
    pub content_type: String,

    /// Tag path receiving the file URL; defaults to the function name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

fn default_extension() -> String {
    "jpeg".to_string()
}

fn default_content_type() -> String {
    "image/jpeg".to_string()
}
