use serde::{Deserialize, Serialize};

use crate::types::{
    ActionSpec, AllowedCode, BodySpec, HeaderSpec, Method, ParamSpec, ResponseFormatSpec,
    ResponseType, ScheduleSpec,
};

/// A named, schedulable HTTP call plus its response handling.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FunctionSpec {
    /// Expression-valued. Optional only for webhook `handle` functions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default)]
    pub method: Method,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<HeaderSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<ParamSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<BodySpec>,

    #[serde(default)]
    #[serde(rename = "responseType")]
    pub response_type: ResponseType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "responseFormat")]
    pub response_format: Option<ResponseFormatSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<ScheduleSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionSpec>,

    /// Run the named function first if it has never executed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends: Option<String>,

    /// Run the named function first on every invocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "dependsAlways")]
    pub depends_always: Option<String>,

    /// Follow redirects manually, without re-sending default headers.
    #[serde(default)]
    #[serde(rename = "redirectNoHeaders")]
    pub redirect_no_headers: bool,

    /// Error statuses treated as success.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[serde(rename = "allowedErrorCodes")]
    pub allowed_error_codes: Vec<AllowedCode>,
}

impl FunctionSpec {
    pub fn dependency(&self) -> Option<(&str, bool)> {
        if let Some(name) = &self.depends {
            return Some((name.as_str(), false));
        }
        self.depends_always
            .as_deref()
            .map(|name| (name, true))
    }
}
