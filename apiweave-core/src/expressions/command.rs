use serde_json::Value as JsonValue;
use serde_json_path::JsonPath;

use super::functions::PostFn;
use super::scope::EvalContext;
use super::ValueStringError;

const TOKEN_API_NAME: &str = "apiName";

/// One `{{ ... }}` segment: a selector plus pipe-chained post functions.
#[derive(Debug, Clone)]
pub struct Command {
    pub selector: Selector,
    pub post: Vec<PostFn>,
}

#[derive(Debug, Clone)]
pub enum Selector {
    /// The whole response text.
    Response,
    /// The current iteration item.
    Item,
    /// A static list, usable as an items source.
    Array(Vec<String>),
    /// Variable lookup; the dotted form carries a section.
    Var {
        section: Option<String>,
        name: String,
    },
    /// JSONPath query against the response, or against the item-relative
    /// sub-document when `item_relative` is set.
    JsonPath {
        raw: String,
        path: JsonPath,
        item_relative: bool,
    },
}

impl Command {
    pub fn parse(segment: &str) -> Result<Self, ValueStringError> {
        let mut pieces = segment.split('|').map(str::trim);
        let head = pieces.next().unwrap_or_default();
        let selector = Selector::parse(head)?;

        let mut post = Vec::new();
        for piece in pieces {
            post.push(PostFn::parse(piece)?);
        }

        Ok(Self { selector, post })
    }

    pub fn value(&self, ctx: &EvalContext<'_>) -> Result<String, ValueStringError> {
        let mut value = self.selector.value(ctx)?;
        for function in &self.post {
            value = function.apply(value)?;
        }
        Ok(value)
    }

    pub fn values(&self, ctx: &EvalContext<'_>) -> Result<Vec<Option<String>>, ValueStringError> {
        self.selector.values(ctx)
    }

    pub fn value_as_json(&self, ctx: &EvalContext<'_>) -> Result<JsonValue, ValueStringError> {
        self.selector.value_as_json(ctx)
    }
}

impl Selector {
    fn parse(head: &str) -> Result<Self, ValueStringError> {
        let mut args = head.split("::").map(str::trim);
        let name = args.next().unwrap_or_default();
        let args: Vec<&str> = args.collect();

        match name.to_ascii_lowercase().as_str() {
            "response" => Ok(Self::Response),
            "item" => Ok(Self::Item),
            "array" => {
                let list = args.first().ok_or(ValueStringError::EmptyCommand("array"))?;
                let list = list.trim_start_matches('[').trim_end_matches(']');
                Ok(Self::Array(
                    list.split(',').map(|v| v.trim().to_string()).collect(),
                ))
            }
            "var" => {
                let arg = args.first().ok_or(ValueStringError::EmptyCommand("var"))?;
                if arg.is_empty() {
                    return Err(ValueStringError::EmptyCommand("var"));
                }
                match arg.split_once('.') {
                    Some((section, name)) => Ok(Self::Var {
                        section: Some(section.to_string()),
                        name: name.to_string(),
                    }),
                    None => Ok(Self::Var {
                        section: None,
                        name: arg.to_string(),
                    }),
                }
            }
            "jsonpath" => {
                let (raw, item_relative) = match args.as_slice() {
                    [path] => (*path, false),
                    [_, path, ..] => (*path, true),
                    [] => return Err(ValueStringError::EmptyCommand("jsonPath")),
                };
                let path =
                    JsonPath::parse(raw).map_err(|e| ValueStringError::InvalidJsonPath {
                        path: raw.to_string(),
                        detail: e.to_string(),
                    })?;
                Ok(Self::JsonPath {
                    raw: raw.to_string(),
                    path,
                    item_relative,
                })
            }
            other => Err(ValueStringError::UnknownCommand(other.to_string())),
        }
    }

    fn value(&self, ctx: &EvalContext<'_>) -> Result<String, ValueStringError> {
        match self {
            Self::Response => Ok(ctx.response.unwrap_or_default().to_string()),
            Self::Item => Ok(ctx.item.unwrap_or_default().to_string()),
            Self::Array(_) => Err(ValueStringError::NotMultiValued {
                source_text: "array".to_string(),
            }),
            Self::Var { section, name } => resolve_var(ctx, section.as_deref(), name),
            Self::JsonPath {
                raw,
                path,
                item_relative,
            } => {
                let doc = response_json(ctx)?;
                let node = if *item_relative {
                    let item = ctx.item.ok_or(ValueStringError::MissingItem)?;
                    // Rebase the query onto the item's normalized path.
                    let rebased = format!("{}{}", item, raw.trim_start_matches('$'));
                    let path = JsonPath::parse(&rebased).map_err(|e| {
                        ValueStringError::InvalidJsonPath {
                            path: rebased.clone(),
                            detail: e.to_string(),
                        }
                    })?;
                    path.query(&doc)
                        .first()
                        .cloned()
                        .ok_or_else(|| ValueStringError::JsonPathNotFound(rebased))?
                } else {
                    path.query(&doc)
                        .first()
                        .cloned()
                        .ok_or_else(|| ValueStringError::JsonPathNotFound(raw.clone()))?
                };
                Ok(json_to_string(&node))
            }
        }
    }

    fn values(&self, ctx: &EvalContext<'_>) -> Result<Vec<Option<String>>, ValueStringError> {
        match self {
            Self::Item => Ok(vec![None]),
            Self::Array(values) => Ok(values.iter().cloned().map(Some).collect()),
            Self::JsonPath { path, .. } => {
                let doc = response_json(ctx)?;
                Ok(path
                    .query_located(&doc)
                    .locations()
                    .map(|loc| Some(loc.to_string()))
                    .collect())
            }
            Self::Response | Self::Var { .. } => Err(ValueStringError::NotMultiValued {
                source_text: "command".to_string(),
            }),
        }
    }

    fn value_as_json(&self, ctx: &EvalContext<'_>) -> Result<JsonValue, ValueStringError> {
        match self {
            Self::JsonPath { raw, path, .. } => {
                let doc = response_json(ctx)?;
                path.query(&doc)
                    .first()
                    .cloned()
                    .ok_or_else(|| ValueStringError::JsonPathNotFound(raw.clone()))
            }
            other => Ok(JsonValue::String(other.value(ctx)?)),
        }
    }
}

fn resolve_var(
    ctx: &EvalContext<'_>,
    section: Option<&str>,
    name: &str,
) -> Result<String, ValueStringError> {
    if section.is_none() && name == TOKEN_API_NAME {
        return Ok(ctx.resolver.api_name().to_string());
    }

    match section {
        None => ctx
            .resolver
            .api_variable(name)
            .ok_or_else(|| ValueStringError::VariableNotFound(name.to_string())),
        Some(section) => {
            if let Some(scope) = ctx.scope {
                if scope.store_name() == section {
                    return scope
                        .get(name)
                        .ok_or_else(|| ValueStringError::VariableNotFound(name.to_string()));
                }
            }
            if ctx.resolver.function_exists(section) {
                return ctx
                    .resolver
                    .function_variable(section, name)
                    .ok_or_else(|| ValueStringError::VariableNotFound(name.to_string()));
            }
            // Neither the active scope nor a function matches the section:
            // the dotted text itself is the value.
            Ok(format!("{section}.{name}"))
        }
    }
}

fn response_json(ctx: &EvalContext<'_>) -> Result<JsonValue, ValueStringError> {
    let response = ctx.response.ok_or(ValueStringError::ResponseNotJson)?;
    serde_json::from_str(response).map_err(|_| ValueStringError::ResponseNotJson)
}

pub(crate) fn json_to_string(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}
