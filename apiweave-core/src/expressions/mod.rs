//! The value-string template language.
//!
//! A value string is literal text interleaved with `{{ command }}` segments.
//! Each command is a selector (`response`, `item`, `array::a,b`, `var::name`,
//! `jsonPath::$.x`) optionally followed by pipe-chained post-processing
//! functions (`split`, `sub`, `replace`, `upper`, `lower`, `trim`,
//! `tagPath`). Parsing happens once at configuration-load time; evaluation is
//! pure given a variable scope, a response body and the current item.

mod command;
mod functions;
mod scope;

pub use command::{Command, Selector};
pub use functions::{PostFn, SliceBounds};
pub use scope::{EvalContext, VariableResolver, VariableScope};

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value as JsonValue;

static SEGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(.*?)\}\}").expect("valid regex"));

#[derive(Debug, Clone)]
pub enum Part {
    Literal(String),
    Command(Command),
    /// The implicit single-item source used when an action declares no
    /// `items` expression: one iteration with no item bound.
    NullItem,
}

/// A parsed template. Evaluated repeatedly at call time against
/// (scope, response, item).
#[derive(Debug, Clone)]
pub struct ValueString {
    source: String,
    parts: Vec<Part>,
}

impl ValueString {
    pub fn parse(source: &str) -> Result<Self, ValueStringError> {
        let mut parts = Vec::new();
        let mut last = 0;
        for caps in SEGMENT_RE.captures_iter(source) {
            let whole = caps.get(0).expect("match");
            if whole.start() > last {
                parts.push(Part::Literal(source[last..whole.start()].to_string()));
            }
            let inner = caps.get(1).expect("group").as_str();
            parts.push(Part::Command(Command::parse(inner).map_err(|e| {
                ValueStringError::Parse {
                    source_text: source.to_string(),
                    detail: e.to_string(),
                }
            })?));
            last = whole.end();
        }
        if last < source.len() {
            parts.push(Part::Literal(source[last..].to_string()));
        }
        Ok(Self {
            source: source.to_string(),
            parts,
        })
    }

    /// The items source used by iterating actions: an absent `items` key
    /// means "iterate once with no item".
    pub fn null_item() -> Self {
        Self {
            source: String::new(),
            parts: vec![Part::NullItem],
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// True when the template holds no command segment and degenerates to a
    /// static string.
    pub fn is_static(&self) -> bool {
        !self
            .parts
            .iter()
            .any(|p| matches!(p, Part::Command(_) | Part::NullItem))
    }

    /// Evaluate to a single string, concatenating literal and command parts.
    pub fn value(&self, ctx: &EvalContext<'_>) -> Result<String, ValueStringError> {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Command(cmd) => out.push_str(&cmd.value(ctx)?),
                Part::NullItem => {}
            }
        }
        Ok(out)
    }

    /// Evaluate as an iteration source. Only the first part participates;
    /// post-processing functions do not apply to multi-valued evaluation.
    /// `None` entries mean "no item bound" for that iteration.
    pub fn values(&self, ctx: &EvalContext<'_>) -> Result<Vec<Option<String>>, ValueStringError> {
        match self.parts.first() {
            Some(Part::NullItem) => Ok(vec![None]),
            Some(Part::Command(cmd)) => cmd.values(ctx),
            Some(Part::Literal(_)) | None => Err(ValueStringError::NotMultiValued {
                source_text: self.source.clone(),
            }),
        }
    }

    /// Evaluate the first part to a JSON value, used where a raw document is
    /// needed (e.g. response filters). Non-jsonPath selectors degrade to the
    /// evaluated string.
    pub fn value_as_json(&self, ctx: &EvalContext<'_>) -> Result<JsonValue, ValueStringError> {
        match self.parts.first() {
            Some(Part::Command(cmd)) => cmd.value_as_json(ctx),
            _ => Ok(JsonValue::String(self.value(ctx)?)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueStringError {
    #[error("error parsing value string '{source_text}': {detail}")]
    Parse { source_text: String, detail: String },
    #[error("value string command '{0}' doesn't exist")]
    UnknownCommand(String),
    #[error("value string function '{0}' doesn't exist")]
    UnknownFunction(String),
    #[error("{0} command cannot be empty")]
    EmptyCommand(&'static str),
    #[error("{0} function missing parameters")]
    MissingArgument(&'static str),
    #[error("invalid slice bounds '{0}'")]
    InvalidBounds(String),
    #[error("variable '{0}' doesn't exist")]
    VariableNotFound(String),
    #[error("json path command missing item")]
    MissingItem,
    #[error("response is not valid JSON")]
    ResponseNotJson,
    #[error("invalid json path '{path}': {detail}")]
    InvalidJsonPath { path: String, detail: String },
    #[error("json path '{0}' not found in response")]
    JsonPathNotFound(String),
    #[error("value string '{source_text}' cannot produce multiple values")]
    NotMultiValued { source_text: String },
    #[error("index {index} out of range for {len} parts")]
    IndexOutOfRange { index: i64, len: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapResolver {
        vars: HashMap<String, String>,
    }

    impl VariableResolver for MapResolver {
        fn api_name(&self) -> &str {
            "weather"
        }

        fn api_variable(&self, name: &str) -> Option<String> {
            self.vars.get(name).cloned()
        }

        fn function_exists(&self, _name: &str) -> bool {
            false
        }

        fn function_variable(&self, _function: &str, _name: &str) -> Option<String> {
            None
        }
    }

    fn resolver() -> MapResolver {
        let mut vars = HashMap::new();
        vars.insert("city".to_string(), "Boise".to_string());
        MapResolver { vars }
    }

    fn ctx<'a>(resolver: &'a MapResolver, response: Option<&'a str>) -> EvalContext<'a> {
        EvalContext {
            scope: None,
            resolver,
            response,
            item: None,
        }
    }

    #[test]
    fn static_string_round_trips() {
        let r = resolver();
        let vs = ValueString::parse("https://example.com/v1/status").unwrap();
        assert!(vs.is_static());
        assert_eq!(
            vs.value(&ctx(&r, None)).unwrap(),
            "https://example.com/v1/status"
        );
    }

    #[test]
    fn literal_and_command_interleave() {
        let r = resolver();
        let vs = ValueString::parse("q={{var::city}}&units=metric").unwrap();
        assert_eq!(vs.value(&ctx(&r, None)).unwrap(), "q=Boise&units=metric");
    }

    #[test]
    fn api_name_token() {
        let r = resolver();
        let vs = ValueString::parse("{{var::apiName}}").unwrap();
        assert_eq!(vs.value(&ctx(&r, None)).unwrap(), "weather");
    }

    #[test]
    fn missing_variable_is_an_error() {
        let r = resolver();
        let vs = ValueString::parse("{{var::nope}}").unwrap();
        assert!(matches!(
            vs.value(&ctx(&r, None)),
            Err(ValueStringError::VariableNotFound(_))
        ));
    }

    #[test]
    fn response_selector_returns_whole_response() {
        let r = resolver();
        let vs = ValueString::parse("{{response}}").unwrap();
        assert_eq!(vs.value(&ctx(&r, Some("hello"))).unwrap(), "hello");
    }

    #[test]
    fn json_path_selector() {
        let r = resolver();
        let vs = ValueString::parse("{{jsonPath::$.name}}").unwrap();
        assert_eq!(
            vs.value(&ctx(&r, Some(r#"{"name":"Bob"}"#))).unwrap(),
            "Bob"
        );
    }

    #[test]
    fn item_relative_json_path() {
        let r = resolver();
        let vs = ValueString::parse("{{jsonPath::item::$.name}}").unwrap();
        let mut c = ctx(&r, Some(r#"{"users":[{"name":"Ada"},{"name":"Bob"}]}"#));
        c.item = Some("$['users'][1]");
        assert_eq!(vs.value(&c).unwrap(), "Bob");
    }

    #[test]
    fn array_items() {
        let r = resolver();
        let vs = ValueString::parse("{{array::a, b ,c}}").unwrap();
        let values = vs.values(&ctx(&r, None)).unwrap();
        assert_eq!(
            values,
            vec![
                Some("a".to_string()),
                Some("b".to_string()),
                Some("c".to_string())
            ]
        );
    }

    #[test]
    fn json_path_items_are_normalized_paths() {
        let r = resolver();
        let vs = ValueString::parse("{{jsonPath::$.devices[*]}}").unwrap();
        let values = vs
            .values(&ctx(&r, Some(r#"{"devices":[{"id":1},{"id":2}]}"#)))
            .unwrap();
        assert_eq!(
            values,
            vec![
                Some("$['devices'][0]".to_string()),
                Some("$['devices'][1]".to_string())
            ]
        );
    }

    #[test]
    fn null_item_source_iterates_once() {
        let r = resolver();
        let vs = ValueString::null_item();
        assert_eq!(vs.values(&ctx(&r, None)).unwrap(), vec![None]);
    }

    #[test]
    fn split_slice() {
        let r = resolver();
        let vs = ValueString::parse("{{response | split::[1:]::/}}").unwrap();
        assert_eq!(vs.value(&ctx(&r, Some("a/b/c"))).unwrap(), "b/c");

        let vs = ValueString::parse("{{response | split::[0]::/}}").unwrap();
        assert_eq!(vs.value(&ctx(&r, Some("a/b/c"))).unwrap(), "a");

        let vs = ValueString::parse("{{response | split::[-1]::/}}").unwrap();
        assert_eq!(vs.value(&ctx(&r, Some("a/b/c"))).unwrap(), "c");
    }

    #[test]
    fn tag_path_function() {
        let r = resolver();
        let vs = ValueString::parse("{{response | tagPath}}").unwrap();
        assert_eq!(
            vs.value(&ctx(&r, Some("$['a']['b'][0]"))).unwrap(),
            "a/b/0"
        );
    }

    #[test]
    fn chained_functions() {
        let r = resolver();
        let vs = ValueString::parse("{{response | trim | upper | replace::B::X}}").unwrap();
        assert_eq!(vs.value(&ctx(&r, Some("  abc  "))).unwrap(), "AXC");
    }

    #[test]
    fn unknown_command_fails_at_parse() {
        assert!(matches!(
            ValueString::parse("{{bogus::x}}"),
            Err(ValueStringError::Parse { .. })
        ));
    }
}
