//! Comparison primitives shared by run-if gates, branching actions, switch
//! cases and value-triggered schedules.

use serde_json::Value as JsonValue;

use crate::types::OperatorSpec;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConditionError {
    #[error("condition operand '{0}' is not numeric")]
    NotNumeric(String),
    #[error("operator 'in' requires a multi-valued condition")]
    InRequiresList,
}

/// Compare two evaluated strings. Ordering operators parse both sides as
/// f64; `in` is handled by [`matches_in`].
pub fn compare_strings(
    op: OperatorSpec,
    key: &str,
    value: &str,
) -> Result<bool, ConditionError> {
    match op {
        OperatorSpec::Eq => Ok(key == value),
        OperatorSpec::Neq => Ok(key != value),
        OperatorSpec::In => Err(ConditionError::InRequiresList),
        _ => {
            let k = parse_number(key)?;
            let v = parse_number(value)?;
            Ok(match op {
                OperatorSpec::Lt => k < v,
                OperatorSpec::Lte => k <= v,
                OperatorSpec::Gt => k > v,
                OperatorSpec::Gte => k >= v,
                _ => unreachable!(),
            })
        }
    }
}

pub fn matches_in(key: &str, values: &[Option<String>]) -> bool {
    values
        .iter()
        .any(|v| v.as_deref() == Some(key))
}

/// Compare two JSON values, used by value-triggered schedules where the
/// threshold and the notification both carry their native types.
pub fn compare_json(op: OperatorSpec, actual: &JsonValue, expected: &JsonValue) -> bool {
    match op {
        OperatorSpec::Eq => json_eq(actual, expected),
        OperatorSpec::Neq => !json_eq(actual, expected),
        OperatorSpec::In => false,
        _ => match (json_num(actual), json_num(expected)) {
            (Some(a), Some(b)) => match op {
                OperatorSpec::Lt => a < b,
                OperatorSpec::Lte => a <= b,
                OperatorSpec::Gt => a > b,
                OperatorSpec::Gte => a >= b,
                _ => unreachable!(),
            },
            _ => false,
        },
    }
}

fn parse_number(text: &str) -> Result<f64, ConditionError> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| ConditionError::NotNumeric(text.to_string()))
}

fn json_eq(a: &JsonValue, b: &JsonValue) -> bool {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => x.as_f64() == y.as_f64(),
        // A stringly-typed side still matches its rendered counterpart.
        (JsonValue::String(s), other) | (other, JsonValue::String(s))
            if !other.is_string() =>
        {
            s == &render(other)
        }
        _ => a == b,
    }
}

fn json_num(v: &JsonValue) -> Option<f64> {
    match v {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        JsonValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn render(v: &JsonValue) -> String {
    match v {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_comparisons() {
        assert!(compare_strings(OperatorSpec::Eq, "on", "on").unwrap());
        assert!(compare_strings(OperatorSpec::Neq, "on", "off").unwrap());
        assert!(compare_strings(OperatorSpec::Lt, "3", "4.5").unwrap());
        assert!(compare_strings(OperatorSpec::Gte, "10", "10").unwrap());
        assert!(compare_strings(OperatorSpec::Gt, "abc", "1").is_err());
    }

    #[test]
    fn in_matches_any_item() {
        let values = vec![Some("a".to_string()), Some("b".to_string())];
        assert!(matches_in("b", &values));
        assert!(!matches_in("c", &values));
    }

    #[test]
    fn json_comparisons() {
        assert!(compare_json(OperatorSpec::Eq, &json!(true), &json!(true)));
        assert!(compare_json(OperatorSpec::Eq, &json!("5"), &json!(5)));
        assert!(compare_json(OperatorSpec::Gte, &json!(10), &json!(9.5)));
        assert!(!compare_json(OperatorSpec::Lt, &json!(null), &json!(1)));
    }
}
