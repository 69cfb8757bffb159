use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::types::{OperatorSpec, TimeUnitSpec};

/// When a function fires on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScheduleSpec {
    /// Never auto-fires.
    Manual,
    /// Fixed delay; duration 0 means "run once immediately".
    Timer {
        #[serde(default = "default_duration")]
        duration: u64,
        #[serde(default)]
        unit: TimeUnitSpec,
    },
    /// Standard 5-field cron expression.
    Cron {
        #[serde(default = "default_cron")]
        cron: String,
    },
    /// Fires when a live-value store path satisfies a comparison.
    Tag {
        #[serde(rename = "tagPath")]
        tag_path: String,
        #[serde(default)]
        operator: OperatorSpec,
        #[serde(default = "default_trigger_value")]
        value: JsonValue,
    },
}

fn default_duration() -> u64 {
    5
}

fn default_cron() -> String {
    "0 * * * *".to_string()
}

fn default_trigger_value() -> JsonValue {
    JsonValue::Bool(true)
}

/// Parse a cron expression, accepting the standard 5-field form by
/// prepending a seconds field of `0`.
pub fn parse_cron(expr: &str) -> Result<cron::Schedule, cron::error::Error> {
    use std::str::FromStr;

    let fields = expr.split_whitespace().count();
    if fields == 5 {
        cron::Schedule::from_str(&format!("0 {expr}"))
    } else {
        cron::Schedule::from_str(expr)
    }
}

impl std::fmt::Display for ScheduleSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Timer { duration, unit } => write!(f, "{} {}", duration, unit.as_str()),
            Self::Cron { cron } => write!(f, "cron: {cron}"),
            Self::Tag {
                tag_path,
                operator,
                value,
            } => write!(f, "tag: {} {} {}", tag_path, operator.symbol(), value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_display_round_trips() {
        let spec: ScheduleSpec =
            serde_yaml::from_str("type: timer\nduration: 5\nunit: minutes").unwrap();
        assert_eq!(spec.to_string(), "5 minutes");
    }

    #[test]
    fn timer_defaults() {
        let spec: ScheduleSpec = serde_yaml::from_str("type: timer").unwrap();
        assert_eq!(
            spec,
            ScheduleSpec::Timer {
                duration: 5,
                unit: TimeUnitSpec::Minutes
            }
        );
    }

    #[test]
    fn tag_schedule_parses() {
        let spec: ScheduleSpec =
            serde_yaml::from_str("type: tag\ntagPath: plant/line1/run\noperator: gte\nvalue: 10")
                .unwrap();
        match spec {
            ScheduleSpec::Tag {
                tag_path, operator, ..
            } => {
                assert_eq!(tag_path, "plant/line1/run");
                assert_eq!(operator, OperatorSpec::Gte);
            }
            other => panic!("unexpected schedule: {other:?}"),
        }
    }
}
