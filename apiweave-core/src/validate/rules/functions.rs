use crate::error::Violation;
use crate::types::{parse_cron, ApiDocument, FunctionSpec, OperatorSpec, ScheduleSpec};
use crate::validate::check_expression;

use super::actions;

pub fn validate(violations: &mut Vec<Violation>, document: &ApiDocument) {
    for (name, function) in &document.functions {
        let path = format!("functions.{name}");
        validate_function(violations, document, &path, function, false);

        if let Some((target, _)) = function.dependency() {
            if !document.functions.contains_key(target) {
                violations.push(Violation::new(
                    format!("{path}.depends"),
                    format!("depends on unknown function '{target}'"),
                ));
            }
        }
    }
}

/// Shared with webhook sub-functions; `relaxed_url` applies to the `handle`
/// role, which never issues its own request.
pub fn validate_function(
    violations: &mut Vec<Violation>,
    document: &ApiDocument,
    path: &str,
    function: &FunctionSpec,
    relaxed_url: bool,
) {
    match &function.url {
        Some(url) => check_expression(violations, &format!("{path}.url"), Some(url)),
        None if !relaxed_url => {
            violations.push(Violation::new(format!("{path}.url"), "missing url"));
        }
        None => {}
    }

    for (i, h) in function.headers.iter().enumerate() {
        check_expression(violations, &format!("{path}.headers[{i}].value"), Some(&h.value));
    }

    for (i, p) in function.params.iter().enumerate() {
        if let Some(text) = p.value.as_str() {
            check_expression(violations, &format!("{path}.params[{i}].value"), Some(text));
        }
    }

    if let Some(body) = &function.body {
        check_expression(violations, &format!("{path}.body.value"), body.value.as_deref());
        for (i, p) in body.params.iter().enumerate() {
            if let Some(text) = p.value.as_str() {
                check_expression(
                    violations,
                    &format!("{path}.body.params[{i}].value"),
                    Some(text),
                );
            }
        }
    }

    if let Some(format) = &function.response_format {
        check_expression(
            violations,
            &format!("{path}.responseFormat.value"),
            Some(&format.value),
        );
    }

    if let Some(schedule) = &function.schedule {
        validate_schedule(violations, path, schedule);
    }

    for (i, action) in function.actions.iter().enumerate() {
        actions::validate_action(
            violations,
            document,
            &format!("{path}.actions[{i}]"),
            action,
        );
    }
}

fn validate_schedule(violations: &mut Vec<Violation>, path: &str, schedule: &ScheduleSpec) {
    match schedule {
        ScheduleSpec::Cron { cron } => {
            if let Err(e) = parse_cron(cron) {
                violations.push(Violation::new(
                    format!("{path}.schedule.cron"),
                    format!("invalid cron expression: {e}"),
                ));
            }
        }
        ScheduleSpec::Tag { operator, .. } => {
            if *operator == OperatorSpec::In {
                violations.push(Violation::new(
                    format!("{path}.schedule.operator"),
                    "value-triggered schedules do not support 'in'",
                ));
            }
        }
        _ => {}
    }
}
