use std::collections::BTreeSet;

use crate::error::Violation;
use crate::types::{
    ActionSpec, ApiDocument, CaseSpec, FunctionActionSpec, FunctionActionType, RunIfSpec,
    TagActionSpec, TagMode, TagSpec, VariableActionSpec,
};
use crate::validate::check_expression;

pub fn validate_action(
    violations: &mut Vec<Violation>,
    document: &ApiDocument,
    path: &str,
    action: &ActionSpec,
) {
    if let Some(run_if) = action.run_if() {
        validate_run_if(violations, path, run_if);
    }

    match action {
        ActionSpec::Variable(spec) => validate_variable(violations, path, spec),
        ActionSpec::Tag(spec) => validate_tag(violations, path, spec),
        ActionSpec::Script(spec) => {
            check_expression(violations, &format!("{path}.script"), Some(&spec.script));
            check_expression(violations, &format!("{path}.project"), spec.project.as_deref());
        }
        ActionSpec::Function(spec) => validate_function_action(violations, document, path, spec),
        ActionSpec::Webhook(spec) => {
            check_expression(violations, &format!("{path}.name"), Some(&spec.name));
            check_expression(violations, &format!("{path}.key"), Some(&spec.key));
            check_expression(violations, &format!("{path}.id"), spec.id.as_deref());
            check_expression(violations, &format!("{path}.items"), spec.items.as_deref());
            for (i, v) in spec.variables.iter().enumerate() {
                validate_variable(violations, &format!("{path}.variables[{i}]"), v);
            }
        }
        ActionSpec::StoreFile(spec) => {
            check_expression(violations, &format!("{path}.fileId"), Some(&spec.file_id));
            check_expression(violations, &format!("{path}.fileName"), Some(&spec.file_name));
            check_expression(violations, &format!("{path}.path"), spec.path.as_deref());
        }
    }
}

fn validate_run_if(violations: &mut Vec<Violation>, path: &str, run_if: &RunIfSpec) {
    match run_if {
        RunIfSpec::Condition(case) => validate_case(violations, &format!("{path}.runIf"), case),
        RunIfSpec::StoreFileIdNotExists { file_id, file_name } => {
            check_expression(violations, &format!("{path}.runIf.fileId"), Some(file_id));
            check_expression(violations, &format!("{path}.runIf.fileName"), Some(file_name));
        }
    }
}

fn validate_case(violations: &mut Vec<Violation>, path: &str, case: &CaseSpec) {
    check_expression(
        violations,
        &format!("{path}.conditionKey"),
        Some(&case.condition_key),
    );
    if let Some(text) = case.condition_value.as_str() {
        check_expression(violations, &format!("{path}.conditionValue"), Some(text));
    }
    for (i, v) in case.variables.iter().enumerate() {
        check_expression(
            violations,
            &format!("{path}.variables[{i}].value"),
            Some(&v.value),
        );
    }
}

fn validate_variable(violations: &mut Vec<Violation>, path: &str, spec: &VariableActionSpec) {
    if spec.value.is_none() && spec.tag_path.is_none() {
        violations.push(Violation::new(
            path.to_string(),
            "variable requires value or tagPath",
        ));
    }
    check_expression(violations, &format!("{path}.value"), spec.value.as_deref());
    check_expression(violations, &format!("{path}.tagPath"), spec.tag_path.as_deref());
}

fn validate_function_action(
    violations: &mut Vec<Violation>,
    document: &ApiDocument,
    path: &str,
    spec: &FunctionActionSpec,
) {
    match spec.r#type {
        FunctionActionType::Direct => {
            if spec.function.is_none() {
                violations.push(Violation::new(path.to_string(), "function missing"));
            }
        }
        FunctionActionType::Condition => {
            if spec.true_function.is_none() {
                violations.push(Violation::new(path.to_string(), "trueFunction missing"));
            }
            if spec.condition_key.is_none() || spec.condition_value.is_none() {
                violations.push(Violation::new(
                    path.to_string(),
                    "condition requires conditionKey and conditionValue",
                ));
            }
            check_expression(
                violations,
                &format!("{path}.conditionKey"),
                spec.condition_key.as_deref(),
            );
        }
    }

    for target in [&spec.function, &spec.true_function, &spec.false_function]
        .into_iter()
        .flatten()
    {
        if !document.functions.contains_key(target) {
            violations.push(Violation::new(
                path.to_string(),
                format!("references unknown function '{target}'"),
            ));
        }
    }

    check_expression(violations, &format!("{path}.items"), spec.items.as_deref());
    for (i, v) in spec.variables.iter().enumerate() {
        validate_variable(violations, &format!("{path}.variables[{i}]"), v);
    }
}

fn validate_tag(violations: &mut Vec<Violation>, path: &str, spec: &TagActionSpec) {
    check_expression(violations, &format!("{path}.path"), spec.path.as_deref());
    check_expression(violations, &format!("{path}.filter"), spec.filter.as_deref());

    if spec.r#type == TagMode::Switch && spec.cases.is_empty() {
        violations.push(Violation::new(path.to_string(), "missing switch cases"));
    }
    for (i, case) in spec.cases.iter().enumerate() {
        validate_case(violations, &format!("{path}.cases[{i}]"), case);
    }

    let mut seen = BTreeSet::new();
    for (i, udt) in spec.udts.iter().enumerate() {
        let udt_path = format!("{path}.udts[{i}]");
        if !seen.insert(udt.id.as_str()) {
            violations.push(Violation::new(udt_path.clone(), "duplicate udt id"));
        }
        check_expression(violations, &format!("{udt_path}.defPath"), udt.def_path.as_deref());
        check_expression(violations, &format!("{udt_path}.items"), udt.items.as_deref());
        check_expression(violations, &format!("{udt_path}.name"), udt.name.as_deref());
        for (j, tag) in udt.tags.iter().enumerate() {
            validate_tag_spec(violations, &format!("{udt_path}.tags[{j}]"), tag);
        }
    }

    for (i, tag) in spec.tags.iter().enumerate() {
        validate_tag_spec(violations, &format!("{path}.tags[{i}]"), tag);
    }

    for (i, rename) in spec.rename.iter().enumerate() {
        check_expression(
            violations,
            &format!("{path}.rename[{i}].items"),
            rename.items.as_deref(),
        );
        check_expression(
            violations,
            &format!("{path}.rename[{i}].name"),
            Some(&rename.name),
        );
    }
}

fn validate_tag_spec(violations: &mut Vec<Violation>, path: &str, tag: &TagSpec) {
    check_expression(violations, &format!("{path}.items"), tag.items.as_deref());
    check_expression(violations, &format!("{path}.path"), tag.path.as_deref());
    check_expression(violations, &format!("{path}.name"), Some(&tag.name));
    check_expression(
        violations,
        &format!("{path}.defaultValue"),
        tag.default_value.as_deref(),
    );
    check_expression(violations, &format!("{path}.value"), tag.value.as_deref());
    if let Some(handler) = &tag.handler {
        for (i, v) in handler.variables.iter().enumerate() {
            validate_variable(violations, &format!("{path}.handler.variables[{i}]"), v);
        }
    }
}
