use crate::error::Violation;
use crate::types::ApiDocument;
use crate::validate::check_expression;

pub fn validate(violations: &mut Vec<Violation>, document: &ApiDocument) {
    for (i, header) in document.headers.iter().enumerate() {
        if header.key.trim().is_empty() {
            violations.push(Violation::new(
                format!("headers[{i}]"),
                "header key must not be empty",
            ));
        }
        check_expression(violations, &format!("headers[{i}].value"), Some(&header.value));
    }
}
