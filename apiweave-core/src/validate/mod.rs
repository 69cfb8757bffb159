mod rules;
mod validator;

pub use validator::validate_document;

use crate::error::{ValidationError, Violation};
use crate::types::ApiDocument;

/// Validate a parsed document, returning every violation at once.
pub fn check(document: &ApiDocument) -> Result<(), ValidationError> {
    let violations = validate_document(document);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::new(violations))
    }
}

pub(crate) fn check_expression(
    violations: &mut Vec<Violation>,
    path: &str,
    expression: Option<&str>,
) {
    if let Some(text) = expression {
        if let Err(e) = crate::expressions::ValueString::parse(text) {
            violations.push(Violation::expression(path, &e));
        }
    }
}
