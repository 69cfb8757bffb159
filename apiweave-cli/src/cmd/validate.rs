use std::path::Path;

use apiweave_core::{parse_document_str, validate_document, DocumentFormat, ParseError};
use serde::Serialize;

use crate::exit_codes;
use crate::output::{print_error, print_result};
use crate::OutputArgs;

#[derive(Serialize)]
struct ValidateResult {
    valid: bool,
    format: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    violations: Vec<String>,
}

pub async fn validate_cmd(path: &Path, output: OutputArgs) -> i32 {
    let content = match std::fs::read_to_string(path) {
        Ok(v) => v,
        Err(e) => {
            print_error(
                output.format,
                output.quiet,
                &format!("failed to read {}: {e}", path.display()),
            );
            return exit_codes::RUNTIME_ERROR;
        }
    };

    let parsed = match parse_document_str(&content) {
        Ok(p) => p,
        Err(ParseError::Json(e)) => {
            print_error(
                output.format,
                output.quiet,
                &format!("JSON parse failed: {e}"),
            );
            return exit_codes::VALIDATION_FAILED;
        }
        Err(ParseError::Yaml(e)) => {
            print_error(
                output.format,
                output.quiet,
                &format!("YAML parse failed: {e}"),
            );
            return exit_codes::VALIDATION_FAILED;
        }
        Err(ParseError::UnknownFormat) => {
            print_error(
                output.format,
                output.quiet,
                "input is neither valid JSON nor valid YAML",
            );
            return exit_codes::VALIDATION_FAILED;
        }
    };

    let violations = validate_document(&parsed.document);
    let result = ValidateResult {
        valid: violations.is_empty(),
        format: match parsed.format {
            DocumentFormat::Json => "json".to_string(),
            DocumentFormat::Yaml => "yaml".to_string(),
        },
        violations: violations.iter().map(|v| v.to_string()).collect(),
    };
    print_result(output.format, output.quiet, &result);

    if result.valid {
        exit_codes::SUCCESS
    } else {
        exit_codes::VALIDATION_FAILED
    }
}
