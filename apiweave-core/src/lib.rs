#![forbid(unsafe_code)]

pub mod condition;
pub mod error;
pub mod expressions;
pub mod parser;
pub mod types;
pub mod validate;

pub use crate::error::{ConfigError, ParseError, ValidationError, Violation};
pub use crate::expressions::{
    EvalContext, ValueString, ValueStringError, VariableResolver, VariableScope,
};
pub use crate::parser::{parse_document_str, DocumentFormat, ParsedDocument};
pub use crate::types::ApiDocument;
pub use crate::validate::validate_document;
