use crate::error::ParseError;
use crate::types::ApiDocument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
}

#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub document: ApiDocument,
    pub format: DocumentFormat,
}

/// Parse a configuration document, auto-detecting JSON vs YAML.
///
/// JSON is tried first so that JSON documents surface JSON error messages;
/// YAML is a superset and would otherwise accept most of them.
pub fn parse_document_str(input: &str) -> Result<ParsedDocument, ParseError> {
    let trimmed = input.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        let document = serde_json::from_str(input)?;
        return Ok(ParsedDocument {
            document,
            format: DocumentFormat::Json,
        });
    }

    match serde_yaml::from_str(input) {
        Ok(document) => Ok(ParsedDocument {
            document,
            format: DocumentFormat::Yaml,
        }),
        Err(e) => Err(ParseError::Yaml(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_yaml_document() {
        let doc = parse_document_str(
            r#"
authType:
  type: basic
headers:
  - key: Accept
    value: application/json
functions:
  status:
    url: https://example.com/status
    schedule:
      type: timer
      duration: 30
      unit: seconds
"#,
        )
        .unwrap();
        assert_eq!(doc.format, DocumentFormat::Yaml);
        assert_eq!(doc.document.functions.len(), 1);
        assert!(doc.document.functions.contains_key("status"));
    }

    #[test]
    fn parses_json_document() {
        let doc = parse_document_str(r#"{"session": true, "functions": {}}"#).unwrap();
        assert_eq!(doc.format, DocumentFormat::Json);
        assert!(doc.document.session);
    }

    #[test]
    fn empty_document_is_default() {
        let doc = parse_document_str("{}").unwrap();
        assert_eq!(doc.document, ApiDocument::default());
    }
}
