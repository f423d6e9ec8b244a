use crate::charset;
use crate::error::DecodeError;
use serde_json::Value;

/// Parses the collected bytes as a JSON document.
///
/// An empty body is not a syntax error: it decodes to `None` and the request
/// proceeds with no parsed body. A syntax failure captures the complete raw
/// text alongside the parser's reason.
pub(crate) fn decode_json(bytes: &[u8], charset: Option<&str>) -> Result<Option<Value>, DecodeError> {
    let text = charset::decode(bytes, charset)?;
    if text.is_empty() {
        return Ok(None);
    }

    match serde_json::from_str(&text) {
        Ok(value) => Ok(Some(value)),
        Err(e) => Err(DecodeError::malformed_syntax("json", e, text)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_valid_document() {
        let value = decode_json(br#"{"foo":"bar","biz":42,"baz":["A","b",3]}"#, None).unwrap().unwrap();
        assert_eq!(value, json!({"foo": "bar", "biz": 42, "baz": ["A", "b", 3]}));
    }

    #[test]
    fn test_scalar_documents_are_fine() {
        assert_eq!(decode_json(b"42", None).unwrap().unwrap(), json!(42));
    }

    #[test]
    fn test_empty_body_decodes_to_nothing() {
        assert!(decode_json(b"", None).unwrap().is_none());
    }

    #[test]
    fn test_malformed_body_error_carries_the_raw_text() {
        let body = r#"{"foo":"bar",not valid JSON"#;
        let err = decode_json(body.as_bytes(), Some("utf-8")).unwrap_err();
        assert_eq!(err.raw_body(), Some(body));
        assert_eq!(err.status(), http::StatusCode::BAD_REQUEST);
    }
}
