use crate::form::FieldMap;
use bytes::Bytes;
use serde_json::Value;

/// The in-memory representation of a decoded request body.
///
/// A request yields at most one of these: a structured value (JSON document
/// or reconstructed form fields), the body text unchanged, or the opaque
/// bytes. Which shape is produced is decided purely by the matched decoder.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBody {
    /// A JSON document, from any `*/json` media type.
    Json(Value),
    /// Nested form fields, from URL-encoded or multipart bodies.
    Form(FieldMap),
    /// The charset-decoded body text, from `text/*` media types.
    Text(String),
    /// The unmodified body bytes, from the raw catch-all decoder.
    Binary(Bytes),
}

impl ParsedBody {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_form(&self) -> Option<&FieldMap> {
        match self {
            Self::Form(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }
}
