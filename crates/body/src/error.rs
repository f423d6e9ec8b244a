use http::StatusCode;
use std::io;
use thiserror::Error;

/// Error raised while decoding a request body.
///
/// Every failure a decoder can produce is classified here; the surrounding
/// dispatch chain turns the classification into an HTTP response through
/// [`DecodeError::status`].
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The body was read completely but could not be parsed in the declared
    /// format. `raw` always carries the unparsed body text so the failure can
    /// be reproduced by the caller.
    #[error("malformed {format} body: {reason}")]
    MalformedSyntax { format: &'static str, reason: String, raw: String },

    /// The body exceeded the configured size limit. `size` is the observed
    /// (or declared, when rejected up front) byte count.
    #[error("request entity too large: {size} bytes exceed the limit {limit}")]
    EntityTooLarge { limit: usize, size: usize },

    /// The declared charset is not one this crate can decode.
    #[error("unsupported charset: {charset}")]
    UnsupportedCharset { charset: String },

    /// The inbound stream ended early, errored, or carried malformed framing
    /// (e.g. a truncated multipart body).
    #[error("stream error: {reason}")]
    Stream { reason: String },

    /// Temporary storage failed while spooling a multipart file part.
    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl DecodeError {
    pub fn malformed_syntax<S: ToString>(format: &'static str, reason: S, raw: String) -> Self {
        Self::MalformedSyntax { format, reason: reason.to_string(), raw }
    }

    pub fn entity_too_large(limit: usize, size: usize) -> Self {
        Self::EntityTooLarge { limit, size }
    }

    pub fn unsupported_charset<S: ToString>(charset: S) -> Self {
        Self::UnsupportedCharset { charset: charset.to_string() }
    }

    pub fn stream<S: ToString>(reason: S) -> Self {
        Self::Stream { reason: reason.to_string() }
    }

    /// The HTTP status the dispatch chain should answer with.
    ///
    /// Size violations map to 413; storage faults are the server's fault and
    /// map to 500; everything else is a client error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MalformedSyntax { .. } => StatusCode::BAD_REQUEST,
            Self::EntityTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UnsupportedCharset { .. } => StatusCode::BAD_REQUEST,
            Self::Stream { .. } => StatusCode::BAD_REQUEST,
            Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The raw body captured by a syntax failure, when present.
    pub fn raw_body(&self) -> Option<&str> {
        match self {
            Self::MalformedSyntax { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(DecodeError::entity_too_large(5, 6).status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            DecodeError::malformed_syntax("json", "eof", "{".to_string()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(DecodeError::unsupported_charset("utf-7").status(), StatusCode::BAD_REQUEST);
        assert_eq!(DecodeError::stream("closed").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            DecodeError::from(io::Error::new(io::ErrorKind::Other, "disk full")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_malformed_syntax_keeps_raw_body() {
        let err = DecodeError::malformed_syntax("json", "expected value", "{oops".to_string());
        assert_eq!(err.raw_body(), Some("{oops"));
        assert_eq!(DecodeError::entity_too_large(1, 2).raw_body(), None);
    }
}
