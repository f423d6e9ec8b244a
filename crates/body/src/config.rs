//! Per-decoder configuration.
//!
//! Callers override a decoder's match rule and limits here; everything left
//! unset falls back to the documented defaults. The options are merged into
//! the parser's immutable decoder table once, at
//! [`build`](crate::BodyParserBuilder::build) time, never per request.

use crate::matcher::MatchRule;
use std::path::PathBuf;

/// Default size limit for the text-shaped decoders (json, text, urlencoded).
pub const DEFAULT_TEXT_LIMIT: usize = 100 * 1024;

/// Default size limit for the raw catch-all decoder.
pub const DEFAULT_RAW_LIMIT: usize = 5 * 1024 * 1024;

/// Default size limit for one multipart file part.
pub const DEFAULT_FILE_LIMIT: usize = 5 * 1024 * 1024;

/// Default size limit for one multipart field part.
pub const DEFAULT_FIELD_LIMIT: usize = 1024 * 1024;

/// Overrides for one of the json/text/urlencoded/raw decoders.
#[derive(Debug, Clone, Default)]
pub struct DecoderOptions {
    pub(crate) rule: Option<MatchRule>,
    pub(crate) limit: Option<usize>,
    pub(crate) default_charset: Option<String>,
}

impl DecoderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the decoder's default match rule entirely; the original
    /// default type no longer reaches this decoder afterwards.
    pub fn match_type(mut self, rule: impl Into<MatchRule>) -> Self {
        self.rule = Some(rule.into());
        self
    }

    /// Byte ceiling for this decoder's body.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Charset assumed when the request declares none. UTF-8 if unset.
    pub fn default_charset(mut self, charset: impl Into<String>) -> Self {
        self.default_charset = Some(charset.into());
        self
    }
}

/// Overrides for the multipart decoder.
#[derive(Debug, Clone, Default)]
pub struct MultipartOptions {
    pub(crate) rule: Option<MatchRule>,
    pub(crate) file_limit: Option<usize>,
    pub(crate) total_limit: Option<usize>,
    pub(crate) field_limit: Option<usize>,
    pub(crate) temp_dir: Option<PathBuf>,
}

impl MultipartOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn match_type(mut self, rule: impl Into<MatchRule>) -> Self {
        self.rule = Some(rule.into());
        self
    }

    /// Byte ceiling applied to each file part independently.
    pub fn file_limit(mut self, limit: usize) -> Self {
        self.file_limit = Some(limit);
        self
    }

    /// Optional ceiling for the whole multipart request. Off by default.
    pub fn total_limit(mut self, limit: usize) -> Self {
        self.total_limit = Some(limit);
        self
    }

    /// Byte ceiling applied to each field part.
    pub fn field_limit(mut self, limit: usize) -> Self {
        self.field_limit = Some(limit);
        self
    }

    /// Directory receiving the temporary files for uploaded parts.
    /// `std::env::temp_dir()` if unset; the location is opaque to decoding.
    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }
}

/// The multipart options resolved against their defaults.
#[derive(Debug, Clone)]
pub(crate) struct MultipartLimits {
    pub file_limit: usize,
    pub total_limit: Option<usize>,
    pub field_limit: usize,
    pub temp_dir: PathBuf,
}

impl From<MultipartOptions> for MultipartLimits {
    fn from(options: MultipartOptions) -> Self {
        Self {
            file_limit: options.file_limit.unwrap_or(DEFAULT_FILE_LIMIT),
            total_limit: options.total_limit,
            field_limit: options.field_limit.unwrap_or(DEFAULT_FIELD_LIMIT),
            temp_dir: options.temp_dir.unwrap_or_else(std::env::temp_dir),
        }
    }
}
