//! The dispatching entry point.
//!
//! [`BodyParser`] owns the immutable decoder table resolved at build time:
//! one spec per strategy, evaluated in declaration order (json, text,
//! urlencoded, raw, multipart) against the request's declared content type.
//! The first matching decoder consumes the stream under its limits; no
//! match leaves the body undecoded, which is not an error.

use crate::body::ParsedBody;
use crate::charset;
use crate::config::{DecoderOptions, MultipartLimits, MultipartOptions, DEFAULT_RAW_LIMIT, DEFAULT_TEXT_LIMIT};
use crate::decode::{decode_json, decode_raw, decode_text};
use crate::error::DecodeError;
use crate::form::decode_urlencoded;
use crate::limit::{collect_limited, BoxError};
use crate::matcher::MatchRule;
use crate::multipart::{decode_multipart, FileMap};
use bytes::Bytes;
use http::{header, Extensions, HeaderMap};
use http_body::Body;
use mime::Mime;
use tracing::{debug, trace};

/// The five decoding strategies, in evaluation order.
///
/// The order matters: raw's default rule is a catch-all for everything the
/// more specific decoders left unclaimed (except `multipart/*`, which must
/// fall through to the multipart decoder).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderKind {
    Json,
    Text,
    UrlEncoded,
    Raw,
    Multipart,
}

#[derive(Debug)]
struct DecoderSpec {
    kind: DecoderKind,
    rule: MatchRule,
    limit: usize,
    default_charset: Option<String>,
}

/// Content-type driven request body parser.
///
/// Construction resolves all configuration; afterwards the parser is
/// immutable and safe to share across concurrent requests.
#[derive(Debug)]
pub struct BodyParser {
    specs: Vec<DecoderSpec>,
    multipart: MultipartLimits,
}

impl Default for BodyParser {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl BodyParser {
    /// A parser with all decoders on their documented defaults.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> BodyParserBuilder {
        BodyParserBuilder::default()
    }

    /// Decodes one request body.
    ///
    /// `headers` supplies the declared content type and length; `body` is
    /// the inbound stream, consumed at most once and never rewound. The
    /// future suspends at each arriving frame and, for multipart file
    /// parts, at each temporary-storage write.
    pub async fn parse<B>(&self, headers: &HeaderMap, body: B) -> Result<ParsedRequest, DecodeError>
    where
        B: Body<Data = Bytes> + Unpin,
        B::Error: Into<BoxError>,
    {
        let Some(mime) = content_type(headers) else {
            trace!("no usable content type, body left undecoded");
            return Ok(ParsedRequest::empty());
        };

        let Some(spec) = self.specs.iter().find(|spec| spec.rule.matches(&mime)) else {
            trace!(content_type = %mime, "no decoder matched, body left undecoded");
            return Ok(ParsedRequest::empty());
        };

        debug!(decoder = ?spec.kind, content_type = %mime, "decoding request body");

        // A declared length already past the limit is rejected before any
        // body byte is read.
        if let Some(declared) = content_length(headers) {
            let limit = match spec.kind {
                DecoderKind::Multipart => self.multipart.total_limit,
                _ => Some(spec.limit),
            };
            if let Some(limit) = limit {
                if declared > limit as u64 {
                    return Err(DecodeError::entity_too_large(limit, declared as usize));
                }
            }
        }

        let charset = mime
            .get_param(mime::CHARSET)
            .map(|cs| cs.as_str().to_string())
            .or_else(|| spec.default_charset.clone());

        match spec.kind {
            DecoderKind::Json => {
                let bytes = collect_limited(body, spec.limit).await?;
                match decode_json(&bytes, charset.as_deref())? {
                    Some(value) => Ok(ParsedRequest::with_body(ParsedBody::Json(value))),
                    None => Ok(ParsedRequest::empty()),
                }
            }
            DecoderKind::Text => {
                let bytes = collect_limited(body, spec.limit).await?;
                let text = decode_text(&bytes, charset.as_deref())?;
                Ok(ParsedRequest::with_body(ParsedBody::Text(text)))
            }
            DecoderKind::UrlEncoded => {
                let bytes = collect_limited(body, spec.limit).await?;
                let text = charset::decode(&bytes, charset.as_deref())?;
                Ok(ParsedRequest::with_body(ParsedBody::Form(decode_urlencoded(&text))))
            }
            DecoderKind::Raw => {
                let bytes = collect_limited(body, spec.limit).await?;
                Ok(ParsedRequest::with_body(ParsedBody::Binary(decode_raw(bytes))))
            }
            DecoderKind::Multipart => {
                let (fields, files) = decode_multipart(&mime, body, &self.multipart).await?;
                Ok(ParsedRequest { body: Some(ParsedBody::Form(fields)), files })
            }
        }
    }
}

/// Builder merging caller overrides over the documented defaults.
#[derive(Debug, Default)]
pub struct BodyParserBuilder {
    json: DecoderOptions,
    text: DecoderOptions,
    urlencoded: DecoderOptions,
    raw: DecoderOptions,
    multipart: MultipartOptions,
}

impl BodyParserBuilder {
    pub fn json(mut self, options: DecoderOptions) -> Self {
        self.json = options;
        self
    }

    pub fn text(mut self, options: DecoderOptions) -> Self {
        self.text = options;
        self
    }

    pub fn urlencoded(mut self, options: DecoderOptions) -> Self {
        self.urlencoded = options;
        self
    }

    pub fn raw(mut self, options: DecoderOptions) -> Self {
        self.raw = options;
        self
    }

    pub fn multipart(mut self, options: MultipartOptions) -> Self {
        self.multipart = options;
        self
    }

    pub fn build(self) -> BodyParser {
        let spec = |kind, options: DecoderOptions, default_rule: MatchRule, default_limit| DecoderSpec {
            kind,
            rule: options.rule.unwrap_or(default_rule),
            limit: options.limit.unwrap_or(default_limit),
            default_charset: options.default_charset,
        };

        let multipart_rule =
            self.multipart.rule.clone().unwrap_or_else(|| MatchRule::exact("multipart/form-data"));
        let multipart_limits = MultipartLimits::from(self.multipart);

        let specs = vec![
            spec(DecoderKind::Json, self.json, MatchRule::wildcard("*/json"), DEFAULT_TEXT_LIMIT),
            spec(DecoderKind::Text, self.text, MatchRule::wildcard("text/*"), DEFAULT_TEXT_LIMIT),
            spec(
                DecoderKind::UrlEncoded,
                self.urlencoded,
                MatchRule::exact("application/x-www-form-urlencoded"),
                DEFAULT_TEXT_LIMIT,
            ),
            spec(
                DecoderKind::Raw,
                self.raw,
                MatchRule::predicate(|m| m.type_() != mime::MULTIPART),
                DEFAULT_RAW_LIMIT,
            ),
            DecoderSpec {
                kind: DecoderKind::Multipart,
                rule: multipart_rule,
                limit: multipart_limits.file_limit,
                default_charset: None,
            },
        ];

        BodyParser { specs, multipart: multipart_limits }
    }
}

/// The decoded view of one request, ready to attach to a request-scoped
/// context.
#[derive(Debug, Clone, Default)]
pub struct ParsedRequest {
    body: Option<ParsedBody>,
    files: FileMap,
}

/// Uploaded files grouped by field name, as stored in the request context.
#[derive(Debug, Clone, Default)]
pub struct UploadedFiles(pub FileMap);

impl ParsedRequest {
    fn empty() -> Self {
        Self::default()
    }

    fn with_body(body: ParsedBody) -> Self {
        Self { body: Some(body), files: FileMap::new() }
    }

    /// The decoded body, if any decoder matched and produced one.
    pub fn body(&self) -> Option<&ParsedBody> {
        self.body.as_ref()
    }

    /// Files uploaded through a multipart body, grouped by field name.
    pub fn files(&self) -> &FileMap {
        &self.files
    }

    pub fn into_parts(self) -> (Option<ParsedBody>, FileMap) {
        (self.body, self.files)
    }

    /// Writes the decoded result into a request-scoped context.
    ///
    /// The body is stored as [`ParsedBody`] and uploaded files (when any
    /// exist) as [`UploadedFiles`], for downstream handlers to read back.
    pub fn attach(self, extensions: &mut Extensions) {
        if let Some(body) = self.body {
            extensions.insert(body);
        }
        if !self.files.is_empty() {
            extensions.insert(UploadedFiles(self.files));
        }
    }
}

fn content_type(headers: &HeaderMap) -> Option<Mime> {
    headers.get(header::CONTENT_TYPE)?.to_str().ok()?.parse().ok()
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers.get(header::CONTENT_LENGTH)?.to_str().ok()?.parse().ok()
}
