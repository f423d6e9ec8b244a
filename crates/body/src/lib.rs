//! Content-type driven request body decoding
//!
//! This crate is the body-interpretation layer that sits between an HTTP
//! server and a route handler. It inspects the declared content type of an
//! inbound request, selects one decoding strategy, consumes the body stream
//! under configurable size limits, and produces one structured in-memory
//! result (plus, for multipart submissions, descriptors of the uploaded
//! files) for downstream application logic.
//!
//! # Features
//!
//! - JSON, plain text, URL-encoded form, raw binary and
//!   `multipart/form-data` decoding
//! - First-match content-type dispatch with exact, wildcard (`*/json`,
//!   `text/*`) and predicate rules
//! - Incremental size limiting while streaming, with up-front rejection of
//!   oversized declared lengths
//! - Nested form reconstruction (`a[0]`, `a[key]`, repeated names) with
//!   observable holes in sparse sequences
//! - Multipart file parts spooled to temporary storage, never buffered whole
//! - Typed errors carrying the HTTP status a dispatch chain should answer
//!   with
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use http::{header, HeaderMap, HeaderValue};
//! use http_body_util::Full;
//! use micro_body::{BodyParser, DecoderOptions, ParsedBody};
//!
//! #[tokio::main]
//! async fn main() {
//!     tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();
//!
//!     let parser = BodyParser::builder()
//!         .raw(DecoderOptions::new().limit(6 * 1024 * 1024))
//!         .build();
//!
//!     let mut headers = HeaderMap::new();
//!     headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
//!     let body = Full::new(Bytes::from_static(br#"{"name":"bob"}"#));
//!
//!     match parser.parse(&headers, body).await {
//!         Ok(parsed) => {
//!             if let Some(ParsedBody::Json(value)) = parsed.body() {
//!                 println!("decoded: {value}");
//!             }
//!         }
//!         Err(e) => eprintln!("decode failed with {}: {e}", e.status()),
//!     }
//! }
//! ```
//!
//! # Architecture
//!
//! - [`BodyParser`] resolves its configuration once at build time and then
//!   dispatches: the decoder table is evaluated in declaration order (json,
//!   text, urlencoded, raw, multipart) and the first [`MatchRule`] hit wins.
//!   No match is not an error; the request simply proceeds with no parsed
//!   body.
//! - [`LimitedBody`] wraps the transport's `http_body::Body` and enforces
//!   the matched decoder's byte ceiling incrementally.
//! - The form decoders share one nested-structure builder
//!   ([`FieldAccumulator`]), so URL-encoded and multipart field names
//!   reconstruct identically.
//! - The multipart decoder demultiplexes the boundary grammar with a
//!   `tokio_util::codec::Decoder` state machine and streams file parts into
//!   temporary files, exposing a [`FileDescriptor`] per upload.
//!
//! # Error Handling
//!
//! Every failure is a [`DecodeError`] with an HTTP-facing
//! [`status`](DecodeError::status): syntax failures keep the raw body text
//! for diagnosis and map to 400, size violations carry the limit and the
//! observed size and map to 413, temp-storage faults map to 500. A decode
//! failure is terminal for its request only; the parser itself is immutable
//! and shared freely between concurrent requests.

mod body;
mod charset;
mod config;
mod decode;
mod error;
mod form;
mod limit;
mod matcher;
mod multipart;
mod parser;

pub use body::ParsedBody;
pub use config::DecoderOptions;
pub use config::MultipartOptions;
pub use config::{DEFAULT_FIELD_LIMIT, DEFAULT_FILE_LIMIT, DEFAULT_RAW_LIMIT, DEFAULT_TEXT_LIMIT};
pub use error::DecodeError;
pub use form::{FieldAccumulator, FieldMap, FieldValue};
pub use limit::LimitedBody;
pub use matcher::MatchRule;
pub use multipart::{FileDescriptor, FileMap};
pub use parser::{BodyParser, BodyParserBuilder, DecoderKind, ParsedRequest, UploadedFiles};
