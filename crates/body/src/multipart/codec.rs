//! Framing decoder for `multipart/form-data` streams.
//!
//! The decoder demultiplexes the boundary-delimited grammar of
//! [RFC 7578](https://tools.ietf.org/html/rfc7578) into a flat stream of
//! part events. It never buffers a whole part: payload bytes are handed out
//! as they arrive, with only a bounded tail held back so a delimiter split
//! across two network chunks is still recognized.

use crate::error::DecodeError;
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;
use tracing::trace;

/// RFC 2046 bounds boundaries at 70 characters.
const MAX_BOUNDARY_LEN: usize = 70;

/// Ceiling for one part's header block, matching the limit the surrounding
/// server applies to request headers.
const MAX_PART_HEADER_SIZE: usize = 8 * 1024;

const MAX_PART_HEADERS: usize = 16;

/// One step of a demultiplexed multipart stream.
#[derive(Debug)]
pub(crate) enum PartEvent {
    /// A new part begins; its headers are fully parsed.
    Head(PartHead),
    /// Payload bytes belonging to the current part.
    Data(Bytes),
    /// The current part is complete.
    End,
    /// The close delimiter was consumed; no further parts will follow.
    Finished,
}

/// The parsed headers of one part.
#[derive(Debug, Clone)]
pub(crate) struct PartHead {
    /// Field name from `Content-Disposition`.
    pub name: String,
    /// Filename from `Content-Disposition`; present means file part.
    pub filename: Option<String>,
    /// The part's declared `Content-Type`, verbatim.
    pub content_type: Option<String>,
    /// The part's declared `Content-Transfer-Encoding`, verbatim.
    pub transfer_encoding: Option<String>,
}

impl PartHead {
    pub fn is_file(&self) -> bool {
        self.filename.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Discard bytes until the first boundary line.
    Preamble,
    /// Read one part's header block up to the empty line.
    Header,
    /// Hand out payload bytes until the next delimiter.
    Body,
    /// Close delimiter seen; discard the epilogue.
    Epilogue,
    /// Terminal state.
    Finished,
}

/// Incremental decoder over the multipart boundary grammar.
#[derive(Debug)]
pub(crate) struct MultipartCodec {
    /// `--boundary`, how a delimiter looks at the very start of the stream.
    dash_boundary: Vec<u8>,
    /// `CRLF --boundary`, how a delimiter looks after part data.
    delimiter: Vec<u8>,
    state: State,
}

impl MultipartCodec {
    pub fn new(boundary: &str) -> Result<Self, DecodeError> {
        if boundary.is_empty() || boundary.len() > MAX_BOUNDARY_LEN {
            return Err(DecodeError::stream("invalid multipart boundary"));
        }

        let mut dash_boundary = Vec::with_capacity(boundary.len() + 2);
        dash_boundary.extend_from_slice(b"--");
        dash_boundary.extend_from_slice(boundary.as_bytes());

        let mut delimiter = Vec::with_capacity(dash_boundary.len() + 2);
        delimiter.extend_from_slice(b"\r\n");
        delimiter.extend_from_slice(&dash_boundary);

        Ok(Self { dash_boundary, delimiter, state: State::Preamble })
    }

    pub fn is_finished(&self) -> bool {
        self.state == State::Finished
    }
}

impl Decoder for MultipartCodec {
    type Item = PartEvent;
    type Error = DecodeError;

    /// Decodes the next part event from the accumulated bytes.
    ///
    /// Returns `Ok(None)` when more data is needed; the caller appends the
    /// next arriving chunk and calls again. Bytes that can no longer
    /// influence a decision are dropped (preamble) or emitted (part data),
    /// so the buffer stays bounded regardless of part sizes.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                State::Preamble => {
                    let Some(at) = find_line_start(src, &self.dash_boundary) else {
                        // Keep a tail that could still hold a split boundary line.
                        let keep = self.dash_boundary.len() + 4;
                        if src.len() > keep {
                            let discard = src.len() - keep;
                            src.advance(discard);
                        }
                        return Ok(None);
                    };

                    let after = at + self.dash_boundary.len();
                    if src.len() < after + 2 {
                        src.advance(at);
                        return Ok(None);
                    }

                    match &src[after..after + 2] {
                        b"\r\n" => {
                            src.advance(after + 2);
                            self.state = State::Header;
                        }
                        b"--" => {
                            // A close delimiter with no parts at all.
                            src.advance(after + 2);
                            self.state = State::Epilogue;
                        }
                        // A line that merely starts with the boundary text.
                        _ => src.advance(at + 1),
                    }
                }

                State::Header => {
                    if src.starts_with(b"\r\n") {
                        return Err(DecodeError::stream("multipart part without content-disposition"));
                    }

                    let Some(end) = find_subsequence(src, b"\r\n\r\n") else {
                        if src.len() > MAX_PART_HEADER_SIZE {
                            return Err(DecodeError::stream("multipart part headers too large"));
                        }
                        return Ok(None);
                    };

                    let block_len = end + 4;
                    let head = parse_part_head(&src[..block_len])?;
                    src.advance(block_len);
                    self.state = State::Body;
                    trace!(name = %head.name, file = head.is_file(), "multipart part opened");
                    return Ok(Some(PartEvent::Head(head)));
                }

                State::Body => {
                    let Some(at) = find_subsequence(src, &self.delimiter) else {
                        // Emit everything except a tail that could be the
                        // start of a split delimiter.
                        let keep = self.delimiter.len() + 2;
                        if src.len() > keep {
                            let data = src.split_to(src.len() - keep).freeze();
                            return Ok(Some(PartEvent::Data(data)));
                        }
                        return Ok(None);
                    };

                    if at > 0 {
                        return Ok(Some(PartEvent::Data(src.split_to(at).freeze())));
                    }

                    let after = self.delimiter.len();
                    if src.len() < after + 2 {
                        return Ok(None);
                    }

                    match &src[after..after + 2] {
                        b"\r\n" => {
                            src.advance(after + 2);
                            self.state = State::Header;
                            return Ok(Some(PartEvent::End));
                        }
                        b"--" => {
                            src.advance(after + 2);
                            self.state = State::Epilogue;
                            return Ok(Some(PartEvent::End));
                        }
                        // Boundary-like bytes inside the payload: they are
                        // data. Release one byte and rescan.
                        _ => return Ok(Some(PartEvent::Data(src.split_to(1).freeze()))),
                    }
                }

                State::Epilogue => {
                    src.clear();
                    self.state = State::Finished;
                    trace!("multipart close delimiter consumed");
                    return Ok(Some(PartEvent::Finished));
                }

                State::Finished => {
                    src.clear();
                    return Ok(None);
                }
            }
        }
    }
}

/// First occurrence of `needle` at the start of the stream or of a
/// CRLF-delimited line.
fn find_line_start(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if haystack.len() < needle.len() {
        return None;
    }
    (0..=haystack.len() - needle.len())
        .find(|&i| haystack[i..].starts_with(needle) && (i == 0 || (i >= 2 && &haystack[i - 2..i] == b"\r\n")))
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}

fn parse_part_head(block: &[u8]) -> Result<PartHead, DecodeError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_PART_HEADERS];
    let parsed = match httparse::parse_headers(block, &mut headers) {
        Ok(httparse::Status::Complete((_, parsed))) => parsed,
        Ok(httparse::Status::Partial) => {
            return Err(DecodeError::stream("truncated multipart part headers"));
        }
        Err(e) => return Err(DecodeError::stream(format!("invalid multipart part headers: {e}"))),
    };

    let mut disposition = None;
    let mut content_type = None;
    let mut transfer_encoding = None;

    for header in parsed {
        let value = String::from_utf8_lossy(header.value).into_owned();
        if header.name.eq_ignore_ascii_case("content-disposition") {
            disposition = Some(value);
        } else if header.name.eq_ignore_ascii_case("content-type") {
            content_type = Some(value);
        } else if header.name.eq_ignore_ascii_case("content-transfer-encoding") {
            transfer_encoding = Some(value);
        }
    }

    let disposition =
        disposition.ok_or_else(|| DecodeError::stream("multipart part without content-disposition"))?;
    let (name, filename) = parse_content_disposition(&disposition)?;

    Ok(PartHead { name, filename, content_type, transfer_encoding })
}

/// Extracts `name` and `filename` from a `form-data; name="x"; filename="y"`
/// header value.
fn parse_content_disposition(value: &str) -> Result<(String, Option<String>), DecodeError> {
    let mut name = None;
    let mut filename = None;

    for param in value.split(';').skip(1) {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.eq_ignore_ascii_case("name") {
            name = Some(unquote(raw));
        } else if key.eq_ignore_ascii_case("filename") {
            filename = Some(unquote(raw));
        }
    }

    let name = name.ok_or_else(|| DecodeError::stream("multipart content-disposition without a name"))?;
    Ok((name, filename))
}

fn unquote(raw: &str) -> String {
    let raw = raw.trim();
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        raw[1..raw.len() - 1].to_string()
    } else {
        raw.to_string()
    }
}
