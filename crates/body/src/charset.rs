//! Byte-to-text conversion for the declared (or default) charset.
//!
//! UTF-8 decoding is lossy: undecodable sequences become replacement
//! characters instead of failing, and format-level parsers report their own
//! syntax errors on the decoded text. Only a charset this module does not
//! know at all is a hard error.

use crate::error::DecodeError;

/// Decodes `bytes` using `charset`, falling back to UTF-8 when none is
/// declared.
pub(crate) fn decode(bytes: &[u8], charset: Option<&str>) -> Result<String, DecodeError> {
    let charset = charset.unwrap_or("utf-8");

    if charset.eq_ignore_ascii_case("utf-8")
        || charset.eq_ignore_ascii_case("utf8")
        || charset.eq_ignore_ascii_case("us-ascii")
        || charset.eq_ignore_ascii_case("ascii")
    {
        return Ok(String::from_utf8_lossy(bytes).into_owned());
    }

    if charset.eq_ignore_ascii_case("iso-8859-1") || charset.eq_ignore_ascii_case("latin1") {
        // Latin-1 maps each byte to the code point of the same value.
        return Ok(bytes.iter().map(|&b| char::from(b)).collect());
    }

    Err(DecodeError::unsupported_charset(charset))
}
