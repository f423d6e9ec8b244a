use crate::charset;
use crate::error::DecodeError;

/// Decodes the collected bytes as text and exposes them unchanged.
pub(crate) fn decode_text(bytes: &[u8], charset: Option<&str>) -> Result<String, DecodeError> {
    charset::decode(bytes, charset)
}
