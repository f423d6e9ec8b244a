use bytes::Bytes;

/// The catch-all decoder: no charset interpretation, no parsing.
pub(crate) fn decode_raw(bytes: Bytes) -> Bytes {
    bytes
}
