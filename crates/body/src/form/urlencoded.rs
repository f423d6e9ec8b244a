//! URL-encoded body decoding.
//!
//! The wire-level rules (`&` splitting, first-`=` splitting, percent
//! decoding, `+` as space) come from `serde_urlencoded`; this module only
//! feeds the resulting flat pairs through the [`FieldAccumulator`].
//! Structural oddities in the input never fail this decoder — only the
//! stream limiter can.

use crate::form::{FieldAccumulator, FieldMap};

pub(crate) fn decode_urlencoded(text: &str) -> FieldMap {
    // Deserializing into raw pairs cannot fail: every piece of a degenerate
    // body folds into some (possibly empty) key/value pair.
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(text).unwrap_or_default();

    let mut fields = FieldAccumulator::new();
    for (key, value) in pairs {
        fields.push(&key, value);
    }
    fields.finish()
}
