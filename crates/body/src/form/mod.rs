//! Reconstruction of nested structures from flat form field names.
//!
//! Both the URL-encoded and the multipart decoder produce flat
//! `(name, value)` pairs where the name may carry bracket notation:
//! `name`, `name[key]`, `name[idx]`, `name[]`. The [`FieldAccumulator`]
//! folds those pairs, in encounter order, into one nested [`FieldMap`].

mod urlencoded;

pub(crate) use urlencoded::decode_urlencoded;

use std::collections::BTreeMap;

/// Nested form fields keyed by their base name.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// Numeric bracket indices above this bound are treated as map keys rather
/// than sequence positions, so hostile input cannot force huge allocations.
const MAX_ARRAY_INDEX: usize = 20;

/// One reconstructed form value.
///
/// Sequence slots are `Option` so a sparse index assignment leaves observable
/// holes: `a[0]=x&a[2]=y` yields `[Some, None, Some]`, never a two-element
/// sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Seq(Vec<Option<FieldValue>>),
    Map(FieldMap),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Option<FieldValue>]> {
        match self {
            Self::Seq(seq) => Some(seq),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&FieldMap> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }
}

/// Accumulates flat `(name, value)` pairs for one request.
///
/// Transient state: `finish` consumes the accumulator and nothing is
/// retained once the request completes.
#[derive(Debug, Default)]
pub struct FieldAccumulator {
    root: FieldMap,
}

enum FlatKey<'a> {
    Plain(&'a str),
    Append(&'a str),
    Index(&'a str, usize),
    Key(&'a str, &'a str),
}

fn parse_flat_key(raw: &str) -> FlatKey<'_> {
    if let Some(open) = raw.find('[') {
        if raw.ends_with(']') && open > 0 {
            let base = &raw[..open];
            let segment = &raw[open + 1..raw.len() - 1];
            if !segment.contains('[') && !segment.contains(']') {
                if segment.is_empty() {
                    return FlatKey::Append(base);
                }
                if segment.bytes().all(|b| b.is_ascii_digit()) {
                    if let Ok(idx) = segment.parse::<usize>() {
                        if idx <= MAX_ARRAY_INDEX {
                            return FlatKey::Index(base, idx);
                        }
                    }
                }
                return FlatKey::Key(base, segment);
            }
        }
    }
    FlatKey::Plain(raw)
}

impl FieldAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Folds one flat pair into the structure.
    ///
    /// Pairs with an empty name are dropped. Re-assignments that conflict
    /// with an existing shape (a scalar where a map already lives, and the
    /// like) resolve by last write wins.
    pub fn push(&mut self, raw_key: &str, value: String) {
        if raw_key.is_empty() {
            return;
        }

        match parse_flat_key(raw_key) {
            FlatKey::Plain(name) => collect_value(&mut self.root, name, value),
            FlatKey::Append(name) => {
                let seq = ensure_seq(&mut self.root, name);
                seq.push(Some(FieldValue::Text(value)));
            }
            FlatKey::Index(name, idx) => {
                let seq = ensure_seq(&mut self.root, name);
                if seq.len() <= idx {
                    seq.resize(idx + 1, None);
                }
                seq[idx] = Some(FieldValue::Text(value));
            }
            FlatKey::Key(name, sub) => {
                let map = ensure_map(&mut self.root, name);
                collect_value(map, sub, value);
            }
        }
    }

    /// Consumes the accumulator and yields the reconstructed structure.
    pub fn finish(self) -> FieldMap {
        self.root
    }
}

/// Plain-name semantics: first occurrence is a scalar, repeats collect into
/// an ordered sequence.
fn collect_value(map: &mut FieldMap, name: &str, value: String) {
    match map.get_mut(name) {
        None => {
            map.insert(name.to_string(), FieldValue::Text(value));
        }
        Some(FieldValue::Seq(seq)) => seq.push(Some(FieldValue::Text(value))),
        Some(slot @ FieldValue::Text(_)) => {
            let first = std::mem::replace(slot, FieldValue::Seq(Vec::new()));
            if let FieldValue::Seq(seq) = slot {
                seq.push(Some(first));
                seq.push(Some(FieldValue::Text(value)));
            }
        }
        Some(slot) => *slot = FieldValue::Text(value),
    }
}

fn ensure_seq<'m>(map: &'m mut FieldMap, name: &str) -> &'m mut Vec<Option<FieldValue>> {
    let slot = map.entry(name.to_string()).or_insert_with(|| FieldValue::Seq(Vec::new()));
    match slot {
        FieldValue::Seq(_) => {}
        FieldValue::Text(_) => {
            // A scalar joined by indexed values becomes the sequence head.
            let first = std::mem::replace(slot, FieldValue::Seq(Vec::new()));
            if let FieldValue::Seq(seq) = slot {
                seq.push(Some(first));
            }
        }
        FieldValue::Map(_) => *slot = FieldValue::Seq(Vec::new()),
    }
    match slot {
        FieldValue::Seq(seq) => seq,
        _ => unreachable!("slot was just coerced to a sequence"),
    }
}

fn ensure_map<'m>(map: &'m mut FieldMap, name: &str) -> &'m mut FieldMap {
    let slot = map.entry(name.to_string()).or_insert_with(|| FieldValue::Map(FieldMap::new()));
    if !matches!(slot, FieldValue::Map(_)) {
        *slot = FieldValue::Map(FieldMap::new());
    }
    match slot {
        FieldValue::Map(inner) => inner,
        _ => unreachable!("slot was just coerced to a map"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Option<FieldValue> {
        Some(FieldValue::Text(s.to_string()))
    }

    fn build(pairs: &[(&str, &str)]) -> FieldMap {
        let mut acc = FieldAccumulator::new();
        for (key, value) in pairs {
            acc.push(key, (*value).to_string());
        }
        acc.finish()
    }

    #[test]
    fn test_repeated_plain_names_collect_in_order() {
        let fields = build(&[("biz", "42"), ("biz", "43"), ("biz", "44")]);
        let seq = fields["biz"].as_seq().unwrap();
        assert_eq!(seq, &[text("42"), text("43"), text("44")]);
    }

    #[test]
    fn test_sparse_indices_leave_explicit_holes() {
        let fields = build(&[("baz[5]", "A"), ("baz[0]", "B"), ("baz[2]", "C")]);
        let seq = fields["baz"].as_seq().unwrap();
        assert_eq!(seq.len(), 6);
        assert_eq!(seq[0], text("B"));
        assert_eq!(seq[1], None);
        assert_eq!(seq[2], text("C"));
        assert_eq!(seq[3], None);
        assert_eq!(seq[4], None);
        assert_eq!(seq[5], text("A"));
    }

    #[test]
    fn test_bracket_keys_build_a_map() {
        let fields = build(&[("bob[name]", "bob"), ("bob[age]", "42")]);
        let map = fields["bob"].as_map().unwrap();
        assert_eq!(map["name"].as_text(), Some("bob"));
        assert_eq!(map["age"].as_text(), Some("42"));
    }

    #[test]
    fn test_append_notation() {
        let fields = build(&[("a[]", "1"), ("a[]", "2")]);
        let seq = fields["a"].as_seq().unwrap();
        assert_eq!(seq, &[text("1"), text("2")]);
    }

    #[test]
    fn test_repeated_map_key_collects_like_plain_names() {
        let fields = build(&[("a[b]", "1"), ("a[b]", "2")]);
        let map = fields["a"].as_map().unwrap();
        let seq = map["b"].as_seq().unwrap();
        assert_eq!(seq, &[text("1"), text("2")]);
    }

    #[test]
    fn test_huge_index_becomes_map_key() {
        let fields = build(&[("a[10000]", "x")]);
        let map = fields["a"].as_map().unwrap();
        assert_eq!(map["10000"].as_text(), Some("x"));
    }

    #[test]
    fn test_empty_names_are_dropped() {
        let fields = build(&[("", "lost"), ("kept", "v")]);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["kept"].as_text(), Some("v"));
    }

    #[test]
    fn test_literal_keys_with_odd_brackets_stay_literal() {
        let fields = build(&[("a[b][c]", "1"), ("[x]", "2")]);
        assert_eq!(fields["a[b][c]"].as_text(), Some("1"));
        assert_eq!(fields["[x]"].as_text(), Some("2"));
    }

    #[test]
    fn test_conflicting_reassignment_is_last_write_wins() {
        let fields = build(&[("a[b]", "1"), ("a", "2")]);
        assert_eq!(fields["a"].as_text(), Some("2"));
    }

    #[test]
    fn test_scalar_joined_by_index_becomes_sequence_head() {
        let fields = build(&[("a", "1"), ("a[2]", "3")]);
        let seq = fields["a"].as_seq().unwrap();
        assert_eq!(seq, &[text("1"), None, text("3")]);
    }
}
