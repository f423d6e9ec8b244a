//! Content-type match rules.
//!
//! Every decoder carries one [`MatchRule`]. Rules are evaluated against the
//! request's declared media type with its parameters already stripped (the
//! `mime` crate keeps them separate), in the parser's fixed declaration
//! order, and the first matching decoder wins.

use mime::Mime;
use std::fmt;
use std::sync::Arc;

type PredicateFn = dyn Fn(&Mime) -> bool + Send + Sync;

/// A rule deciding whether a decoder applies to a media type.
///
/// The common cases are data-driven (`Exact`, `Wildcard`); `Predicate` is the
/// escape hatch for callers that need full control, same as a hand-written
/// request filter.
#[derive(Clone)]
pub enum MatchRule {
    /// Case-insensitive compare against the `type/subtype` essence.
    Exact(String),
    /// A pattern with `*` on either side, e.g. `*/json` or `text/*`.
    ///
    /// A concrete subtype also matches structured-syntax suffixes, so
    /// `*/json` matches `application/calendar+json`.
    Wildcard(String),
    /// Caller-supplied predicate over the parsed media type.
    Predicate(Arc<PredicateFn>),
}

impl MatchRule {
    pub fn exact(essence: impl Into<String>) -> Self {
        Self::Exact(essence.into())
    }

    pub fn wildcard(pattern: impl Into<String>) -> Self {
        Self::Wildcard(pattern.into())
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Mime) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(f))
    }

    pub(crate) fn matches(&self, mime: &Mime) -> bool {
        match self {
            Self::Exact(essence) => mime.essence_str().eq_ignore_ascii_case(essence),
            Self::Wildcard(pattern) => {
                let Some((type_, subtype)) = pattern.split_once('/') else {
                    return false;
                };
                let type_ok = type_ == "*" || mime.type_().as_str().eq_ignore_ascii_case(type_);
                let subtype_ok = subtype == "*"
                    || mime.subtype().as_str().eq_ignore_ascii_case(subtype)
                    || mime.suffix().is_some_and(|suffix| suffix.as_str().eq_ignore_ascii_case(subtype));
                type_ok && subtype_ok
            }
            Self::Predicate(f) => f(mime),
        }
    }
}

/// `"foo/bar"` becomes an exact rule, anything containing `*` a wildcard.
impl From<&str> for MatchRule {
    fn from(pattern: &str) -> Self {
        if pattern.contains('*') {
            Self::Wildcard(pattern.to_string())
        } else {
            Self::Exact(pattern.to_string())
        }
    }
}

impl fmt::Debug for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(essence) => f.debug_tuple("Exact").field(essence).finish(),
            Self::Wildcard(pattern) => f.debug_tuple("Wildcard").field(pattern).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mime(s: &str) -> Mime {
        s.parse().unwrap()
    }

    #[test]
    fn test_exact_ignores_case_and_parameters() {
        let rule = MatchRule::exact("application/x-www-form-urlencoded");
        assert!(rule.matches(&mime("application/x-www-form-urlencoded; charset=utf-8")));
        assert!(rule.matches(&mime("Application/X-WWW-Form-Urlencoded")));
        assert!(!rule.matches(&mime("application/json")));
    }

    #[test]
    fn test_wildcard_subtype_matches_suffix() {
        let rule = MatchRule::wildcard("*/json");
        assert!(rule.matches(&mime("application/json")));
        assert!(rule.matches(&mime("text/json")));
        assert!(rule.matches(&mime("application/calendar+json")));
        assert!(!rule.matches(&mime("application/xml")));
        assert!(!rule.matches(&mime("text/plain")));
    }

    #[test]
    fn test_wildcard_type() {
        let rule = MatchRule::wildcard("text/*");
        assert!(rule.matches(&mime("text/plain")));
        assert!(rule.matches(&mime("text/css; charset=utf-8")));
        assert!(!rule.matches(&mime("application/json")));
    }

    #[test]
    fn test_predicate() {
        let rule = MatchRule::predicate(|m| m.type_() != mime::MULTIPART);
        assert!(rule.matches(&mime("application/octet-stream")));
        assert!(!rule.matches(&mime("multipart/form-data; boundary=x")));
    }

    #[test]
    fn test_from_str_detects_wildcards() {
        assert!(matches!(MatchRule::from("foo/bar"), MatchRule::Exact(_)));
        assert!(matches!(MatchRule::from("*/json"), MatchRule::Wildcard(_)));
    }
}
