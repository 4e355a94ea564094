//! Whitelist rule sets.

use super::location::{LocationPath, LocationPattern};
use crate::{Error, Result};

/// Whitelists applicable to one request.
///
/// Body rules are compiled location patterns; querystring rules are exact key
/// names. An empty rule set whitelists nothing, so everything is redacted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    body: Vec<LocationPattern>,
    querystring: Vec<String>,
}

impl RuleSet {
    /// Creates a rule set that whitelists nothing.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            body: Vec::new(),
            querystring: Vec::new(),
        }
    }

    /// Creates a rule set from already-compiled body patterns.
    #[must_use]
    pub const fn new(body: Vec<LocationPattern>, querystring: Vec<String>) -> Self {
        Self { body, querystring }
    }

    /// Compiles body pattern strings and collects querystring keys.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] naming the first malformed body
    /// pattern.
    pub fn compile<B, Q>(body: B, querystring: Q) -> Result<Self>
    where
        B: IntoIterator,
        B::Item: AsRef<str>,
        Q: IntoIterator,
        Q::Item: Into<String>,
    {
        let body = body
            .into_iter()
            .map(|pattern| {
                let pattern = pattern.as_ref();
                LocationPattern::compile(pattern).map_err(|source| Error::InvalidPattern {
                    pattern: pattern.to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            body,
            querystring: querystring.into_iter().map(Into::into).collect(),
        })
    }

    /// Returns `true` if no rule of either kind is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty() && self.querystring.is_empty()
    }

    /// Compiled body patterns, in configuration order.
    #[must_use]
    pub fn body_patterns(&self) -> &[LocationPattern] {
        &self.body
    }

    /// Whitelisted querystring keys, in configuration order.
    #[must_use]
    pub fn querystring_keys(&self) -> &[String] {
        &self.querystring
    }

    /// Returns `true` if any body rule covers `location`.
    #[must_use]
    pub fn allows_location(&self, location: &LocationPath<'_>) -> bool {
        self.body.iter().any(|pattern| pattern.matches(location))
    }

    /// Returns `true` if `key` is whitelisted in the querystring.
    #[must_use]
    pub fn allows_query_key(&self, key: &str) -> bool {
        self.querystring.iter().any(|allowed| allowed == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::redaction::location::{PatternError, Segment};
    use test_case::test_case;

    fn location<'a>(segments: &[Segment<'a>]) -> LocationPath<'a> {
        segments.iter().copied().collect()
    }

    #[test_case(&[], &[Segment::Key("a")], false ; "with no rules")]
    #[test_case(&["$.a"], &[Segment::Key("b")], false ; "with a rule that does not match")]
    #[test_case(&["$.a"], &[Segment::Key("a")], true ; "with a rule that matches")]
    #[test_case(&["$[*]"], &[Segment::Index(5)], true ; "with a wildcard rule that matches")]
    #[test_case(&["$.b", "$.a"], &[Segment::Key("a")], true ; "with one match out of many")]
    #[test_case(&["$.b", "$.a"], &[Segment::Key("c")], false ; "with no match out of many")]
    fn test_allows_location(rules: &[&str], segments: &[Segment<'_>], expected: bool) {
        let rules = RuleSet::compile(rules, Vec::<String>::new()).unwrap();
        assert_eq!(rules.allows_location(&location(segments)), expected);
    }

    #[test_case(&[], "a", false ; "with no rules")]
    #[test_case(&["a"], "a", true ; "with one matching rule")]
    #[test_case(&["a", "b"], "b", true ; "with one match out of many")]
    #[test_case(&["a", "b"], "c", false ; "with no match out of many")]
    #[test_case(&["a"], "A", false ; "keys are case sensitive")]
    #[test_case(&["a*"], "ab", false ; "keys have no wildcard syntax")]
    fn test_allows_query_key(keys: &[&str], key: &str, expected: bool) {
        let rules = RuleSet::compile(Vec::<String>::new(), keys.iter().copied()).unwrap();
        assert_eq!(rules.allows_query_key(key), expected);
    }

    #[test]
    fn test_compile_reports_bad_pattern() {
        let err = RuleSet::compile(["$.ok", "oops"], Vec::<String>::new()).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidPattern { ref pattern, source: PatternError::MissingRoot } if pattern == "oops"
        ));
    }

    #[test]
    fn test_empty() {
        let rules = RuleSet::empty();
        assert!(rules.is_empty());
        assert!(!rules.allows_location(&LocationPath::root()));
        assert_eq!(rules, RuleSet::default());
    }
}
