//! Rule selection.
//!
//! Match clauses are scanned in configuration order and the first one whose
//! method and path predicates both hold supplies the request's [`RuleSet`].
//! When nothing matches, the empty rule set applies and everything is
//! redacted.

use crate::redaction::RuleSet;

static DEFAULT_RULES: RuleSet = RuleSet::empty();

/// A configured pairing of request predicates with a rule set.
///
/// An unset predicate matches any request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchClause {
    /// HTTP method, compared case-insensitively.
    pub method: Option<String>,
    /// Request path, compared ignoring trailing slashes.
    pub path: Option<String>,
    /// Whitelists applied when this clause matches.
    pub rules: RuleSet,
}

impl MatchClause {
    /// Creates a clause that matches every request.
    #[must_use]
    pub const fn new(rules: RuleSet) -> Self {
        Self {
            method: None,
            path: None,
            rules,
        }
    }

    /// Restricts the clause to one method.
    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Restricts the clause to one path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Tests the clause against a request's method and original path.
    #[must_use]
    pub fn matches(&self, method: &str, path: &str) -> bool {
        let method_ok = self
            .method
            .as_deref()
            .is_none_or(|expected| is_same_case_insensitive(expected, method));
        let path_ok = self
            .path
            .as_deref()
            .is_none_or(|expected| is_same_path(expected, path));
        method_ok && path_ok
    }
}

/// Returns the index of the first clause matching the request, if any.
#[must_use]
pub fn find_clause(clauses: &[MatchClause], method: &str, path: &str) -> Option<usize> {
    clauses
        .iter()
        .position(|clause| clause.matches(method, path))
}

/// Returns the rule set of the first matching clause, or the empty rule set.
#[must_use]
pub fn select_rules<'c>(clauses: &'c [MatchClause], method: &str, path: &str) -> &'c RuleSet {
    rules_at(clauses, find_clause(clauses, method, path))
}

/// Returns the rule set of the clause at `index`, or the empty rule set.
#[must_use]
pub fn rules_at(clauses: &[MatchClause], index: Option<usize>) -> &RuleSet {
    index
        .and_then(|index| clauses.get(index))
        .map_or(&DEFAULT_RULES, |clause| &clause.rules)
}

/// Compares two paths ignoring any number of trailing slashes.
#[must_use]
pub fn is_same_path(a: &str, b: &str) -> bool {
    a.trim_end_matches('/') == b.trim_end_matches('/')
}

/// Compares two strings ignoring ASCII case.
#[must_use]
pub fn is_same_case_insensitive(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}
