//! Shape-preserving tree redaction.
//!
//! Every leaf is overwritten with a placeholder of its own type unless a body
//! rule covers its location. A rule covering a container passes the whole
//! container through untouched, including everything nested beneath it.
//! Operators are expected to whitelist leaf locations.

use super::location::LocationPath;
use super::rules::RuleSet;
use crate::models::TreeValue;

/// Replacement for string leaves.
pub const REDACTED_STRING: &str = "REDACTED";

/// Replacement for numeric leaves.
pub const REDACTED_NUMBER: f64 = 0.0;

/// Replacement for boolean leaves.
pub const REDACTED_BOOL: bool = false;

/// Redacts a whole document, starting at the root location `$`.
///
/// Returns a new tree; `value` is never modified.
#[must_use]
pub fn redact(rules: &RuleSet, value: &TreeValue) -> TreeValue {
    let mut location = LocationPath::root();
    redact_at(rules, value, &mut location)
}

/// Redacts `value` as if it sits at `location`.
///
/// `location` is used as a scratch stack while descending and is restored
/// to its original depth before returning.
#[must_use]
pub fn redact_at<'v>(
    rules: &RuleSet,
    value: &'v TreeValue,
    location: &mut LocationPath<'v>,
) -> TreeValue {
    if rules.allows_location(location) {
        return value.clone();
    }

    match value {
        TreeValue::Object(map) => TreeValue::Object(
            map.iter()
                .map(|(key, child)| {
                    location.push_key(key);
                    let redacted = redact_at(rules, child, location);
                    location.pop();
                    (key.clone(), redacted)
                })
                .collect(),
        ),
        TreeValue::Array(items) => TreeValue::Array(
            items
                .iter()
                .enumerate()
                .map(|(index, child)| {
                    location.push_index(index);
                    let redacted = redact_at(rules, child, location);
                    location.pop();
                    redacted
                })
                .collect(),
        ),
        TreeValue::String(_) => TreeValue::String(REDACTED_STRING.to_string()),
        TreeValue::Number(_) => TreeValue::Number(REDACTED_NUMBER),
        TreeValue::Bool(_) => TreeValue::Bool(REDACTED_BOOL),
        TreeValue::Null | TreeValue::Unsupported => TreeValue::Null,
    }
}
