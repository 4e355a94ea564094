//! Querystring redaction.
//!
//! Querystring whitelists are exact key names. Every value of a key that is
//! not whitelisted becomes [`REDACTED_STRING`]; the number of values per key
//! is preserved.
//!
//! Keys and values are handled as decoded bytes, so escapes that are not
//! valid UTF-8 survive a round trip and never merge distinct keys.

use super::engine::REDACTED_STRING;
use super::rules::RuleSet;
use std::collections::BTreeMap;
use url::form_urlencoded;

/// Querystring multi-map: each decoded key with all of its decoded values,
/// in arrival order.
///
/// Keys are kept sorted, so the encoded output is canonical rather than a
/// copy of the input ordering.
pub type QueryValues = BTreeMap<Vec<u8>, Vec<Vec<u8>>>;

/// Decodes a raw (`a=1&b=2`) querystring.
#[must_use]
pub fn parse_query(raw: &str) -> QueryValues {
    let mut values = QueryValues::new();
    for pair in raw.split('&').filter(|pair| !pair.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        values.entry(decode(key)).or_default().push(decode(value));
    }
    values
}

// `+` is a space in form encoding; everything else is a percent escape.
fn decode(raw: &str) -> Vec<u8> {
    let spaced = raw.replace('+', " ");
    percent_encoding::percent_decode(spaced.as_bytes()).collect()
}

/// Redacts the values of every key `rules` does not whitelist.
///
/// Keys that are not valid UTF-8 can never match a whitelist entry.
#[must_use]
pub fn redact_query_values(rules: &RuleSet, values: &QueryValues) -> QueryValues {
    values
        .iter()
        .map(|(key, list)| {
            let allowed = std::str::from_utf8(key).is_ok_and(|key| rules.allows_query_key(key));
            let redacted = if allowed {
                list.clone()
            } else {
                vec![REDACTED_STRING.as_bytes().to_vec(); list.len()]
            };
            (key.clone(), redacted)
        })
        .collect()
}

/// Percent-encodes a multi-map back into a querystring.
#[must_use]
pub fn encode_query(values: &QueryValues) -> String {
    let mut pairs = Vec::new();
    for (key, list) in values {
        let key: String = form_urlencoded::byte_serialize(key).collect();
        for value in list {
            let value: String = form_urlencoded::byte_serialize(value).collect();
            pairs.push(format!("{key}={value}"));
        }
    }
    pairs.join("&")
}

/// Parses, redacts and re-encodes a raw querystring.
#[must_use]
pub fn redact_query(rules: &RuleSet, raw: &str) -> String {
    encode_query(&redact_query_values(rules, &parse_query(raw)))
}
