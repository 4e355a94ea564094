//! Redaction engine.
//!
//! - **`location`**: whitelist pattern syntax and concrete location paths
//! - **`rules`**: the per-request [`RuleSet`]
//! - **`engine`**: recursive, shape-preserving tree redaction
//! - **`querystring`**: exact-key querystring redaction
//!
//! Everything is redacted unless a rule whitelists it. Containers keep their
//! keys and lengths; leaves are replaced by a placeholder of the same type.

mod engine;
mod location;
mod querystring;
mod rules;

pub use engine::{REDACTED_BOOL, REDACTED_NUMBER, REDACTED_STRING, redact, redact_at};
pub use location::{LocationPath, LocationPattern, PatternError, Segment};
pub use querystring::{QueryValues, encode_query, parse_query, redact_query, redact_query_values};
pub use rules::RuleSet;
