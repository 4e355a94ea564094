//! Generic tree value.
//!
//! Every supported content encoding decodes into a [`TreeValue`], and the
//! redaction engine only ever walks this closed set of shapes.

use std::collections::BTreeMap;

/// A decoded document node.
///
/// Objects keep unique keys in sorted order so re-encoding is deterministic.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TreeValue {
    /// Mapping of string keys to nested values.
    Object(BTreeMap<String, TreeValue>),
    /// Ordered sequence of nested values.
    Array(Vec<TreeValue>),
    /// String leaf.
    String(String),
    /// Numeric leaf. All numbers share one double-precision kind.
    Number(f64),
    /// Boolean leaf.
    Bool(bool),
    /// Explicit null.
    #[default]
    Null,
    /// A leaf the codec could not classify.
    Unsupported,
}

impl TreeValue {
    /// Returns the name of this value's shape, for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Object(_) => "object",
            Self::Array(_) => "array",
            Self::String(_) => "string",
            Self::Number(_) => "number",
            Self::Bool(_) => "bool",
            Self::Null => "null",
            Self::Unsupported => "unsupported",
        }
    }

    /// Returns `true` for objects and arrays.
    #[must_use]
    pub const fn is_container(&self) -> bool {
        matches!(self, Self::Object(_) | Self::Array(_))
    }

    /// Returns the object map, if this is an object.
    #[must_use]
    pub const fn as_object(&self) -> Option<&BTreeMap<String, Self>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the array items, if this is an array.
    #[must_use]
    pub fn as_array(&self) -> Option<&[Self]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Looks up a direct child of an object by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Self> {
        self.as_object().and_then(|map| map.get(key))
    }
}

impl From<&str> for TreeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for TreeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<f64> for TreeValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for TreeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec<Self>> for TreeValue {
    fn from(items: Vec<Self>) -> Self {
        Self::Array(items)
    }
}

impl<K: Into<String>> FromIterator<(K, Self)> for TreeValue {
    fn from_iter<I: IntoIterator<Item = (K, Self)>>(iter: I) -> Self {
        Self::Object(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        assert_eq!(TreeValue::Null.kind(), "null");
        assert_eq!(TreeValue::Unsupported.kind(), "unsupported");
        assert_eq!(TreeValue::from("x").kind(), "string");
        assert_eq!(TreeValue::from(1.0).kind(), "number");
    }

    #[test]
    fn test_object_from_pairs() {
        let value: TreeValue = [("b", TreeValue::from(true)), ("a", TreeValue::Null)]
            .into_iter()
            .collect();

        let keys: Vec<&str> = value
            .as_object()
            .map(|map| map.keys().map(String::as_str).collect())
            .unwrap_or_default();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(value.get("b"), Some(&TreeValue::Bool(true)));
        assert!(value.is_container());
    }

    #[test]
    fn test_default_is_null() {
        assert_eq!(TreeValue::default(), TreeValue::Null);
    }
}
