//! JSON codec.

use super::{CodecError, ContentCodec};
use crate::models::TreeValue;
use serde_json::{Map, Number, Value};

/// Largest magnitude at which every integer is exactly representable as `f64`.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// `application/json` codec backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl ContentCodec for JsonCodec {
    fn media_type(&self) -> &'static str {
        "application/json"
    }

    fn decode(&self, bytes: &[u8]) -> Result<TreeValue, CodecError> {
        let value: Value = serde_json::from_slice(bytes).map_err(|e| CodecError::Decode {
            media_type: self.media_type(),
            source: Box::new(e),
        })?;
        Ok(from_json(value))
    }

    fn encode(&self, value: &TreeValue) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(&to_json(value)).map_err(|e| CodecError::Encode {
            media_type: self.media_type(),
            source: Box::new(e),
        })
    }
}

/// Converts a parsed JSON document into a tree.
///
/// Every parsed number fits an `f64`; out-of-range literals fail in
/// `serde_json::from_slice` and never reach this point.
#[must_use]
fn from_json(value: Value) -> TreeValue {
    match value {
        Value::Object(map) => TreeValue::Object(
            map.into_iter()
                .map(|(key, child)| (key, from_json(child)))
                .collect(),
        ),
        Value::Array(items) => TreeValue::Array(items.into_iter().map(from_json).collect()),
        Value::String(s) => TreeValue::String(s),
        Value::Number(n) => n.as_f64().map_or(TreeValue::Unsupported, TreeValue::Number),
        Value::Bool(b) => TreeValue::Bool(b),
        Value::Null => TreeValue::Null,
    }
}

/// Converts a tree into a JSON document.
///
/// Object keys come out in the tree's sorted order.
#[must_use]
fn to_json(value: &TreeValue) -> Value {
    match value {
        TreeValue::Object(map) => Value::Object(
            map.iter()
                .map(|(key, child)| (key.clone(), to_json(child)))
                .collect::<Map<_, _>>(),
        ),
        TreeValue::Array(items) => Value::Array(items.iter().map(to_json).collect()),
        TreeValue::String(s) => Value::String(s.clone()),
        TreeValue::Number(n) => number_to_json(*n),
        TreeValue::Bool(b) => Value::Bool(*b),
        TreeValue::Null | TreeValue::Unsupported => Value::Null,
    }
}

/// Integral values are written without a fractional part (`10`, not `10.0`).
#[allow(clippy::float_cmp, clippy::cast_possible_truncation)]
fn number_to_json(n: f64) -> Value {
    if n.is_finite() && n.trunc() == n && n.abs() <= MAX_EXACT_INTEGER {
        return Value::Number(Number::from(n as i64));
    }
    Number::from_f64(n).map_or(Value::Null, Value::Number)
}
