//! Tagged JSON value representation
//!
//! The Filter Executor walks dotted field paths over arbitrary metadata.
//! Per the design note in the spec, that walk is over a tagged sum type
//! (object/array/scalar), never reflection over a native language object.

use serde_json::Value as JsonRaw;
use std::collections::BTreeMap;
use std::fmt;

/// A tagged JSON value used throughout the filter evaluation path.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<JsonValue>),
    Object(BTreeMap<String, JsonValue>),
}

impl JsonValue {
    /// Descends through nested objects/arrays using dot-separated segments.
    /// A missing segment, or descending through a scalar, yields `None`
    /// (the "undefined" state the executor compares unequal to everything
    /// except `null`).
    pub fn get_path(&self, path: &str) -> Option<&JsonValue> {
        if path.is_empty() {
            return Some(self);
        }
        let mut current = self;
        for segment in path.split('.') {
            current = match current {
                JsonValue::Object(map) => map.get(segment)?,
                JsonValue::Array(items) => {
                    let idx: usize = segment.parse().ok()?;
                    items.get(idx)?
                }
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            JsonValue::Number(n) => Some(*n),
            JsonValue::String(s) => s.trim().parse().ok(),
            JsonValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_str_coerced(&self) -> Option<String> {
        match self {
            JsonValue::String(s) => Some(s.clone()),
            JsonValue::Number(n) => Some(format!("{n}")),
            JsonValue::Bool(b) => Some(b.to_string()),
            JsonValue::Null => None,
            JsonValue::Array(_) | JsonValue::Object(_) => {
                serde_json::to_string(&JsonRaw::from(self.clone())).ok()
            }
        }
    }

    pub fn as_array(&self) -> Option<&[JsonValue]> {
        match self {
            JsonValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, JsonValue::Null)
    }
}

impl fmt::Display for JsonValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str_coerced() {
            Some(s) => write!(f, "{s}"),
            None => write!(f, "null"),
        }
    }
}

impl From<JsonRaw> for JsonValue {
    fn from(value: JsonRaw) -> Self {
        match value {
            JsonRaw::Null => JsonValue::Null,
            JsonRaw::Bool(b) => JsonValue::Bool(b),
            JsonRaw::Number(n) => JsonValue::Number(n.as_f64().unwrap_or(0.0)),
            JsonRaw::String(s) => JsonValue::String(s),
            JsonRaw::Array(items) => JsonValue::Array(items.into_iter().map(JsonValue::from).collect()),
            JsonRaw::Object(map) => {
                JsonValue::Object(map.into_iter().map(|(k, v)| (k, JsonValue::from(v))).collect())
            }
        }
    }
}

impl From<JsonValue> for JsonRaw {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => JsonRaw::Null,
            JsonValue::Bool(b) => JsonRaw::Bool(b),
            JsonValue::Number(n) => serde_json::Number::from_f64(n)
                .map(JsonRaw::Number)
                .unwrap_or(JsonRaw::Null),
            JsonValue::String(s) => JsonRaw::String(s),
            JsonValue::Array(items) => JsonRaw::Array(items.into_iter().map(JsonRaw::from).collect()),
            JsonValue::Object(map) => {
                JsonRaw::Object(map.into_iter().map(|(k, v)| (k, JsonRaw::from(v))).collect())
            }
        }
    }
}

impl From<&str> for JsonValue {
    fn from(value: &str) -> Self {
        JsonValue::String(value.to_string())
    }
}

impl From<f64> for JsonValue {
    fn from(value: f64) -> Self {
        JsonValue::Number(value)
    }
}

impl From<Vec<String>> for JsonValue {
    fn from(value: Vec<String>) -> Self {
        JsonValue::Array(value.into_iter().map(JsonValue::String).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(pairs: &[(&str, JsonValue)]) -> JsonValue {
        JsonValue::Object(pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
    }

    #[test]
    fn nested_path_resolves() {
        let value = obj(&[("a", obj(&[("b", JsonValue::Number(42.0))]))]);
        assert_eq!(value.get_path("a.b"), Some(&JsonValue::Number(42.0)));
    }

    #[test]
    fn missing_segment_is_none() {
        let value = obj(&[("a", JsonValue::Number(1.0))]);
        assert_eq!(value.get_path("a.b"), None);
    }

    #[test]
    fn descending_through_scalar_is_none() {
        let value = JsonValue::Number(1.0);
        assert_eq!(value.get_path("a"), None);
    }

    #[test]
    fn roundtrips_through_serde_json() {
        let raw: JsonRaw = serde_json::json!({"a": [1, "x", true, null]});
        let tagged: JsonValue = raw.clone().into();
        let back: JsonRaw = tagged.into();
        assert_eq!(raw, back);
    }
}
