//! The closed universe of directly-sendable values.
//!
//! Anything that crosses the wire without a transfer handler must be a
//! [`Value`]. The set is deliberately closed: primitives, dates, regex
//! *sources* (never compiled), binary buffers, ordered sequences and
//! mappings, and string-keyed records. Everything else — live objects,
//! functions, handles — must go through a transfer handler and cross the
//! wire by reference instead.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A directly-sendable value.
///
/// `Value` is the payload type of every `RAW` wire value and of every
/// handler-serialized payload. It round-trips losslessly through any
/// [`MessageCodec`](crate::MessageCodec).
///
/// # Examples
///
/// ```
/// use marionette_core::Value;
///
/// let v = Value::record([
///     ("name", Value::from("marionette")),
///     ("answer", Value::from(42)),
/// ]);
/// assert_eq!(v.get("answer"), Some(&Value::Int(42)));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// The absent value. Navigation past a missing property yields `Null`.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 string.
    Text(String),
    /// A point in time (UTC).
    Date(DateTime<Utc>),
    /// A regular expression *source*. Carried as data, never compiled.
    Regex {
        /// The pattern source.
        pattern: String,
        /// Flag characters, transport-opaque (e.g. `"gi"`).
        flags: String,
    },
    /// Raw binary buffer.
    Bytes(Vec<u8>),
    /// Ordered sequence of sendable values.
    List(Vec<Value>),
    /// Ordered mapping with arbitrary sendable keys.
    Map(Vec<(Value, Value)>),
    /// String-keyed record of sendable values.
    Record(BTreeMap<String, Value>),
}

impl Value {
    /// Build a record from `(key, value)` pairs.
    pub fn record<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Value::Record(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    /// Look up a record field. Returns `None` for non-records.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Record(entries) => entries.get(key),
            _ => None,
        }
    }

    /// Whether this is the `Null` value.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Borrow as text, if this is a `Text` value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Borrow as an integer, if this is an `Int` value.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Borrow as a bool, if this is a `Bool` value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Bytes(bytes)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_values() -> Vec<Value> {
        vec![
            Value::Null,
            Value::Bool(true),
            Value::Int(-42),
            Value::Float(2.5),
            Value::Text("hello".to_string()),
            Value::Date(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).single().expect("valid date")),
            Value::Regex {
                pattern: "^a+b$".to_string(),
                flags: "i".to_string(),
            },
            Value::Bytes(vec![0, 1, 2, 255]),
            Value::List(vec![Value::Int(1), Value::Text("two".to_string())]),
            Value::Map(vec![
                (Value::Int(1), Value::Text("one".to_string())),
                (Value::Text("k".to_string()), Value::Null),
            ]),
            Value::record([("a", Value::Int(1)), ("b", Value::Bool(false))]),
        ]
    }

    #[test]
    fn test_serde_roundtrip_all_kinds() {
        for value in sample_values() {
            let json = serde_json::to_string(&value).expect("serialize");
            let decoded: Value = serde_json::from_str(&json).expect("deserialize");
            assert_eq!(value, decoded, "round-trip failed for {:?}", value);
        }
    }

    #[test]
    fn test_nested_roundtrip() {
        let value = Value::record([
            ("items", Value::List(sample_values())),
            ("meta", Value::record([("depth", Value::Int(2))])),
        ]);
        let json = serde_json::to_string(&value).expect("serialize");
        let decoded: Value = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(value, decoded);
    }

    #[test]
    fn test_record_lookup() {
        let v = Value::record([("x", Value::Int(7))]);
        assert_eq!(v.get("x"), Some(&Value::Int(7)));
        assert_eq!(v.get("y"), None);
        assert_eq!(Value::Int(1).get("x"), None);
    }

    #[test]
    fn test_accessors() {
        assert!(Value::Null.is_null());
        assert_eq!(Value::from("s").as_text(), Some("s"));
        assert_eq!(Value::from(3).as_int(), Some(3));
        assert_eq!(Value::from(true).as_bool(), Some(true));
        assert_eq!(Value::from(3).as_text(), None);
    }

    #[test]
    fn test_map_preserves_order() {
        let map = Value::Map(vec![
            (Value::Int(2), Value::Text("b".to_string())),
            (Value::Int(1), Value::Text("a".to_string())),
        ]);
        let json = serde_json::to_string(&map).expect("serialize");
        let decoded: Value = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(map, decoded);
    }
}
