//! Typed container for the dynamic values carried by a record.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single value in a record's payload or metadata side channel.
///
/// Records are schema-less, so every value carries its own type. Booleans are
/// kept apart from numbers: `Bool(true)` is never treated as `1`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Missing or explicit null value.
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed integer value.
    Integer(i64),
    /// Floating-point value.
    Float(f64),
    /// UTF-8 string value.
    String(String),
    /// Ordered list of values.
    Array(Vec<FieldValue>),
    /// Nested key/value document.
    Object(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    /// Returns `true` for `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Returns `true` for `Null` or an empty string.
    ///
    /// This is the notion of "missing" used by completeness scoring,
    /// null removal and schema inference.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::String(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Returns `true` for integers and floats.
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldValue::Integer(_) | FieldValue::Float(_))
    }

    /// Returns the numeric value as `f64`, if this is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the integer value, if this is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string slice, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the boolean value, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the list elements, if this is an array.
    pub fn as_array(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the nested map, if this is an object.
    pub fn as_object(&self) -> Option<&BTreeMap<String, FieldValue>> {
        match self {
            FieldValue::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Short name of the observed value kind.
    ///
    /// Schema inference builds its type histogram from these names.
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "bool",
            FieldValue::Integer(_) => "int",
            FieldValue::Float(_) => "float",
            FieldValue::String(_) => "str",
            FieldValue::Array(_) => "list",
            FieldValue::Object(_) => "dict",
        }
    }

    /// Canonical JSON rendering, stable for equal values.
    ///
    /// Object keys are already sorted because objects are `BTreeMap`s.
    pub fn canonical_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.to_string())
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => write!(f, "null"),
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Integer(v) => write!(f, "{v}"),
            FieldValue::Float(v) => {
                if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e16 {
                    write!(f, "{v:.1}")
                } else {
                    write!(f, "{v}")
                }
            }
            FieldValue::String(s) => write!(f, "{s}"),
            FieldValue::Array(_) | FieldValue::Object(_) => {
                let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
                write!(f, "{json}")
            }
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Integer(value.into())
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::Integer(value.into())
    }
}

impl From<usize> for FieldValue {
    fn from(value: usize) -> Self {
        i64::try_from(value)
            .map(FieldValue::Integer)
            .unwrap_or(FieldValue::Float(value as f64))
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl From<Vec<FieldValue>> for FieldValue {
    fn from(value: Vec<FieldValue>) -> Self {
        FieldValue::Array(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(value: Vec<String>) -> Self {
        FieldValue::Array(value.into_iter().map(FieldValue::String).collect())
    }
}

impl From<BTreeMap<String, FieldValue>> for FieldValue {
    fn from(value: BTreeMap<String, FieldValue>) -> Self {
        FieldValue::Object(value)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::Integer(i),
                None => n.as_f64().map(FieldValue::Float).unwrap_or(FieldValue::Null),
            },
            Value::String(s) => FieldValue::String(s),
            Value::Array(items) => FieldValue::Array(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => {
                FieldValue::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<FieldValue> for serde_json::Value {
    fn from(value: FieldValue) -> Self {
        use serde_json::Value;
        match value {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(b) => Value::Bool(b),
            FieldValue::Integer(i) => Value::from(i),
            FieldValue::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::String(s) => Value::String(s),
            FieldValue::Array(items) => Value::Array(items.into_iter().map(Into::into).collect()),
            FieldValue::Object(map) => {
                Value::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_booleans_are_not_numeric() {
        assert!(!FieldValue::Bool(true).is_numeric());
        assert_eq!(FieldValue::Bool(true).as_f64(), None);
        assert!(FieldValue::Integer(3).is_numeric());
        assert_eq!(FieldValue::Integer(3).as_f64(), Some(3.0));
    }

    #[test]
    fn test_empty_string_counts_as_empty() {
        assert!(FieldValue::Null.is_empty());
        assert!(FieldValue::from("").is_empty());
        assert!(!FieldValue::from(" ").is_empty());
        assert!(!FieldValue::Integer(0).is_empty());
    }

    #[test]
    fn test_from_json_keeps_integer_and_float_apart() {
        let value: FieldValue = json!({"a": 1, "b": 1.5, "c": [true, null], "d": "x"}).into();
        let map = value.as_object().unwrap();
        assert_eq!(map["a"], FieldValue::Integer(1));
        assert_eq!(map["b"], FieldValue::Float(1.5));
        assert_eq!(
            map["c"],
            FieldValue::Array(vec![FieldValue::Bool(true), FieldValue::Null])
        );
        assert_eq!(map["d"].kind(), "str");
    }

    #[test]
    fn test_untagged_deserialization() {
        let value: FieldValue =
            serde_json::from_str(r#"[1, 2.0, "a", null, {"k": false}]"#).unwrap();
        let items = value.as_array().unwrap();
        assert_eq!(items[0], FieldValue::Integer(1));
        assert_eq!(items[1], FieldValue::Float(2.0));
        assert_eq!(items[3], FieldValue::Null);
        assert_eq!(items[4].kind(), "dict");
    }

    #[test]
    fn test_display() {
        assert_eq!(FieldValue::Float(2.0).to_string(), "2.0");
        assert_eq!(FieldValue::Float(2.5).to_string(), "2.5");
        assert_eq!(FieldValue::Integer(-4).to_string(), "-4");
        assert_eq!(FieldValue::from("east").to_string(), "east");
        assert_eq!(
            FieldValue::Array(vec![1.into(), "a".into()]).to_string(),
            r#"[1,"a"]"#
        );
    }

    #[test]
    fn test_canonical_json_distinguishes_int_and_float() {
        assert_ne!(
            FieldValue::Integer(1).canonical_json(),
            FieldValue::Float(1.0).canonical_json()
        );
    }
}
