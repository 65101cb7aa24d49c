//! Dynamic document field value.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Key of the single-entry map that carries bytes in human-readable
/// formats such as JSON.
pub const BINARY_KEY: &str = "$binary";

/// A document field value.
///
/// Equality is structural: two values are equal when they have the same
/// variant and equal contents. `Integer(1)` and `Float(1.0)` are distinct.
///
/// Binary formats carry `Bytes` natively. Human-readable formats write
/// them as `{"$binary": "<base64>"}`, and a map of exactly that shape
/// reads back as `Bytes`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed 64-bit integer.
    Integer(i64),
    /// 64-bit float.
    Float(f64),
    /// UTF-8 text.
    Text(String),
    /// Byte string.
    Bytes(Vec<u8>),
    /// Ordered list of values.
    Array(Vec<Value>),
    /// Nested object with text keys.
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Returns true for the values a selector treats as "no selector":
    /// null, false, zero, NaN and the empty string.
    pub fn is_falsy(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(b) => !b,
            Value::Integer(n) => *n == 0,
            Value::Float(f) => *f == 0.0 || f.is_nan(),
            Value::Text(s) => s.is_empty(),
            Value::Bytes(_) | Value::Array(_) | Value::Map(_) => false,
        }
    }

    /// Short name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    /// Get this value as text, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as a map, if it is one.
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Look up a key in this map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|m| m.get(key))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Array(v)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(m: BTreeMap<String, Value>) -> Self {
        Value::Map(m)
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Value::Null
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Integer(n) => serializer.serialize_i64(*n),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Bytes(b) if serializer.is_human_readable() => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(BINARY_KEY, &STANDARD.encode(b))?;
                map.end()
            }
            Value::Bytes(b) => serializer.serialize_bytes(b),
            Value::Array(items) => serializer.collect_seq(items),
            Value::Map(map) => serializer.collect_map(map),
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a document value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        Value::deserialize(deserializer)
    }

    fn visit_bool<E: de::Error>(self, b: bool) -> Result<Value, E> {
        Ok(Value::Bool(b))
    }

    fn visit_i64<E: de::Error>(self, n: i64) -> Result<Value, E> {
        Ok(Value::Integer(n))
    }

    fn visit_u64<E: de::Error>(self, n: u64) -> Result<Value, E> {
        // Integers beyond i64 are kept as floats rather than rejected.
        Ok(i64::try_from(n).map_or(Value::Float(n as f64), Value::Integer))
    }

    fn visit_f64<E: de::Error>(self, f: f64) -> Result<Value, E> {
        Ok(Value::Float(f))
    }

    fn visit_str<E: de::Error>(self, s: &str) -> Result<Value, E> {
        Ok(Value::Text(s.to_string()))
    }

    fn visit_string<E: de::Error>(self, s: String) -> Result<Value, E> {
        Ok(Value::Text(s))
    }

    fn visit_bytes<E: de::Error>(self, b: &[u8]) -> Result<Value, E> {
        Ok(Value::Bytes(b.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, b: Vec<u8>) -> Result<Value, E> {
        Ok(Value::Bytes(b))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Value::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Value, A::Error> {
        let mut map = BTreeMap::new();
        while let Some((key, value)) = access.next_entry::<String, Value>()? {
            map.insert(key, value);
        }
        if let Some(bytes) = tagged_bytes(&map) {
            return Ok(Value::Bytes(bytes));
        }
        Ok(Value::Map(map))
    }
}

/// Decodes a `{"$binary": "<base64>"}` map. Anything else, including
/// text that is not valid base64, stays a map.
fn tagged_bytes(map: &BTreeMap<String, Value>) -> Option<Vec<u8>> {
    if map.len() != 1 {
        return None;
    }
    let encoded = map.get(BINARY_KEY)?.as_text()?;
    STANDARD.decode(encoded).ok()
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falsy_values() {
        assert!(Value::Null.is_falsy());
        assert!(Value::Bool(false).is_falsy());
        assert!(Value::Integer(0).is_falsy());
        assert!(Value::Float(0.0).is_falsy());
        assert!(Value::Float(f64::NAN).is_falsy());
        assert!(Value::Text(String::new()).is_falsy());

        assert!(!Value::Bool(true).is_falsy());
        assert!(!Value::Integer(7).is_falsy());
        assert!(!Value::Text("x".into()).is_falsy());
        assert!(!Value::Array(vec![]).is_falsy());
        assert!(!Value::Map(BTreeMap::new()).is_falsy());
    }

    #[test]
    fn integer_and_float_are_distinct() {
        assert_ne!(Value::Integer(1), Value::Float(1.0));
    }

    #[test]
    fn json_decoding() {
        let value: Value =
            serde_json::from_str(r#"{"name":"Ada","age":36,"score":1.5,"tags":["a"],"x":null}"#)
                .unwrap();

        assert_eq!(value.get("name"), Some(&Value::Text("Ada".into())));
        assert_eq!(value.get("age"), Some(&Value::Integer(36)));
        assert_eq!(value.get("score"), Some(&Value::Float(1.5)));
        assert_eq!(
            value.get("tags"),
            Some(&Value::Array(vec![Value::Text("a".into())]))
        );
        assert_eq!(value.get("x"), Some(&Value::Null));
    }

    #[test]
    fn large_unsigned_becomes_float() {
        let value: Value = serde_json::from_str("18446744073709551615").unwrap();
        assert!(matches!(value, Value::Float(_)));
    }

    #[test]
    fn json_encoding_is_plain() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), Value::Integer(1));
        map.insert("b".to_string(), Value::Bool(true));
        let json = serde_json::to_string(&Value::Map(map)).unwrap();
        assert_eq!(json, r#"{"a":1,"b":true}"#);
    }

    #[test]
    fn bytes_survive_json() {
        let value = Value::Bytes(vec![1, 2, 3]);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"$binary":"AQID"}"#);
        assert_eq!(serde_json::from_str::<Value>(&json).unwrap(), value);

        let nested = Value::Array(vec![Value::Bytes(Vec::new()), Value::from("x")]);
        let json = serde_json::to_string(&nested).unwrap();
        assert_eq!(serde_json::from_str::<Value>(&json).unwrap(), nested);
    }

    #[test]
    fn binary_lookalikes_stay_maps() {
        let not_base64: Value = serde_json::from_str(r#"{"$binary":"not base64!"}"#).unwrap();
        assert!(matches!(not_base64, Value::Map(_)));

        let extra_key: Value = serde_json::from_str(r#"{"$binary":"AQID","x":1}"#).unwrap();
        assert_eq!(extra_key.get("x"), Some(&Value::Integer(1)));
    }
}
