//! Structured value union
//!
//! Model replies, blueprint structure and diagnostics are arbitrary nested
//! data. [`StructuredValue`] keeps them in a library-neutral shape; conversion
//! to and from `serde_json::Value` happens only at the edges.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Insertion-ordered map of structured values
pub type StructuredMap = IndexMap<String, StructuredValue>;

/// Tagged union over null / bool / number / string / list / map
#[derive(Debug, Clone, PartialEq, Default)]
pub enum StructuredValue {
    /// Absent value
    #[default]
    Null,
    /// Boolean
    Bool(bool),
    /// Number (integers are carried losslessly up to 2^53)
    Number(f64),
    /// UTF-8 string
    String(String),
    /// Ordered list
    List(Vec<StructuredValue>),
    /// Insertion-ordered map
    Map(StructuredMap),
}

impl StructuredValue {
    /// Empty map value
    #[inline]
    #[must_use]
    pub fn empty_map() -> Self {
        Self::Map(StructuredMap::new())
    }

    /// Build a map from key/value pairs
    #[must_use]
    pub fn map_from<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<StructuredValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Human-readable kind name, used in schema diagnostics
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    /// Check for null
    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Map lookup by key
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&StructuredValue> {
        match self {
            Self::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// Get value at path (dot notation, list indices allowed)
    #[must_use]
    pub fn path(&self, path: &str) -> Option<&StructuredValue> {
        let mut current = self;
        for segment in path.split('.') {
            current = match current {
                Self::Map(map) => map.get(segment)?,
                Self::List(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Insert into a map value; no-op for other kinds
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<StructuredValue>) {
        if let Self::Map(map) = self {
            map.insert(key.into(), value.into());
        }
    }

    /// String contents
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric contents
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Boolean contents
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// List contents
    #[must_use]
    pub fn as_list(&self) -> Option<&[StructuredValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Map contents
    #[must_use]
    pub fn as_map(&self) -> Option<&StructuredMap> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// String field of a map, trimmed; `None` when absent or blank
    #[must_use]
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(Self::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// List of non-blank strings under a map key
    #[must_use]
    pub fn str_list_field(&self, key: &str) -> Vec<String> {
        self.get(key)
            .and_then(Self::as_list)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Self::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Convert from a JSON value
    #[must_use]
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n.as_f64().unwrap_or_default()),
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from_json).collect()),
            Value::Object(map) => Self::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert into a JSON value
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => number_to_json(*n),
            Self::String(s) => Value::String(s.clone()),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn number_to_json(n: f64) -> Value {
    // Integral values serialize without a fractional part.
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Value::Number((n as i64).into())
    } else {
        serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

impl Serialize for StructuredValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for StructuredValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_json)
    }
}

impl From<Value> for StructuredValue {
    fn from(value: Value) -> Self {
        Self::from_json(value)
    }
}

impl From<&str> for StructuredValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for StructuredValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for StructuredValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for StructuredValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for StructuredValue {
    #[allow(clippy::cast_precision_loss)]
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<u32> for StructuredValue {
    fn from(value: u32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<usize> for StructuredValue {
    #[allow(clippy::cast_precision_loss)]
    fn from(value: usize) -> Self {
        Self::Number(value as f64)
    }
}

impl<T: Into<StructuredValue>> From<Vec<T>> for StructuredValue {
    fn from(value: Vec<T>) -> Self {
        Self::List(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<StructuredValue>> From<Option<T>> for StructuredValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl From<StructuredMap> for StructuredValue {
    fn from(value: StructuredMap) -> Self {
        Self::Map(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn json_conversion_preserves_shape() {
        let json = json!({
            "title": "Ashfall",
            "count": 3,
            "ratio": 0.5,
            "tags": ["a", "b"],
            "nested": {"ok": true, "none": null}
        });
        let value = StructuredValue::from_json(json.clone());
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn map_preserves_insertion_order() {
        let value = StructuredValue::map_from([("z", 1_i64), ("a", 2_i64)]);
        let keys: Vec<_> = value.as_map().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["z".to_string(), "a".to_string()]);
    }

    #[test]
    fn path_walks_maps_and_lists() {
        let value = StructuredValue::from_json(json!({
            "sections": [{"title": "One"}, {"title": "Two"}]
        }));
        assert_eq!(
            value.path("sections.1.title").and_then(StructuredValue::as_str),
            Some("Two")
        );
        assert!(value.path("sections.9.title").is_none());
        assert!(value.path("missing").is_none());
    }

    #[test]
    fn str_field_skips_blank_values() {
        let value = StructuredValue::map_from([("a", "  "), ("b", " text ")]);
        assert_eq!(value.str_field("a"), None);
        assert_eq!(value.str_field("b"), Some("text"));
    }

    #[test]
    fn serde_roundtrip_keeps_integers_integral() {
        let value = StructuredValue::map_from([("n", 42_i64)]);
        let text = serde_json::to_string(&value).unwrap();
        assert_eq!(text, r#"{"n":42}"#);
        let back: StructuredValue = serde_json::from_str(&text).unwrap();
        assert_eq!(back, value);
    }
}
