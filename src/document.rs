//! Document tree for generated artifacts.
//!
//! Generated configurations are assembled from typed pieces whose optional fields may be
//! absent. `Document` keeps that absence visible as [`Document::Undefined`], distinct from an
//! explicit `Null`, so the storage boundary can refuse values it cannot represent until the
//! tree has been sanitized.

use crate::error::StorageError;
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Error as _, Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::{Number, Value};
use std::collections::BTreeMap;

mod ser;

pub use ser::{DocumentSerializer, SerError};

/// A JSON-like tree that can also carry undefined values.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Document {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Document>),
    Object(BTreeMap<String, Document>),
}

impl Document {
    /// Convert any serializable value. `None` becomes `Undefined`, `()` becomes `Null`.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Document, StorageError> {
        value
            .serialize(DocumentSerializer)
            .map_err(|e| StorageError::Encode(e.to_string()))
    }

    /// Build an object from key/value pairs.
    pub fn object<K, I>(entries: I) -> Document
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Document)>,
    {
        Document::Object(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Document::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Document::Null)
    }

    /// True if any node at any depth is `Undefined`.
    pub fn contains_undefined(&self) -> bool {
        match self {
            Document::Undefined => true,
            Document::Array(items) => items.iter().any(Document::contains_undefined),
            Document::Object(map) => map.values().any(Document::contains_undefined),
            _ => false,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Document> {
        match self {
            Document::Object(map) => map.get(key),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Document> {
        match self {
            Document::Object(map) => map.get_mut(key),
            _ => None,
        }
    }

    /// Insert a key into an object. No-op on non-objects.
    pub fn insert(&mut self, key: impl Into<String>, value: Document) {
        if let Document::Object(map) = self {
            map.insert(key.into(), value);
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Document>> {
        match self {
            Document::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Document::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Document::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Document::Number(n) => n.as_u64(),
            _ => None,
        }
    }

    /// Convert into a storage-ready JSON value. Fails if any `Undefined` remains.
    pub fn to_json(&self) -> Result<Value, StorageError> {
        serde_json::to_value(self).map_err(|e| StorageError::Unrepresentable(e.to_string()))
    }
}

impl From<Value> for Document {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Document::Null,
            Value::Bool(b) => Document::Bool(b),
            Value::Number(n) => Document::Number(n),
            Value::String(s) => Document::String(s),
            Value::Array(items) => Document::Array(items.into_iter().map(Document::from).collect()),
            Value::Object(map) => {
                Document::Object(map.into_iter().map(|(k, v)| (k, Document::from(v))).collect())
            }
        }
    }
}

impl From<Option<Value>> for Document {
    fn from(value: Option<Value>) -> Self {
        value.map(Document::from).unwrap_or(Document::Undefined)
    }
}

impl From<&str> for Document {
    fn from(value: &str) -> Self {
        Document::String(value.to_string())
    }
}

impl From<String> for Document {
    fn from(value: String) -> Self {
        Document::String(value)
    }
}

impl From<bool> for Document {
    fn from(value: bool) -> Self {
        Document::Bool(value)
    }
}

impl From<u64> for Document {
    fn from(value: u64) -> Self {
        Document::Number(Number::from(value))
    }
}

impl From<f64> for Document {
    fn from(value: f64) -> Self {
        Number::from_f64(value)
            .map(Document::Number)
            .unwrap_or(Document::Null)
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Document::Undefined => Err(S::Error::custom(
                "undefined value cannot be represented in storage",
            )),
            Document::Null => serializer.serialize_unit(),
            Document::Bool(b) => serializer.serialize_bool(*b),
            Document::Number(n) => n.serialize(serializer),
            Document::String(s) => serializer.serialize_str(s),
            Document::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Document::Object(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Document::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use serde_json::json;

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Sample {
        name: String,
        budget: Option<u32>,
        owner: Option<String>,
        tags: Vec<Option<String>>,
        marker: (),
    }

    #[test]
    fn none_becomes_undefined_and_unit_becomes_null() {
        let doc = Document::from_serialize(&Sample {
            name: "x".into(),
            budget: None,
            owner: Some("ops".into()),
            tags: vec![Some("a".into()), None],
            marker: (),
        })
        .unwrap();

        assert_eq!(doc.get("name"), Some(&Document::from("x")));
        assert_eq!(doc.get("budget"), Some(&Document::Undefined));
        assert_eq!(doc.get("marker"), Some(&Document::Null));
        let tags = doc.get("tags").and_then(Document::as_array).unwrap();
        assert_eq!(tags[1], Document::Undefined);
        assert!(doc.contains_undefined());
    }

    #[test]
    fn undefined_is_refused_at_the_storage_boundary() {
        let doc = Document::object([("a", Document::Undefined)]);
        assert!(matches!(
            doc.to_json(),
            Err(StorageError::Unrepresentable(_))
        ));

        let clean = Document::object([("a", Document::Null)]);
        assert_eq!(clean.to_json().unwrap(), json!({ "a": null }));
    }

    #[test]
    fn json_values_convert_without_undefined() {
        let doc = Document::from(json!({ "a": [1, null, { "b": "c" }] }));
        assert!(!doc.contains_undefined());
        assert_eq!(doc.to_json().unwrap(), json!({ "a": [1, null, { "b": "c" }] }));
    }

    #[test]
    fn enums_serialize_like_serde_json() {
        #[derive(Serialize)]
        #[serde(rename_all = "snake_case")]
        enum Kind {
            Plain,
            Wrapped(u8),
        }
        assert_eq!(
            Document::from_serialize(&Kind::Plain).unwrap(),
            Document::from("plain")
        );
        assert_eq!(
            Document::from_serialize(&Kind::Wrapped(3)).unwrap(),
            Document::object([("wrapped", Document::from(3u64))])
        );
    }
}
