//! `serde::Serializer` producing a [`Document`].

use super::Document;
use serde::ser::{self, Serialize};
use serde_json::Number;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug)]
pub struct SerError(String);

impl fmt::Display for SerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for SerError {}

impl ser::Error for SerError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        SerError(msg.to_string())
    }
}

/// Serializer whose output is a [`Document`].
pub struct DocumentSerializer;

impl ser::Serializer for DocumentSerializer {
    type Ok = Document;
    type Error = SerError;

    type SerializeSeq = SeqBuilder;
    type SerializeTuple = SeqBuilder;
    type SerializeTupleStruct = SeqBuilder;
    type SerializeTupleVariant = VariantSeqBuilder;
    type SerializeMap = MapBuilder;
    type SerializeStruct = MapBuilder;
    type SerializeStructVariant = VariantMapBuilder;

    fn serialize_bool(self, v: bool) -> Result<Document, SerError> {
        Ok(Document::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Document, SerError> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i16(self, v: i16) -> Result<Document, SerError> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i32(self, v: i32) -> Result<Document, SerError> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i64(self, v: i64) -> Result<Document, SerError> {
        Ok(Document::Number(Number::from(v)))
    }

    fn serialize_u8(self, v: u8) -> Result<Document, SerError> {
        self.serialize_u64(v as u64)
    }

    fn serialize_u16(self, v: u16) -> Result<Document, SerError> {
        self.serialize_u64(v as u64)
    }

    fn serialize_u32(self, v: u32) -> Result<Document, SerError> {
        self.serialize_u64(v as u64)
    }

    fn serialize_u64(self, v: u64) -> Result<Document, SerError> {
        Ok(Document::Number(Number::from(v)))
    }

    fn serialize_f32(self, v: f32) -> Result<Document, SerError> {
        self.serialize_f64(v as f64)
    }

    // Non-finite floats become null, matching serde_json.
    fn serialize_f64(self, v: f64) -> Result<Document, SerError> {
        Ok(Number::from_f64(v)
            .map(Document::Number)
            .unwrap_or(Document::Null))
    }

    fn serialize_char(self, v: char) -> Result<Document, SerError> {
        Ok(Document::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Document, SerError> {
        Ok(Document::String(v.to_string()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Document, SerError> {
        Ok(Document::Array(
            v.iter()
                .map(|b| Document::Number(Number::from(*b)))
                .collect(),
        ))
    }

    fn serialize_none(self) -> Result<Document, SerError> {
        Ok(Document::Undefined)
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<Document, SerError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Document, SerError> {
        Ok(Document::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Document, SerError> {
        Ok(Document::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<Document, SerError> {
        Ok(Document::String(variant.to_string()))
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Document, SerError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Document, SerError> {
        let mut map = BTreeMap::new();
        map.insert(variant.to_string(), value.serialize(DocumentSerializer)?);
        Ok(Document::Object(map))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqBuilder, SerError> {
        Ok(SeqBuilder {
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqBuilder, SerError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SeqBuilder, SerError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<VariantSeqBuilder, SerError> {
        Ok(VariantSeqBuilder {
            variant,
            items: Vec::with_capacity(len),
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<MapBuilder, SerError> {
        Ok(MapBuilder {
            entries: BTreeMap::new(),
            pending_key: None,
        })
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<MapBuilder, SerError> {
        self.serialize_map(Some(len))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<VariantMapBuilder, SerError> {
        Ok(VariantMapBuilder {
            variant,
            entries: BTreeMap::new(),
        })
    }
}

pub struct SeqBuilder {
    items: Vec<Document>,
}

impl ser::SerializeSeq for SeqBuilder {
    type Ok = Document;
    type Error = SerError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), SerError> {
        self.items.push(value.serialize(DocumentSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Document, SerError> {
        Ok(Document::Array(self.items))
    }
}

impl ser::SerializeTuple for SeqBuilder {
    type Ok = Document;
    type Error = SerError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), SerError> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Document, SerError> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SeqBuilder {
    type Ok = Document;
    type Error = SerError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), SerError> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Document, SerError> {
        ser::SerializeSeq::end(self)
    }
}

pub struct VariantSeqBuilder {
    variant: &'static str,
    items: Vec<Document>,
}

impl ser::SerializeTupleVariant for VariantSeqBuilder {
    type Ok = Document;
    type Error = SerError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), SerError> {
        self.items.push(value.serialize(DocumentSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Document, SerError> {
        let mut map = BTreeMap::new();
        map.insert(self.variant.to_string(), Document::Array(self.items));
        Ok(Document::Object(map))
    }
}

pub struct MapBuilder {
    entries: BTreeMap<String, Document>,
    pending_key: Option<String>,
}

fn key_to_string(key: Document) -> Result<String, SerError> {
    match key {
        Document::String(s) => Ok(s),
        Document::Number(n) => Ok(n.to_string()),
        Document::Bool(b) => Ok(b.to_string()),
        other => Err(SerError(format!("map key must be a string, got {:?}", other))),
    }
}

impl ser::SerializeMap for MapBuilder {
    type Ok = Document;
    type Error = SerError;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), SerError> {
        self.pending_key = Some(key_to_string(key.serialize(DocumentSerializer)?)?);
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), SerError> {
        let key = self
            .pending_key
            .take()
            .ok_or_else(|| SerError("serialize_value called before serialize_key".to_string()))?;
        self.entries.insert(key, value.serialize(DocumentSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Document, SerError> {
        Ok(Document::Object(self.entries))
    }
}

impl ser::SerializeStruct for MapBuilder {
    type Ok = Document;
    type Error = SerError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), SerError> {
        self.entries
            .insert(key.to_string(), value.serialize(DocumentSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Document, SerError> {
        Ok(Document::Object(self.entries))
    }
}

pub struct VariantMapBuilder {
    variant: &'static str,
    entries: BTreeMap<String, Document>,
}

impl ser::SerializeStructVariant for VariantMapBuilder {
    type Ok = Document;
    type Error = SerError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), SerError> {
        self.entries
            .insert(key.to_string(), value.serialize(DocumentSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Document, SerError> {
        let mut map = BTreeMap::new();
        map.insert(self.variant.to_string(), Document::Object(self.entries));
        Ok(Document::Object(map))
    }
}
