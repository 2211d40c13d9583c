//! Payload sanitization
//!
//! File-valued fields never reach the ledger: they are replaced by a
//! placeholder naming the file before hashing or storage.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// An uploaded file attached to a business operation.
#[derive(Debug, Clone, PartialEq)]
pub struct FileUpload {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Json(Value),
    File(FileUpload),
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<FileUpload> for FieldValue {
    fn from(file: FileUpload) -> Self {
        Self::File(file)
    }
}

/// Describes what changed in a business operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPayload {
    fields: BTreeMap<String, FieldValue>,
}

impl RecordPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn file(self, name: impl Into<String>, file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.field(
            name,
            FileUpload {
                name: file_name.into(),
                bytes,
            },
        )
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Convert to the JSON object stored in the ledger.
    pub fn sanitize(self) -> Value {
        let mut sanitized = Map::new();
        for (name, value) in self.fields {
            let value = match value {
                FieldValue::Json(value) => value,
                FieldValue::File(file) => Value::String(file_placeholder(&file.name)),
            };
            sanitized.insert(name, value);
        }
        Value::Object(sanitized)
    }
}

/// A JSON object payload becomes one field per key; anything else is stored under `value`.
impl From<Value> for RecordPayload {
    fn from(value: Value) -> Self {
        let fields = match value {
            Value::Object(map) => map
                .into_iter()
                .map(|(k, v)| (k, FieldValue::Json(v)))
                .collect(),
            Value::Null => BTreeMap::new(),
            other => BTreeMap::from([("value".to_string(), FieldValue::Json(other))]),
        };
        Self { fields }
    }
}

pub fn file_placeholder(file_name: &str) -> String {
    format!("<file: {}>", file_name)
}
