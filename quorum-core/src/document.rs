use std::fmt::Display;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::Query;

/// Returned when a document's fields cannot be deserialized into a typed
/// record.
#[derive(Debug, Error)]
#[error("malformed document at {path}: {source}")]
pub struct DecodeError {
    pub path: String,
    #[source]
    pub source: serde_json::Error,
}

/// A reference to a collection of documents.
///
/// Paths alternate collection and document segments, so a collection path
/// always has an odd number of segments: `rooms` is a top-level collection,
/// `rooms/abc/members` is a subcollection under document `abc`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionRef {
    path: String,
}

impl CollectionRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// Returns a reference to a document within this collection.
    pub fn doc(&self, id: impl Into<String>) -> DocumentRef {
        DocumentRef {
            collection: self.clone(),
            id: id.into(),
        }
    }

    /// Returns a query over this collection, ready for further narrowing.
    pub fn query(&self) -> Query {
        Query::collection(&self.path)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The collection's own name, without the path leading up to it.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// The id of the document this collection is nested under, if any.
    pub fn parent_document_id(&self) -> Option<&str> {
        self.path.split('/').rev().nth(1)
    }
}

impl Display for CollectionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path)
    }
}

/// A reference to a single document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentRef {
    collection: CollectionRef,
    id: String,
}

impl DocumentRef {
    pub fn new(collection: CollectionRef, id: impl Into<String>) -> Self {
        Self {
            collection,
            id: id.into(),
        }
    }

    pub fn collection(&self) -> &CollectionRef {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The full slash-joined path of this document.
    pub fn path(&self) -> String {
        format!("{}/{}", self.collection.path(), self.id)
    }
}

impl Display for DocumentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// A schemaless document as it exists in the store.
///
/// Documents carry the path of the collection they live in, since group
/// queries return documents from many parents at once and callers need to
/// know where each one came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    id: String,
    collection: String,
    fields: Map<String, Value>,
}

impl Document {
    pub fn new(
        id: impl Into<String>,
        collection: impl Into<String>,
        fields: Map<String, Value>,
    ) -> Self {
        Self {
            id: id.into(),
            collection: collection.into(),
            fields,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The path of the collection this document belongs to.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The id of the document this one is nested under, if any.
    pub fn parent_document_id(&self) -> Option<&str> {
        self.collection.split('/').rev().nth(1)
    }

    pub fn path(&self) -> String {
        format!("{}/{}", self.collection, self.id)
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Deserializes the document into a typed record.
    ///
    /// The document id is injected under an `id` key when the fields don't
    /// already carry one, so record types can declare a defaulted `id` field
    /// and have it populated from the document's identity.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        let mut fields = self.fields.clone();

        if !fields.contains_key("id") {
            fields.insert("id".to_string(), Value::String(self.id.clone()));
        }

        serde_json::from_value(Value::Object(fields)).map_err(|source| DecodeError {
            path: self.path(),
            source,
        })
    }
}
