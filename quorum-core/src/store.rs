use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::{util, CollectionRef, Document, DocumentRef, Query, Subscription};

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by the document store.
///
/// Plain write failures and live query failures are distinct variants
/// because callers treat them differently: a failed write rolls local
/// state back, a failed live query tears the whole binding down.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("{path} does not exist")]
    NotFound { path: String },

    #[error("write to {path} rejected: {reason}")]
    Rejected { path: String, reason: String },

    #[error("live query on {target} failed: {reason}")]
    Subscription { target: String, reason: String },

    #[error("store transport failure: {0}")]
    Transport(String),
}

/// A single field mutation inside an [Update].
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    /// Replaces the field with the given value.
    Set(Value),
    /// Appends each element that is not already present, treating the field
    /// as a set. A missing or non-array field becomes an empty array first.
    ArrayUnion(Vec<Value>),
    /// Adds to a numeric field. A missing or non-numeric field counts as
    /// zero.
    Increment(i64),
}

/// A batch of field mutations applied to one document as a single write.
///
/// Every operation in an update commits or fails together. Fields that
/// must change in lockstep belong in the same update, which is the only
/// atomicity the store offers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    ops: Vec<(String, FieldOp)>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: Value) -> Self {
        self.ops.push((field.into(), FieldOp::Set(value)));
        self
    }

    pub fn array_union(mut self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.ops.push((field.into(), FieldOp::ArrayUnion(values)));
        self
    }

    pub fn increment(mut self, field: impl Into<String>, by: i64) -> Self {
        self.ops.push((field.into(), FieldOp::Increment(by)));
        self
    }

    pub fn ops(&self) -> &[(String, FieldOp)] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// The persistence seam of the system.
///
/// Implementations provide single-document reads and writes plus
/// declarative queries, both one-shot and live. A write touches exactly
/// one document and is atomic within it. There are no multi-document
/// transactions.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Reads a single document. A missing document is `None`, not an error.
    async fn get(&self, doc: &DocumentRef) -> StoreResult<Option<Document>>;

    /// Creates or fully replaces a document. `fields` must be a JSON
    /// object, anything else is rejected.
    async fn set(&self, doc: &DocumentRef, fields: Value) -> StoreResult<()>;

    /// Applies field operations to an existing document as one atomic
    /// write. Updating a document that does not exist is an error.
    async fn update(&self, doc: &DocumentRef, update: Update) -> StoreResult<()>;

    /// Deletes a document. Documents nested under it are not touched.
    async fn delete(&self, doc: &DocumentRef) -> StoreResult<()>;

    /// Runs a query once and returns the matching documents.
    async fn fetch(&self, query: &Query) -> StoreResult<Vec<Document>>;

    /// Opens a live query. The subscription immediately yields the current
    /// result set, then a fresh full snapshot after every relevant commit.
    /// Failures are delivered through the subscription itself.
    fn watch(&self, query: &Query) -> Subscription;

    /// Creates a document under a generated id and returns its reference.
    async fn add(&self, collection: &CollectionRef, fields: Value) -> StoreResult<DocumentRef> {
        let doc = collection.doc(util::random_document_id());

        self.set(&doc, fields).await?;
        Ok(doc)
    }
}
