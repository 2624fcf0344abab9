//! Contract between the chat core and the document store that backs it.
//!
//! The store is a collection-oriented document database: every document
//! lives in a named collection (`users`, `chats`, `chats/<id>/messages`, ...)
//! and is a JSON object addressed by a string id. The core only ever talks
//! to a store through [`RemoteStore`], so managed backends and the local
//! implementations in `chat_store` are interchangeable.

mod patch;
mod query;

pub use patch::{apply_increment, get_path, set_path, Patch, PatchValue};
pub use query::{compare_values, Direction, Filter, OrderBy, Query};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;

/// Field map of a stored document.
pub type Fields = Map<String, Value>;

/// A document as returned by the store.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Look up a field by dotted path (`unreadCounts.alice`).
    pub fn get(&self, path: &str) -> Option<&Value> {
        get_path(&self.fields, path)
    }

    /// Decode the document into a typed record. The document id is exposed
    /// to the target type as an `id` field.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let mut map = self.fields.clone();
        map.insert("id".into(), Value::String(self.id.clone()));
        Ok(serde_json::from_value(Value::Object(map))?)
    }

    /// Whether every filter matches this document.
    pub fn matches(&self, filters: &[Filter]) -> bool {
        filters.iter().all(|f| f.matches(&self.fields))
    }
}

/// Errors produced by a store implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The addressed document does not exist.
    #[error("document {collection}/{id} not found")]
    NotFound { collection: String, id: String },

    /// An increment targeted a field holding a non-numeric value.
    #[error("field `{field}` of {collection}/{id} is not numeric")]
    NotNumeric {
        collection: String,
        id: String,
        field: String,
    },

    /// A stored document could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The backend could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Any other backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(collection: &str, id: &str) -> Self {
        Self::NotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Convenience alias used by store implementations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Kind of change delivered on a subscription.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// The document started matching the subscription.
    Added,
    /// A matching document changed and still matches.
    Modified,
    /// The document stopped matching the subscription.
    Removed,
}

/// A single change delivered to a subscriber.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub collection: String,
    pub document: Document,
}

/// Receiving end of a live subscription.
pub struct Subscription {
    rx: UnboundedReceiver<ChangeEvent>,
}

impl Subscription {
    pub fn new(rx: UnboundedReceiver<ChangeEvent>) -> Self {
        Self { rx }
    }

    /// Wait for the next change. Returns `None` once the store is gone.
    /// Safe to use as a `tokio::select!` branch.
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.rx.recv().await
    }

    /// Take an already delivered change without waiting.
    pub fn try_next(&mut self) -> Option<ChangeEvent> {
        self.rx.try_recv().ok()
    }
}

/// Operations the chat core needs from a document store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Return the documents of `collection` selected by `query`.
    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>>;

    /// Fetch one document.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Insert a document under a store-generated id.
    async fn add(&self, collection: &str, patch: Patch) -> Result<String>;

    /// Insert a document under `id` unless one already exists.
    /// Returns `false` when the document was already present.
    async fn create(&self, collection: &str, id: &str, patch: Patch) -> Result<bool>;

    /// Merge `patch` into an existing document.
    async fn update(&self, collection: &str, id: &str, patch: Patch) -> Result<()>;

    /// Atomically add `delta` to a numeric field. A missing field counts as 0.
    async fn increment(&self, collection: &str, id: &str, field: &str, delta: i64) -> Result<()>;

    /// Subscribe to changes of documents in `collection` matching `filters`.
    fn subscribe(&self, collection: &str, filters: Vec<Filter>) -> Subscription;
}
