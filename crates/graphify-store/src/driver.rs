//! The capability set graphify needs from a backing store.
//!
//! Drivers only have to list and create structure and read/write
//! documents. Every create operation is create-if-absent and reports
//! whether it did the creating.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use graphify_graph::{CollectionKind, IndexSpec, StoreMetadata};

use crate::error::DriverError;

/// Outcome of a create-if-absent operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Created {
    New,
    Existing,
}

impl Created {
    pub fn is_new(self) -> bool {
        self == Self::New
    }
}

/// A stored document: a key plus a JSON object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    #[serde(rename = "_key")]
    pub key: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            fields: Map::new(),
        }
    }

    /// Build from a JSON object. A `_key` member, if present, is ignored in
    /// favour of `key`.
    pub fn from_value(key: impl Into<String>, value: Value) -> Result<Self, DriverError> {
        let mut fields: Map<String, Value> = serde_json::from_value(value)?;
        fields.remove("_key");
        Ok(Self {
            key: key.into(),
            fields,
        })
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// Reference to a document: `collection/key`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct DocRef {
    pub collection: String,
    pub key: String,
}

impl DocRef {
    pub fn new(collection: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            key: key.into(),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let (collection, key) = s.split_once('/')?;
        if collection.is_empty() || key.is_empty() {
            return None;
        }
        Some(Self::new(collection, key))
    }
}

impl fmt::Display for DocRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.key)
    }
}

impl From<DocRef> for String {
    fn from(r: DocRef) -> Self {
        r.to_string()
    }
}

impl TryFrom<String> for DocRef {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s).ok_or_else(|| format!("invalid document reference: {s}"))
    }
}

/// A document in an edge collection, linking two documents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EdgeDocument {
    #[serde(rename = "_key")]
    pub key: String,
    #[serde(rename = "_from")]
    pub from: DocRef,
    #[serde(rename = "_to")]
    pub to: DocRef,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl EdgeDocument {
    pub fn new(key: impl Into<String>, from: DocRef, to: DocRef) -> Self {
        Self {
            key: key.into(),
            from,
            to,
            fields: Map::new(),
        }
    }
}

/// Backing store capability set.
///
/// Implementations must make `create_*` atomic create-if-absent so that
/// concurrent migrations produce each structure at most once.
#[async_trait]
pub trait StoreDriver: Send + Sync {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    async fn list_collections(&self) -> Result<StoreMetadata, DriverError>;

    /// Kind of one collection, or `None` if it does not exist. Drivers
    /// should override this with a lookup cheaper than a full listing.
    async fn collection_kind(&self, name: &str) -> Result<Option<CollectionKind>, DriverError> {
        Ok(self.list_collections().await?.collection(name).map(|c| c.kind))
    }

    async fn create_collection(&self, name: &str) -> Result<Created, DriverError>;

    /// Create an edge collection meant to link `from` documents to `to`
    /// documents.
    async fn create_edge_collection(
        &self,
        name: &str,
        from: &str,
        to: &str,
    ) -> Result<Created, DriverError>;

    async fn create_index(&self, collection: &str, index: &IndexSpec)
        -> Result<Created, DriverError>;

    async fn get_document(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<Document>, DriverError>;

    /// Insert or replace by key.
    async fn put_document(&self, collection: &str, document: &Document)
        -> Result<(), DriverError>;

    /// Returns false if no document had that key. Edges attached to the
    /// document are removed with it.
    async fn delete_document(&self, collection: &str, key: &str) -> Result<bool, DriverError>;

    /// Documents ordered by key.
    async fn list_documents(
        &self,
        collection: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Document>, DriverError>;

    /// Insert or replace an edge. Both endpoint documents must exist.
    async fn put_edge(&self, collection: &str, edge: &EdgeDocument) -> Result<(), DriverError>;

    /// Edges in `collection` leaving `from`, ordered by key.
    async fn outbound_edges(
        &self,
        collection: &str,
        from: &DocRef,
    ) -> Result<Vec<EdgeDocument>, DriverError>;
}
