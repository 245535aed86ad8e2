//! Error types for the graphify-store crate.

use graphify_core::SchemaError;
use graphify_graph::{CollectionKind, MigrationAction};
use thiserror::Error;

use crate::cancel::Cancelled;

/// Errors raised by a [`StoreDriver`](crate::StoreDriver).
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Store connection error: {0}")]
    Connection(String),

    #[error("Neo4j query error: {0}")]
    Neo4j(#[from] neo4rs::Error),

    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    #[error("Collection {name} already exists as a {existing:?} collection")]
    KindMismatch {
        name: String,
        existing: CollectionKind,
    },

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Conflict on {collection}: {reason}")]
    Conflict { collection: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to decode store row: {0}")]
    Decode(String),
}

impl DriverError {
    /// Transient failures worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Neo4j(_))
    }
}

/// Errors from the access layer and migration.
#[derive(Error, Debug)]
pub enum AccessError {
    #[error("Collection unavailable: {collection}")]
    CollectionUnavailable { collection: String },

    #[error("Migration action '{action}' failed after {applied} applied action(s): {source}")]
    ActionFailed {
        action: MigrationAction,
        applied: usize,
        #[source]
        source: DriverError,
    },

    #[error("Collection hook on {collection} failed: {source}")]
    Hook {
        collection: String,
        #[source]
        source: Box<AccessError>,
    },

    #[error("Store error: {0}")]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Operation cancelled")]
    Cancelled,
}

impl From<Cancelled> for AccessError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

impl AccessError {
    /// Whether re-running the same operation can succeed. Migration
    /// failures are retryable because every action is create-if-absent.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::CollectionUnavailable { .. } | Self::ActionFailed { .. } => true,
            Self::Driver(e) => e.is_transient(),
            Self::Hook { source, .. } => source.is_retryable(),
            Self::Schema(_) | Self::Cancelled => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AccessError>;
