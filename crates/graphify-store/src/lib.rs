//! graphify-store: store drivers, the access layer, and auto-migration.
//!
//! Every store interaction flows through [`Access`], which wraps a
//! [`StoreDriver`] and enforces cancellation and handle leases.
//! [`Migrator`] diffs a registry against live metadata and applies the
//! resulting plan with create-if-absent semantics, so concurrent or
//! repeated runs converge on the same structure.

pub mod access;
pub mod cancel;
pub mod driver;
pub mod error;
pub mod memory;
pub mod migrate;
pub mod neo4j;

pub use access::{Access, CollectionHandle};
pub use cancel::{Cancel, Cancelled};
pub use driver::{Created, DocRef, Document, EdgeDocument, StoreDriver};
pub use error::{AccessError, DriverError, Result};
pub use memory::{FaultPoint, MemoryStore};
pub use migrate::{CollectionHook, GeoIndexHook, MigrationReport, Migrator};
pub use neo4j::{Neo4jConfig, Neo4jStore};
