//! graphify-graph: the typed graph schema registry and migration planner.
//!
//! Callers declare node and edge types into a [`GraphRegistry`]. The
//! planner diffs the registry against live [`StoreMetadata`] and returns
//! a deterministic [`MigrationPlan`] of create-if-absent actions. Nothing
//! in this crate touches a store.

pub mod metadata;
pub mod plan;
pub mod registry;

pub use metadata::{CollectionKind, CollectionMeta, IndexSpec, StoreMetadata};
pub use plan::{plan, MigrationAction, MigrationPlan};
pub use registry::{EdgeType, GraphRegistry, NodeType};
