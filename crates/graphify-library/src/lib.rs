//! graphify-library: the library lending domain wired onto graphify.
//!
//! Declares `Book`, `Client`, `Library`, and the `Borrow` relation, and
//! the migration pipeline that gives `Library.location` a geo index.

pub mod domain;

use graphify_core::SchemaError;
use graphify_graph::GraphRegistry;
use graphify_store::{Access, GeoIndexHook, Migrator};

use domain::{Book, Borrow, Client, Library};

/// Register the library schema.
pub fn registry() -> Result<GraphRegistry, SchemaError> {
    let mut registry = GraphRegistry::new();
    registry.register_node(&Book::default())?;
    registry.register_node(&Client::default())?;
    registry.register_node(&Library::default())?;
    registry.register_edge(&Client::default(), &Book::default(), &Borrow::default())?;
    Ok(registry)
}

/// Migration pipeline for the library schema.
pub fn migrator(access: &Access) -> Migrator {
    Migrator::new(access).hook_for(&Library::default(), GeoIndexHook::new(["location"]))
}
