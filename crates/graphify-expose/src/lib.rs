//! graphify-expose: derive an addressable API surface from a registry.
//!
//! [`Exposure`] turns each exposed node type into a [`Resource`]
//! (get / list / put / delete) and each edge type between exposed nodes
//! into a [`Relation`] (connect / traverse). [`Catalog`] is the
//! serializable summary a serving layer routes from.

pub mod catalog;
pub mod error;
pub mod exposure;
pub mod filter;
pub mod validate;

pub use catalog::{Catalog, Operation, RelationEntry, ResourceEntry};
pub use error::{ExposeError, Result};
pub use exposure::{Exposure, Relation, Resource};
pub use filter::ExposeFilter;
