//! graphify-core: Type descriptors, errors, lifecycle events, and
//! configuration shared by every graphify crate.
//!
//! - [`Describable`] turns a domain type into a structural schema fragment
//! - [`SchemaError`] / [`DescribeError`] cover registration-time failures
//! - [`Observer`] fans out schema lifecycle events
//! - [`GraphifyConfig`] loads store, migration, and exposure settings

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::GraphifyConfig;
pub use error::{DescribeError, SchemaError};
pub use events::{EventPayload, Observer, SchemaEvent};
pub use types::{
    describe, Describable, FieldDescriptor, FieldKind, FieldType, GeoPoint, IndexKind, ScalarKind,
    TypeDescriptor,
};
