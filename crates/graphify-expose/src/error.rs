//! Error types for the graphify-expose crate.

use graphify_core::SchemaError;
use graphify_store::{AccessError, DriverError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExposeError {
    #[error("Not exposed: {name}")]
    NotExposed { name: String },

    #[error("Invalid {resource} document: {reason}")]
    InvalidDocument { resource: String, reason: String },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Access(#[from] AccessError),
}

impl ExposeError {
    pub(crate) fn invalid(resource: &str, reason: impl Into<String>) -> Self {
        Self::InvalidDocument {
            resource: resource.to_string(),
            reason: reason.into(),
        }
    }

    /// Errors caused by the request rather than the store.
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::NotExposed { .. } | Self::InvalidDocument { .. } => true,
            Self::Access(AccessError::Driver(
                DriverError::DocumentNotFound(_) | DriverError::Conflict { .. },
            )) => true,
            Self::Schema(_) | Self::Access(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ExposeError>;
