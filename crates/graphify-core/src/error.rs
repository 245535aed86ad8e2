use thiserror::Error;

/// Failure to derive a structural descriptor from a domain type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DescribeError {
    #[error("Unsupported kind on {type_name}.{field}: {rust_type} has no store representation")]
    UnsupportedKind {
        type_name: String,
        field: String,
        rust_type: String,
    },

    #[error("Invalid name {name:?}: expected an identifier ([A-Za-z][A-Za-z0-9_]*)")]
    InvalidName { name: String },

    #[error("Reserved field name on {type_name}: {field} (leading underscore is reserved for store keys)")]
    ReservedField { type_name: String, field: String },

    #[error("Duplicate field on {type_name}: {field}")]
    DuplicateField { type_name: String, field: String },

    #[error("Index hint {hint} does not apply to {type_name}.{field} of kind {kind}")]
    IndexHintMismatch {
        type_name: String,
        field: String,
        hint: String,
        kind: String,
    },
}

/// Registration-time schema errors. All of these are configuration
/// mistakes and abort startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Duplicate node type {name}: already registered by a different type")]
    DuplicateNodeType { name: String },

    #[error("Duplicate edge type {name} ({source_name} -> {target}): already registered with a different payload")]
    DuplicateEdgeType {
        name: String,
        source_name: String,
        target: String,
    },

    #[error("Unknown node type {type_name}: register it as a node before using it in an edge")]
    UnknownNodeType { type_name: String },

    #[error("Collection name {name} is already used by a {existing}")]
    CollectionNameConflict { name: String, existing: String },

    #[error(transparent)]
    Describe(#[from] DescribeError),
}
