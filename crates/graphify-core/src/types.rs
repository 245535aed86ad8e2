//! Structural type descriptors for graph schema declaration.
//!
//! A domain type becomes a node or edge payload by implementing
//! [`Describable`]: it hands back a [`TypeDescriptor`] listing its fields,
//! their semantic kinds, and any index hints. Field kinds for the common
//! Rust types are derived statically through [`FieldType`].

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DescribeError;

// ── Contract ─────────────────────────────────────────────────────

/// A domain type that can describe its own storage shape.
///
/// The sample value passed to [`describe`] is typically `Default::default()`;
/// implementations must not depend on field values.
pub trait Describable: 'static {
    fn describe(&self) -> TypeDescriptor;
}

/// Derive and validate the descriptor of `sample`.
pub fn describe<T: Describable>(sample: &T) -> Result<TypeDescriptor, DescribeError> {
    let descriptor = sample.describe();
    descriptor.validate()?;
    Ok(descriptor)
}

/// Maps a Rust field type to its store representation.
pub trait FieldType {
    fn kind() -> FieldKind;

    fn optional() -> bool {
        false
    }
}

// ── Kinds ────────────────────────────────────────────────────────

/// Scalar store representations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    String,
    /// Signed integer.
    Int,
    /// Non-negative integer.
    #[serde(rename = "uint")]
    UInt,
    Float,
    Bool,
    Timestamp,
    Json,
}

/// Semantic kind of a declared field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    Scalar { scalar: ScalarKind },
    /// A geospatial point.
    Geo,
    /// The key of a document in another node collection.
    Reference { target: String },
    /// An embedded object with its own structure.
    Nested { descriptor: TypeDescriptor },
    List { item: Box<FieldKind> },
    /// State that cannot be stored (closures, channels, handles).
    Opaque { rust_type: String },
}

impl FieldKind {
    pub fn scalar(scalar: ScalarKind) -> Self {
        Self::Scalar { scalar }
    }

    /// Find the first opaque kind, looking through lists and nested types.
    fn find_opaque(&self) -> Option<&str> {
        match self {
            Self::Opaque { rust_type } => Some(rust_type),
            Self::List { item } => item.find_opaque(),
            Self::Nested { descriptor } => descriptor
                .fields
                .iter()
                .find_map(|f| f.kind.find_opaque()),
            _ => None,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar { scalar } => write!(f, "{scalar:?}"),
            Self::Geo => write!(f, "Geo"),
            Self::Reference { target } => write!(f, "Reference({target})"),
            Self::Nested { descriptor } => write!(f, "Nested({})", descriptor.name),
            Self::List { item } => write!(f, "List({item})"),
            Self::Opaque { rust_type } => write!(f, "Opaque({rust_type})"),
        }
    }
}

/// Index kinds a field can request. Shared by hints and store metadata.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    Persistent,
    Unique,
    Geo,
}

impl IndexKind {
    fn applies_to(self, kind: &FieldKind) -> bool {
        match self {
            Self::Geo => matches!(kind, FieldKind::Geo),
            Self::Persistent | Self::Unique => {
                matches!(kind, FieldKind::Scalar { .. } | FieldKind::Reference { .. })
            }
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Persistent => write!(f, "persistent"),
            Self::Unique => write!(f, "unique"),
            Self::Geo => write!(f, "geo"),
        }
    }
}

// ── Descriptors ──────────────────────────────────────────────────

/// One declared field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    #[serde(default)]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<IndexKind>,
}

/// Structural description of a domain type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Add a field whose kind is derived from its Rust type.
    pub fn field<T: FieldType>(self, name: impl Into<String>) -> Self {
        self.push(name.into(), T::kind(), T::optional(), None)
    }

    /// Add a field with an index hint.
    pub fn indexed<T: FieldType>(self, name: impl Into<String>, index: IndexKind) -> Self {
        self.push(name.into(), T::kind(), T::optional(), Some(index))
    }

    /// Add a geospatial point field carrying a geo index hint.
    pub fn geo(self, name: impl Into<String>) -> Self {
        self.push(name.into(), FieldKind::Geo, false, Some(IndexKind::Geo))
    }

    /// Add a field holding the key of a document in `target`'s collection.
    pub fn reference(self, name: impl Into<String>, target: impl Into<String>) -> Self {
        let kind = FieldKind::Reference {
            target: target.into(),
        };
        self.push(name.into(), kind, false, None)
    }

    pub fn nested(self, name: impl Into<String>, descriptor: TypeDescriptor) -> Self {
        self.push(name.into(), FieldKind::Nested { descriptor }, false, None)
    }

    /// Add a field with an explicit kind.
    pub fn field_of(self, name: impl Into<String>, kind: FieldKind, optional: bool) -> Self {
        self.push(name.into(), kind, optional, None)
    }

    /// Declare state the type carries but the store cannot hold.
    /// Validation rejects descriptors containing opaque fields.
    pub fn opaque(self, name: impl Into<String>, rust_type: impl Into<String>) -> Self {
        let kind = FieldKind::Opaque {
            rust_type: rust_type.into(),
        };
        self.push(name.into(), kind, false, None)
    }

    fn push(
        mut self,
        name: String,
        kind: FieldKind,
        optional: bool,
        index: Option<IndexKind>,
    ) -> Self {
        self.fields.push(FieldDescriptor {
            name,
            kind,
            optional,
            index,
        });
        self
    }

    pub fn field_named(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields carrying an index hint, in declaration order.
    pub fn index_hints(&self) -> impl Iterator<Item = (&str, IndexKind)> {
        self.fields
            .iter()
            .filter_map(|f| f.index.map(|kind| (f.name.as_str(), kind)))
    }

    /// Check names, uniqueness, representability, and index hints.
    pub fn validate(&self) -> Result<(), DescribeError> {
        self.validate_inner(true)
    }

    fn validate_inner(&self, allow_hints: bool) -> Result<(), DescribeError> {
        if !is_identifier(&self.name) {
            return Err(DescribeError::InvalidName {
                name: self.name.clone(),
            });
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.starts_with('_') {
                return Err(DescribeError::ReservedField {
                    type_name: self.name.clone(),
                    field: field.name.clone(),
                });
            }
            if !is_identifier(&field.name) {
                return Err(DescribeError::InvalidName {
                    name: format!("{}.{}", self.name, field.name),
                });
            }
            if !seen.insert(field.name.as_str()) {
                return Err(DescribeError::DuplicateField {
                    type_name: self.name.clone(),
                    field: field.name.clone(),
                });
            }
            if let Some(rust_type) = field.kind.find_opaque() {
                return Err(DescribeError::UnsupportedKind {
                    type_name: self.name.clone(),
                    field: field.name.clone(),
                    rust_type: rust_type.to_string(),
                });
            }
            if let Some(hint) = field.index {
                // Hints on embedded objects would need dotted index paths.
                if !allow_hints || !hint.applies_to(&field.kind) {
                    return Err(DescribeError::IndexHintMismatch {
                        type_name: self.name.clone(),
                        field: field.name.clone(),
                        hint: hint.to_string(),
                        kind: field.kind.to_string(),
                    });
                }
            }
            if let FieldKind::Nested { descriptor } = &field.kind {
                descriptor.validate_inner(false)?;
            }
        }
        Ok(())
    }
}

/// `[A-Za-z][A-Za-z0-9_]*`. Names end up as collection names and labels.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ── Field types ──────────────────────────────────────────────────

/// A geospatial point (WGS84).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl FieldType for GeoPoint {
    fn kind() -> FieldKind {
        FieldKind::Geo
    }
}

macro_rules! scalar_field {
    ($kind:ident: $($ty:ty),+) => {
        $(
            impl FieldType for $ty {
                fn kind() -> FieldKind {
                    FieldKind::scalar(ScalarKind::$kind)
                }
            }
        )+
    };
}

scalar_field!(String: String);
scalar_field!(Int: i8, i16, i32, i64);
scalar_field!(UInt: u8, u16, u32, u64);
scalar_field!(Float: f32, f64);
scalar_field!(Bool: bool);
scalar_field!(Timestamp: DateTime<Utc>);
scalar_field!(Json: serde_json::Value);

impl<T: FieldType> FieldType for Option<T> {
    fn kind() -> FieldKind {
        T::kind()
    }

    fn optional() -> bool {
        true
    }
}

impl<T: FieldType> FieldType for Vec<T> {
    fn kind() -> FieldKind {
        FieldKind::List {
            item: Box::new(T::kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Library;

    impl Describable for Library {
        fn describe(&self) -> TypeDescriptor {
            TypeDescriptor::new("Library")
                .indexed::<String>("name", IndexKind::Unique)
                .geo("location")
                .field::<Option<String>>("address")
                .field::<Vec<String>>("tags")
        }
    }

    #[test]
    fn test_describe_derives_kinds() {
        let desc = describe(&Library).unwrap();
        assert_eq!(desc.name, "Library");
        assert_eq!(desc.fields.len(), 4);

        let address = desc.field_named("address").unwrap();
        assert!(address.optional);
        assert_eq!(address.kind, FieldKind::scalar(ScalarKind::String));

        let tags = desc.field_named("tags").unwrap();
        assert_eq!(
            tags.kind,
            FieldKind::List {
                item: Box::new(FieldKind::scalar(ScalarKind::String))
            }
        );
    }

    #[test]
    fn test_index_hints_in_declaration_order() {
        let desc = describe(&Library).unwrap();
        let hints: Vec<_> = desc.index_hints().collect();
        assert_eq!(
            hints,
            vec![("name", IndexKind::Unique), ("location", IndexKind::Geo)]
        );
    }

    #[test]
    fn test_opaque_field_is_unsupported() {
        let desc = TypeDescriptor::new("Client")
            .field::<String>("name")
            .opaque("on_change", "Box<dyn Fn()>");
        let err = desc.validate().unwrap_err();
        assert!(matches!(err, DescribeError::UnsupportedKind { ref field, .. } if field == "on_change"));
    }

    #[test]
    fn test_opaque_inside_list_and_nested_is_unsupported() {
        let list = TypeDescriptor::new("A").field_of(
            "handlers",
            FieldKind::List {
                item: Box::new(FieldKind::Opaque {
                    rust_type: "fn()".into(),
                }),
            },
            false,
        );
        assert!(matches!(
            list.validate(),
            Err(DescribeError::UnsupportedKind { .. })
        ));

        let inner = TypeDescriptor::new("Inner").opaque("tx", "mpsc::Sender<()>");
        let nested = TypeDescriptor::new("Outer").nested("inner", inner);
        assert!(matches!(
            nested.validate(),
            Err(DescribeError::UnsupportedKind { .. })
        ));
    }

    #[test]
    fn test_reserved_and_duplicate_fields() {
        let reserved = TypeDescriptor::new("Book").field::<String>("_key");
        assert!(matches!(
            reserved.validate(),
            Err(DescribeError::ReservedField { .. })
        ));

        let dup = TypeDescriptor::new("Book")
            .field::<String>("title")
            .field::<i64>("title");
        assert!(matches!(
            dup.validate(),
            Err(DescribeError::DuplicateField { .. })
        ));
    }

    #[test]
    fn test_invalid_names() {
        assert!(matches!(
            TypeDescriptor::new("my book").validate(),
            Err(DescribeError::InvalidName { .. })
        ));
        assert!(matches!(
            TypeDescriptor::new("Book").field::<String>("9lives").validate(),
            Err(DescribeError::InvalidName { .. })
        ));
        assert!(is_identifier("Book_v1"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn test_geo_hint_requires_geo_field() {
        let desc = TypeDescriptor::new("Library").indexed::<String>("location", IndexKind::Geo);
        assert!(matches!(
            desc.validate(),
            Err(DescribeError::IndexHintMismatch { .. })
        ));
    }

    #[test]
    fn test_hint_inside_nested_is_rejected() {
        let inner = TypeDescriptor::new("Address").geo("point");
        let desc = TypeDescriptor::new("Library").nested("address", inner);
        assert!(matches!(
            desc.validate(),
            Err(DescribeError::IndexHintMismatch { .. })
        ));
    }

    #[test]
    fn test_descriptor_serialization_shape() {
        let desc = TypeDescriptor::new("Book").reference("library", "Library");
        let json = serde_json::to_value(&desc).unwrap();
        assert_eq!(json["fields"][0]["kind"], "reference");
        assert_eq!(json["fields"][0]["target"], "Library");
    }
}
