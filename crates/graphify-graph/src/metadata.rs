//! Live store structure as seen by the migration planner.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use graphify_core::IndexKind;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum CollectionKind {
    Document,
    Edge,
}

/// An index over one or more fields of a collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexSpec {
    pub kind: IndexKind,
    pub fields: Vec<String>,
}

impl IndexSpec {
    pub fn new(kind: IndexKind, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            kind,
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn geo(field: impl Into<String>) -> Self {
        Self::new(IndexKind::Geo, [field])
    }

    /// Stable store-side name for this index on `collection`.
    pub fn name_for(&self, collection: &str) -> String {
        format!("gfy_{}_{}_{}", collection, self.fields.join("_"), self.kind)
    }
}

impl fmt::Display for IndexSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} index ({})", self.kind, self.fields.join(", "))
    }
}

/// One collection and its indexes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollectionMeta {
    pub kind: CollectionKind,
    #[serde(default)]
    pub indexes: BTreeSet<IndexSpec>,
}

/// Collections, edge collections, and indexes currently in the store.
///
/// Always fetched fresh from the store; never cached across migration runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreMetadata {
    pub collections: BTreeMap<String, CollectionMeta>,
}

impl StoreMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collection(&self, name: &str) -> Option<&CollectionMeta> {
        self.collections.get(name)
    }

    /// True if `name` exists with the given kind.
    pub fn has(&self, name: &str, kind: CollectionKind) -> bool {
        self.collections.get(name).is_some_and(|c| c.kind == kind)
    }

    pub fn has_index(&self, collection: &str, index: &IndexSpec) -> bool {
        self.collections
            .get(collection)
            .is_some_and(|c| c.indexes.contains(index))
    }

    /// Record a collection. Existing entries keep their indexes.
    pub fn add_collection(&mut self, name: impl Into<String>, kind: CollectionKind) {
        self.collections
            .entry(name.into())
            .or_insert_with(|| CollectionMeta {
                kind,
                indexes: BTreeSet::new(),
            });
    }

    /// Record an index. Returns false if the collection is unknown.
    pub fn add_index(&mut self, collection: &str, index: IndexSpec) -> bool {
        match self.collections.get_mut(collection) {
            Some(meta) => {
                meta.indexes.insert(index);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    pub fn index_count(&self) -> usize {
        self.collections.values().map(|c| c.indexes.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_collection_keeps_indexes() {
        let mut meta = StoreMetadata::new();
        meta.add_collection("Library", CollectionKind::Document);
        assert!(meta.add_index("Library", IndexSpec::geo("location")));
        meta.add_collection("Library", CollectionKind::Document);

        assert!(meta.has("Library", CollectionKind::Document));
        assert!(!meta.has("Library", CollectionKind::Edge));
        assert!(meta.has_index("Library", &IndexSpec::geo("location")));
        assert_eq!(meta.index_count(), 1);
    }

    #[test]
    fn test_add_index_on_missing_collection() {
        let mut meta = StoreMetadata::new();
        assert!(!meta.add_index("Library", IndexSpec::geo("location")));
        assert!(meta.is_empty());
    }

    #[test]
    fn test_index_name_is_stable() {
        let spec = IndexSpec::new(IndexKind::Unique, ["isbn"]);
        assert_eq!(spec.name_for("Book"), "gfy_Book_isbn_unique");
        assert_eq!(spec.to_string(), "unique index (isbn)");
    }
}
