//! Migration planning: diff the registry against live store metadata.
//!
//! Planning is pure. Actions are ordered by kind (node collections, edge
//! collections, indexes) and then by registration order, so identical
//! inputs always produce an identical plan.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::metadata::{CollectionKind, IndexSpec, StoreMetadata};
use crate::registry::GraphRegistry;

/// One create-if-absent structural change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MigrationAction {
    CreateCollection {
        collection: String,
    },
    CreateEdgeCollection {
        collection: String,
        from: String,
        to: String,
    },
    CreateIndex {
        collection: String,
        index: IndexSpec,
    },
}

impl MigrationAction {
    /// The collection this action creates or modifies.
    pub fn collection(&self) -> &str {
        match self {
            Self::CreateCollection { collection }
            | Self::CreateEdgeCollection { collection, .. }
            | Self::CreateIndex { collection, .. } => collection,
        }
    }
}

impl fmt::Display for MigrationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateCollection { collection } => {
                write!(f, "create collection {collection}")
            }
            Self::CreateEdgeCollection {
                collection,
                from,
                to,
            } => write!(f, "create edge collection {collection} ({from} -> {to})"),
            Self::CreateIndex { collection, index } => {
                write!(f, "create {index} on {collection}")
            }
        }
    }
}

/// Ordered actions converging the store on the declared schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MigrationPlan {
    pub actions: Vec<MigrationAction>,
}

impl MigrationPlan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MigrationAction> {
        self.actions.iter()
    }

    /// BLAKE3 over the ordered action list, hex-encoded. Equal plans have
    /// equal fingerprints.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for action in &self.actions {
            hasher.update(action.to_string().as_bytes());
            hasher.update(b"\n");
        }
        hasher.finalize().to_hex().to_string()
    }
}

impl<'a> IntoIterator for &'a MigrationPlan {
    type Item = &'a MigrationAction;
    type IntoIter = std::slice::Iter<'a, MigrationAction>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.iter()
    }
}

/// Compute the actions needed to bring `metadata` in line with `registry`.
pub fn plan(registry: &GraphRegistry, metadata: &StoreMetadata) -> MigrationPlan {
    let mut collections = Vec::new();
    let mut edge_collections = Vec::new();
    let mut indexes = Vec::new();

    for node in registry.nodes() {
        let name = node.collection();
        if !metadata.has(name, CollectionKind::Document) {
            collections.push(MigrationAction::CreateCollection {
                collection: name.to_string(),
            });
        }
        push_missing_indexes(&mut indexes, metadata, name, node.descriptor.index_hints());
    }

    let mut planned_edges = HashSet::new();
    for edge in registry.edges() {
        let name = edge.collection();
        if !planned_edges.insert(name) {
            continue;
        }
        if !metadata.has(name, CollectionKind::Edge) {
            edge_collections.push(MigrationAction::CreateEdgeCollection {
                collection: name.to_string(),
                from: edge.source.clone(),
                to: edge.target.clone(),
            });
        }
        push_missing_indexes(&mut indexes, metadata, name, edge.payload.index_hints());
    }

    let mut actions = collections;
    actions.append(&mut edge_collections);
    actions.append(&mut indexes);

    tracing::debug!(
        actions = actions.len(),
        nodes = registry.nodes().len(),
        edges = registry.edges().len(),
        "Migration planned"
    );
    MigrationPlan { actions }
}

fn push_missing_indexes<'a>(
    out: &mut Vec<MigrationAction>,
    metadata: &StoreMetadata,
    collection: &str,
    hints: impl Iterator<Item = (&'a str, graphify_core::IndexKind)>,
) {
    for (field, kind) in hints {
        let index = IndexSpec::new(kind, [field]);
        if !metadata.has_index(collection, &index) {
            out.push(MigrationAction::CreateIndex {
                collection: collection.to_string(),
                index,
            });
        }
    }
}
