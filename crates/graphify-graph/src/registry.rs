//! In-memory registry of declared node and edge types.
//!
//! Built once at startup through `register_node` / `register_edge`, then
//! shared read-only. There is no removal: a schema only grows within one
//! process lifetime.

use std::any::TypeId;
use std::collections::HashMap;

use serde::Serialize;

use graphify_core::{describe, Describable, SchemaError, TypeDescriptor};

/// A declared graph vertex type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeType {
    pub name: String,
    pub descriptor: TypeDescriptor,
}

impl NodeType {
    /// Name of the store collection holding documents of this type.
    pub fn collection(&self) -> &str {
        &self.name
    }
}

/// A declared directed relation between two node types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeType {
    pub name: String,
    pub source: String,
    pub target: String,
    /// Payload schema; may have no fields.
    pub payload: TypeDescriptor,
}

impl EdgeType {
    /// Name of the store edge collection. Edge types sharing a name share
    /// one collection.
    pub fn collection(&self) -> &str {
        &self.name
    }

    fn key(&self) -> EdgeKey {
        (self.source.clone(), self.target.clone(), self.name.clone())
    }
}

/// (source, target, edge name)
type EdgeKey = (String, String, String);

/// Declared node and edge types for one logical database.
#[derive(Debug, Default)]
pub struct GraphRegistry {
    nodes: Vec<NodeType>,
    node_by_type: HashMap<TypeId, usize>,
    node_by_name: HashMap<String, usize>,
    edges: Vec<EdgeType>,
    edge_by_key: HashMap<EdgeKey, usize>,
    edge_payload_types: Vec<TypeId>,
}

impl GraphRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` as a node type, deriving its schema from `sample`.
    ///
    /// Registering the same Rust type again returns the existing node type.
    /// A different type deriving the same name is rejected.
    pub fn register_node<T: Describable>(&mut self, sample: &T) -> Result<NodeType, SchemaError> {
        let type_id = TypeId::of::<T>();
        if let Some(&idx) = self.node_by_type.get(&type_id) {
            return Ok(self.nodes[idx].clone());
        }

        let descriptor = describe(sample)?;
        let name = descriptor.name.clone();

        if self.node_by_name.contains_key(&name) {
            return Err(SchemaError::DuplicateNodeType { name });
        }
        if self.edges.iter().any(|e| e.collection() == name) {
            return Err(SchemaError::CollectionNameConflict {
                name,
                existing: "edge collection".to_string(),
            });
        }

        let node = NodeType { name, descriptor };
        let idx = self.nodes.len();
        self.nodes.push(node.clone());
        self.node_by_type.insert(type_id, idx);
        self.node_by_name.insert(node.name.clone(), idx);

        tracing::debug!(
            node = %node.name,
            fields = node.descriptor.fields.len(),
            "Registered node type"
        );
        Ok(node)
    }

    /// Register a directed edge `S -> T` whose name and payload schema come
    /// from `payload`. Both endpoint types must already be registered nodes.
    pub fn register_edge<S, T, P>(
        &mut self,
        source: &S,
        target: &T,
        payload: &P,
    ) -> Result<EdgeType, SchemaError>
    where
        S: Describable,
        T: Describable,
        P: Describable,
    {
        let source_name = self.registered_name::<S>(source)?;
        let target_name = self.registered_name::<T>(target)?;

        let payload_type = TypeId::of::<P>();
        let descriptor = describe(payload)?;
        let edge = EdgeType {
            name: descriptor.name.clone(),
            source: source_name,
            target: target_name,
            payload: descriptor,
        };

        if let Some(&idx) = self.edge_by_key.get(&edge.key()) {
            if self.edge_payload_types[idx] == payload_type {
                return Ok(self.edges[idx].clone());
            }
            return Err(duplicate_edge(&edge));
        }

        if self.node_by_name.contains_key(&edge.name) {
            return Err(SchemaError::CollectionNameConflict {
                name: edge.name,
                existing: "node collection".to_string(),
            });
        }
        // Edges sharing a collection must agree on the payload type.
        if let Some(idx) = self.edges.iter().position(|e| e.name == edge.name) {
            if self.edge_payload_types[idx] != payload_type {
                return Err(duplicate_edge(&edge));
            }
        }

        let idx = self.edges.len();
        self.edges.push(edge.clone());
        self.edge_by_key.insert(edge.key(), idx);
        self.edge_payload_types.push(payload_type);

        tracing::debug!(
            edge = %edge.name,
            source = %edge.source,
            target = %edge.target,
            "Registered edge type"
        );
        Ok(edge)
    }

    fn registered_name<T: Describable>(&self, sample: &T) -> Result<String, SchemaError> {
        match self.node_by_type.get(&TypeId::of::<T>()) {
            Some(&idx) => Ok(self.nodes[idx].name.clone()),
            None => Err(SchemaError::UnknownNodeType {
                type_name: sample.describe().name,
            }),
        }
    }

    /// Node types in registration order.
    pub fn nodes(&self) -> &[NodeType] {
        &self.nodes
    }

    /// Edge types in registration order.
    pub fn edges(&self) -> &[EdgeType] {
        &self.edges
    }

    pub fn node(&self, name: &str) -> Option<&NodeType> {
        self.node_by_name.get(name).map(|&idx| &self.nodes[idx])
    }

    /// The node type registered for the Rust type `T`.
    pub fn node_of<T: Describable>(&self) -> Option<&NodeType> {
        self.node_by_type_id(TypeId::of::<T>())
    }

    pub fn node_by_type_id(&self, type_id: TypeId) -> Option<&NodeType> {
        self.node_by_type.get(&type_id).map(|&idx| &self.nodes[idx])
    }

    /// Edge types named `name`, one per registered endpoint pair.
    pub fn edges_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a EdgeType> {
        self.edges.iter().filter(move |e| e.name == name)
    }

    /// Edge types leaving the node type `node`.
    pub fn edges_from<'a>(&'a self, node: &'a str) -> impl Iterator<Item = &'a EdgeType> {
        self.edges.iter().filter(move |e| e.source == node)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn duplicate_edge(edge: &EdgeType) -> SchemaError {
    SchemaError::DuplicateEdgeType {
        name: edge.name.clone(),
        source_name: edge.source.clone(),
        target: edge.target.clone(),
    }
}
