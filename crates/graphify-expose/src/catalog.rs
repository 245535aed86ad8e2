//! Serializable description of the exposed surface, for serving layers.

use serde::Serialize;

use graphify_core::FieldDescriptor;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Get,
    List,
    Put,
    Delete,
    Connect,
    Traverse,
}

impl Operation {
    pub const RESOURCE: [Operation; 4] = [Self::Get, Self::List, Self::Put, Self::Delete];
    pub const RELATION: [Operation; 2] = [Self::Connect, Self::Traverse];
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResourceEntry {
    pub name: String,
    pub collection: String,
    pub fields: Vec<FieldDescriptor>,
    pub operations: Vec<Operation>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RelationEntry {
    pub name: String,
    pub source: String,
    pub target: String,
    pub collection: String,
    pub payload: Vec<FieldDescriptor>,
    pub operations: Vec<Operation>,
}

/// Exposed resources and relations in registration order.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct Catalog {
    pub resources: Vec<ResourceEntry>,
    pub relations: Vec<RelationEntry>,
}

impl Catalog {
    pub fn resource(&self, name: &str) -> Option<&ResourceEntry> {
        self.resources.iter().find(|r| r.name == name)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
