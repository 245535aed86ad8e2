//! Which node types the exposure layer surfaces.

use std::collections::BTreeSet;

use graphify_core::config::ExposeConfig;

/// Node type selection. An empty selection exposes every node type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExposeFilter {
    nodes: BTreeSet<String>,
}

impl ExposeFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn nodes<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            nodes: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_all(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn allows(&self, node: &str) -> bool {
        self.nodes.is_empty() || self.nodes.contains(node)
    }

    /// Explicitly selected names, sorted.
    pub fn selected(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(String::as_str)
    }
}

impl From<&ExposeConfig> for ExposeFilter {
    fn from(config: &ExposeConfig) -> Self {
        Self::nodes(config.nodes.iter().map(|n| n.trim()).filter(|n| !n.is_empty()))
    }
}
