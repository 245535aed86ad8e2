//! Auto-migration: fetch store metadata, plan, apply, then run
//! per-collection hooks.

use std::any::TypeId;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;

use graphify_core::{Describable, EventPayload, IndexKind, SchemaError};
use graphify_graph::{plan, CollectionKind, GraphRegistry, IndexSpec, MigrationAction, MigrationPlan};

use crate::access::{Access, CollectionHandle};
use crate::cancel::Cancel;
use crate::driver::Created;
use crate::error::{AccessError, Result};

/// What a migration run did.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct MigrationReport {
    /// Actions that created a structure.
    pub created: Vec<MigrationAction>,
    /// Actions whose structure was already present when applied.
    pub existing: Vec<MigrationAction>,
    /// Hooks run after the generic pass.
    pub hooks: usize,
    pub fingerprint: String,
}

impl MigrationReport {
    pub(crate) fn new(fingerprint: String) -> Self {
        Self {
            fingerprint,
            ..Self::default()
        }
    }

    pub(crate) fn record(&mut self, action: &MigrationAction, created: Created) {
        match created {
            Created::New => self.created.push(action.clone()),
            Created::Existing => self.existing.push(action.clone()),
        }
    }

    /// True when the store already matched the schema.
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.existing.is_empty()
    }
}

/// Extra migration work for one collection, run after the generic pass.
#[async_trait]
pub trait CollectionHook: Send + Sync {
    async fn apply(&self, collection: &CollectionHandle) -> Result<()>;
}

/// Ensures a geospatial index over fixed fields.
#[derive(Debug, Clone)]
pub struct GeoIndexHook {
    fields: Vec<String>,
}

impl GeoIndexHook {
    pub fn new<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn index(&self) -> IndexSpec {
        IndexSpec::new(IndexKind::Geo, self.fields.iter().cloned())
    }
}

#[async_trait]
impl CollectionHook for GeoIndexHook {
    async fn apply(&self, collection: &CollectionHandle) -> Result<()> {
        collection.ensure_index(&self.index()).await?;
        Ok(())
    }
}

enum HookTarget {
    Type { type_id: TypeId, type_name: String },
    Collection(String),
}

/// A resolved hook target: collection name, kind, and the node pairs an
/// edge collection may connect.
type Resolved = (String, CollectionKind, Vec<(String, String)>);

impl HookTarget {
    fn resolve(&self, registry: &GraphRegistry) -> Result<Resolved> {
        match self {
            Self::Type { type_id, type_name } => registry
                .node_by_type_id(*type_id)
                .map(|node| (node.collection().to_string(), CollectionKind::Document, Vec::new()))
                .ok_or_else(|| unknown(type_name)),
            Self::Collection(name) => {
                if let Some(node) = registry.node(name) {
                    return Ok((node.collection().to_string(), CollectionKind::Document, Vec::new()));
                }
                let edges: Vec<_> = registry.edges_named(name).collect();
                let first = edges.first().ok_or_else(|| unknown(name))?;
                let endpoints = edges
                    .iter()
                    .map(|edge| (edge.source.clone(), edge.target.clone()))
                    .collect();
                Ok((first.collection().to_string(), CollectionKind::Edge, endpoints))
            }
        }
    }
}

fn unknown(type_name: &str) -> AccessError {
    AccessError::Schema(SchemaError::UnknownNodeType {
        type_name: type_name.to_string(),
    })
}

/// Runs the migration pipeline against one [`Access`].
pub struct Migrator {
    access: Access,
    hooks: Vec<(HookTarget, Box<dyn CollectionHook>)>,
}

impl Migrator {
    pub fn new(access: &Access) -> Self {
        Self {
            access: access.clone(),
            hooks: Vec::new(),
        }
    }

    /// Attach `hook` to the collection of the node type registered for `T`.
    pub fn hook_for<T: Describable>(mut self, sample: &T, hook: impl CollectionHook + 'static) -> Self {
        let target = HookTarget::Type {
            type_id: TypeId::of::<T>(),
            type_name: sample.describe().name,
        };
        self.hooks.push((target, Box::new(hook)));
        self
    }

    /// Attach `hook` to a node or edge collection by name.
    pub fn hook_on(mut self, collection: impl Into<String>, hook: impl CollectionHook + 'static) -> Self {
        self.hooks
            .push((HookTarget::Collection(collection.into()), Box::new(hook)));
        self
    }

    /// Compute the plan without applying it. Hooks are not consulted.
    pub async fn dry_run(&self, cancel: &Cancel, registry: &GraphRegistry) -> Result<MigrationPlan> {
        let metadata = self.access.metadata(cancel).await?;
        Ok(plan(registry, &metadata))
    }

    /// Converge the store on `registry`, then run hooks in the order
    /// they were attached.
    pub async fn run(&self, cancel: &Cancel, registry: &GraphRegistry) -> Result<MigrationReport> {
        let started = Instant::now();

        // Resolve hook targets before touching the store.
        let targets = self
            .hooks
            .iter()
            .map(|(target, hook)| target.resolve(registry).map(|t| (t, hook)))
            .collect::<Result<Vec<_>>>()?;

        let metadata = self.access.metadata(cancel).await?;
        let plan = plan(registry, &metadata);
        let fingerprint = plan.fingerprint();

        tracing::info!(
            backend = self.access.backend(),
            actions = plan.len(),
            collections = metadata.len(),
            fingerprint = %fingerprint,
            "Migration planned"
        );
        self.access.publish(EventPayload::MigrationPlanned {
            actions: plan.len(),
            fingerprint,
        });

        let mut report = self.access.apply_migration(cancel, &plan).await?;

        for ((collection, kind, endpoints), hook) in targets {
            tracing::debug!(collection = %collection, "Running collection hook");
            self.access
                .with_named(cancel, &collection, kind, endpoints, |handle| async move {
                    hook.apply(&handle).await
                })
                .await
                .map_err(|source| match source {
                    AccessError::Cancelled => AccessError::Cancelled,
                    source => AccessError::Hook {
                        collection: collection.clone(),
                        source: Box::new(source),
                    },
                })?;
            report.hooks += 1;
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            created = report.created.len(),
            existing = report.existing.len(),
            hooks = report.hooks,
            duration_ms,
            "Migration completed"
        );
        self.access.publish(EventPayload::MigrationCompleted {
            created: report.created.len(),
            existing: report.existing.len(),
            hooks: report.hooks,
            duration_ms,
        });

        Ok(report)
    }
}

impl Access {
    /// Plan and apply a migration with no hooks.
    pub async fn auto_migrate(&self, cancel: &Cancel, registry: &GraphRegistry) -> Result<MigrationReport> {
        Migrator::new(self).run(cancel, registry).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use graphify_core::{GeoPoint, TypeDescriptor};

    struct Library;

    impl Describable for Library {
        fn describe(&self) -> TypeDescriptor {
            TypeDescriptor::new("Library")
                .field::<String>("name")
                .field::<GeoPoint>("location")
        }
    }

    struct Unregistered;

    impl Describable for Unregistered {
        fn describe(&self) -> TypeDescriptor {
            TypeDescriptor::new("Ghost")
        }
    }

    fn registry() -> GraphRegistry {
        let mut registry = GraphRegistry::new();
        registry.register_node(&Library).unwrap();
        registry
    }

    #[test]
    fn test_geo_index_hook_index() {
        let hook = GeoIndexHook::new(["location"]);
        assert_eq!(hook.index(), IndexSpec::geo("location"));
    }

    #[tokio::test]
    async fn test_hook_runs_after_generic_pass() {
        let access = Access::new(MemoryStore::new());
        let registry = registry();
        let cancel = Cancel::new();

        let report = Migrator::new(&access)
            .hook_for(&Library, GeoIndexHook::new(["location"]))
            .run(&cancel, &registry)
            .await
            .unwrap();
        assert_eq!(report.created.len(), 1);
        assert_eq!(report.hooks, 1);

        let metadata = access.metadata(&cancel).await.unwrap();
        assert!(metadata.has_index("Library", &IndexSpec::geo("location")));
    }

    #[tokio::test]
    async fn test_hook_on_unregistered_type_fails_before_store_access() {
        let access = Access::new(MemoryStore::new());
        let cancel = Cancel::new();

        let err = Migrator::new(&access)
            .hook_for(&Unregistered, GeoIndexHook::new(["location"]))
            .run(&cancel, &registry())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AccessError::Schema(SchemaError::UnknownNodeType { ref type_name }) if type_name == "Ghost"
        ));
        assert!(access.metadata(&cancel).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_does_not_apply() {
        let access = Access::new(MemoryStore::new());
        let cancel = Cancel::new();
        let migrator = Migrator::new(&access);

        let planned = migrator.dry_run(&cancel, &registry()).await.unwrap();
        assert_eq!(planned.len(), 1);
        assert!(access.metadata(&cancel).await.unwrap().is_empty());

        let report = access.auto_migrate(&cancel, &registry()).await.unwrap();
        assert_eq!(report.fingerprint, planned.fingerprint());
        assert!(access.auto_migrate(&cancel, &registry()).await.unwrap().is_noop());
    }
}
