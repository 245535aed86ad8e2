//! The access layer: the single choke point between graphify and a store.
//!
//! Migration, hooks, and exposure all reach the store through [`Access`].
//! Every call takes a [`Cancel`] and aborts with `Cancelled` when it fires.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use graphify_core::{EventPayload, IndexKind, Observer};
use graphify_graph::{
    CollectionKind, EdgeType, IndexSpec, MigrationAction, MigrationPlan, NodeType, StoreMetadata,
};

use crate::cancel::Cancel;
use crate::driver::{Created, DocRef, Document, EdgeDocument, StoreDriver};
use crate::error::{AccessError, DriverError, Result};
use crate::migrate::MigrationReport;

/// Shared handle to a store driver. Clone is cheap.
#[derive(Clone)]
pub struct Access {
    driver: Arc<dyn StoreDriver>,
    leases: Arc<AtomicUsize>,
    observer: Option<Observer>,
}

impl Access {
    pub fn new(driver: impl StoreDriver + 'static) -> Self {
        Self::from_arc(Arc::new(driver))
    }

    pub fn from_arc(driver: Arc<dyn StoreDriver>) -> Self {
        Self {
            driver,
            leases: Arc::new(AtomicUsize::new(0)),
            observer: None,
        }
    }

    /// Publish migration and write events to `observer`.
    pub fn with_observer(mut self, observer: Observer) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn observer(&self) -> Option<&Observer> {
        self.observer.as_ref()
    }

    pub fn backend(&self) -> &'static str {
        self.driver.backend()
    }

    /// Collection handles currently checked out.
    pub fn active_handles(&self) -> usize {
        self.leases.load(Ordering::SeqCst)
    }

    /// Publish to the attached observer, if any.
    pub fn publish(&self, payload: EventPayload) {
        if let Some(observer) = &self.observer {
            observer.publish(payload);
        }
    }

    /// Fetch current store structure. Never cached.
    pub async fn metadata(&self, cancel: &Cancel) -> Result<StoreMetadata> {
        Ok(cancel.guard(self.driver.list_collections()).await??)
    }

    /// Kind of a single collection, or `None` if absent.
    pub async fn collection_kind(&self, cancel: &Cancel, name: &str) -> Result<Option<CollectionKind>> {
        Ok(cancel.guard(self.driver.collection_kind(name)).await??)
    }

    /// Run `f` with a live handle on `node`'s collection.
    ///
    /// Fails with `CollectionUnavailable` if the collection does not exist
    /// (migrate first). The handle is released when `f`'s future finishes,
    /// fails, or is dropped by cancellation.
    pub async fn with_collection<F, Fut, T>(
        &self,
        cancel: &Cancel,
        node: &NodeType,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce(CollectionHandle) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.with_named(cancel, node.collection(), CollectionKind::Document, Vec::new(), f)
            .await
    }

    /// Like [`with_collection`](Self::with_collection), for an edge type's
    /// collection. Edges put through the handle must run from `edge.source`
    /// to `edge.target`.
    pub async fn with_edge_collection<F, Fut, T>(
        &self,
        cancel: &Cancel,
        edge: &EdgeType,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce(CollectionHandle) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let endpoints = vec![(edge.source.clone(), edge.target.clone())];
        self.with_named(cancel, edge.collection(), CollectionKind::Edge, endpoints, f)
            .await
    }

    /// `endpoints` lists the (source, target) collection pairs an edge
    /// handle accepts.
    pub(crate) async fn with_named<F, Fut, T>(
        &self,
        cancel: &Cancel,
        collection: &str,
        kind: CollectionKind,
        endpoints: Vec<(String, String)>,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce(CollectionHandle) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.collection_kind(cancel, collection).await? != Some(kind) {
            tracing::warn!(collection, ?kind, "Collection unavailable");
            return Err(AccessError::CollectionUnavailable {
                collection: collection.to_string(),
            });
        }

        let handle = CollectionHandle {
            name: collection.to_string(),
            kind,
            endpoints,
            driver: Arc::clone(&self.driver),
            cancel: cancel.clone(),
            _lease: Lease::acquire(&self.leases),
        };
        cancel.guard(f(handle)).await?
    }

    /// Execute `plan` in order.
    ///
    /// Each action is create-if-absent, so the plan may be applied any
    /// number of times. The first failure aborts the rest and is returned
    /// as `ActionFailed`; already-applied actions stay in place.
    pub async fn apply_migration(
        &self,
        cancel: &Cancel,
        plan: &MigrationPlan,
    ) -> Result<MigrationReport> {
        let mut report = MigrationReport::new(plan.fingerprint());

        for (applied, action) in plan.iter().enumerate() {
            match cancel.guard(self.apply_action(action)).await? {
                Ok(created) => {
                    tracing::info!(
                        backend = self.backend(),
                        %action,
                        created = created.is_new(),
                        "Migration action applied"
                    );
                    self.publish(EventPayload::ActionApplied {
                        action: action.to_string(),
                        created: created.is_new(),
                    });
                    report.record(action, created);
                }
                Err(source) => {
                    tracing::error!(%action, applied, error = %source, "Migration action failed");
                    self.publish(EventPayload::MigrationFailed {
                        action: action.to_string(),
                        error: source.to_string(),
                    });
                    return Err(AccessError::ActionFailed {
                        action: action.clone(),
                        applied,
                        source,
                    });
                }
            }
        }

        Ok(report)
    }

    async fn apply_action(
        &self,
        action: &MigrationAction,
    ) -> std::result::Result<Created, DriverError> {
        match action {
            MigrationAction::CreateCollection { collection } => {
                self.driver.create_collection(collection).await
            }
            MigrationAction::CreateEdgeCollection {
                collection,
                from,
                to,
            } => self.driver.create_edge_collection(collection, from, to).await,
            MigrationAction::CreateIndex { collection, index } => {
                self.driver.create_index(collection, index).await
            }
        }
    }
}

/// Counts a checked-out handle until dropped.
struct Lease(Arc<AtomicUsize>);

impl Lease {
    fn acquire(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A live collection, valid for the duration of a `with_collection` call.
pub struct CollectionHandle {
    name: String,
    kind: CollectionKind,
    endpoints: Vec<(String, String)>,
    driver: Arc<dyn StoreDriver>,
    cancel: Cancel,
    _lease: Lease,
}

impl CollectionHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    /// Create `index` if absent.
    pub async fn ensure_index(&self, index: &IndexSpec) -> Result<Created> {
        let created = self
            .cancel
            .guard(self.driver.create_index(&self.name, index))
            .await??;
        tracing::info!(collection = %self.name, %index, created = created.is_new(), "Index ensured");
        Ok(created)
    }

    /// Create a geospatial index over `fields` if absent.
    pub async fn ensure_geo_index<S: AsRef<str>>(&self, fields: &[S]) -> Result<Created> {
        let index = IndexSpec::new(IndexKind::Geo, fields.iter().map(|f| f.as_ref()));
        self.ensure_index(&index).await
    }

    pub async fn get(&self, key: &str) -> Result<Option<Document>> {
        Ok(self
            .cancel
            .guard(self.driver.get_document(&self.name, key))
            .await??)
    }

    pub async fn put(&self, document: &Document) -> Result<()> {
        Ok(self
            .cancel
            .guard(self.driver.put_document(&self.name, document))
            .await??)
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self
            .cancel
            .guard(self.driver.delete_document(&self.name, key))
            .await??)
    }

    pub async fn list(&self, limit: usize, offset: usize) -> Result<Vec<Document>> {
        Ok(self
            .cancel
            .guard(self.driver.list_documents(&self.name, limit, offset))
            .await??)
    }

    /// Insert or replace an edge. Only valid on edge collections, and only
    /// between the collections the edge type connects.
    pub async fn put_edge(&self, edge: &EdgeDocument) -> Result<()> {
        self.require_edges()?;
        let connects = self
            .endpoints
            .iter()
            .any(|(from, to)| *from == edge.from.collection && *to == edge.to.collection);
        if !connects {
            return Err(DriverError::Conflict {
                collection: self.name.clone(),
                reason: format!(
                    "{} does not connect {} to {}",
                    self.name, edge.from.collection, edge.to.collection
                ),
            }
            .into());
        }
        Ok(self
            .cancel
            .guard(self.driver.put_edge(&self.name, edge))
            .await??)
    }

    /// Edges leaving `from`. Only valid on edge collections.
    pub async fn outbound(&self, from: &DocRef) -> Result<Vec<EdgeDocument>> {
        self.require_edges()?;
        Ok(self
            .cancel
            .guard(self.driver.outbound_edges(&self.name, from))
            .await??)
    }

    fn require_edges(&self) -> Result<()> {
        if self.kind == CollectionKind::Edge {
            Ok(())
        } else {
            Err(AccessError::CollectionUnavailable {
                collection: format!("{} (not an edge collection)", self.name),
            })
        }
    }
}
