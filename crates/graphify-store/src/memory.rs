//! In-process store driver.
//!
//! Holds collections, indexes, and documents behind a single async
//! `RwLock`, so every create is atomic create-if-absent. Supports one-shot
//! failure injection and artificial latency for exercising migration
//! retry and cancellation paths.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use graphify_core::IndexKind;
use graphify_graph::{CollectionKind, IndexSpec, StoreMetadata};

use crate::driver::{Created, DocRef, Document, EdgeDocument, StoreDriver};
use crate::error::DriverError;

/// Operations a one-shot failure can be injected into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultPoint {
    ListCollections,
    CreateCollection(String),
    CreateEdgeCollection(String),
    /// Any index creation on the named collection.
    CreateIndex(String),
}

#[derive(Debug)]
struct MemCollection {
    kind: CollectionKind,
    indexes: BTreeSet<IndexSpec>,
    documents: BTreeMap<String, Document>,
    edges: BTreeMap<String, EdgeDocument>,
}

impl MemCollection {
    fn new(kind: CollectionKind) -> Self {
        Self {
            kind,
            indexes: BTreeSet::new(),
            documents: BTreeMap::new(),
            edges: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    collections: BTreeMap<String, MemCollection>,
}

impl State {
    fn collection(&self, name: &str) -> Result<&MemCollection, DriverError> {
        self.collections
            .get(name)
            .ok_or_else(|| DriverError::UnknownCollection(name.to_string()))
    }

    fn collection_mut(&mut self, name: &str) -> Result<&mut MemCollection, DriverError> {
        self.collections
            .get_mut(name)
            .ok_or_else(|| DriverError::UnknownCollection(name.to_string()))
    }

    fn create(&mut self, name: &str, kind: CollectionKind) -> Result<Created, DriverError> {
        match self.collections.get(name) {
            Some(existing) if existing.kind == kind => Ok(Created::Existing),
            Some(existing) => Err(DriverError::KindMismatch {
                name: name.to_string(),
                existing: existing.kind,
            }),
            None => {
                self.collections
                    .insert(name.to_string(), MemCollection::new(kind));
                Ok(Created::New)
            }
        }
    }

    fn document_exists(&self, r: &DocRef) -> bool {
        self.collections
            .get(&r.collection)
            .is_some_and(|c| c.documents.contains_key(&r.key))
    }
}

/// In-memory [`StoreDriver`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    faults: Mutex<Vec<FaultPoint>>,
    latency: Option<Duration>,
    created: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every operation by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make the next operation matching `point` fail with a connection error.
    pub fn fail_once(&self, point: FaultPoint) {
        if let Ok(mut faults) = self.faults.lock() {
            faults.push(point);
        }
    }

    /// Number of collections and indexes this store actually created.
    pub fn structures_created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    async fn enter(&self, point: Option<FaultPoint>) -> Result<(), DriverError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let Some(point) = point else {
            return Ok(());
        };
        let mut faults = self
            .faults
            .lock()
            .map_err(|_| DriverError::Connection("fault registry poisoned".to_string()))?;
        if let Some(pos) = faults.iter().position(|f| *f == point) {
            faults.remove(pos);
            return Err(DriverError::Connection(format!("injected failure at {point:?}")));
        }
        Ok(())
    }

    fn count(&self, created: Created) -> Created {
        if created.is_new() {
            self.created.fetch_add(1, Ordering::SeqCst);
        }
        created
    }
}

#[async_trait]
impl StoreDriver for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn list_collections(&self) -> Result<StoreMetadata, DriverError> {
        self.enter(Some(FaultPoint::ListCollections)).await?;
        let state = self.state.read().await;

        let mut metadata = StoreMetadata::new();
        for (name, collection) in &state.collections {
            metadata.add_collection(name.clone(), collection.kind);
            for index in &collection.indexes {
                metadata.add_index(name, index.clone());
            }
        }
        Ok(metadata)
    }

    async fn collection_kind(&self, name: &str) -> Result<Option<CollectionKind>, DriverError> {
        self.enter(Some(FaultPoint::ListCollections)).await?;
        Ok(self.state.read().await.collections.get(name).map(|c| c.kind))
    }

    async fn create_collection(&self, name: &str) -> Result<Created, DriverError> {
        self.enter(Some(FaultPoint::CreateCollection(name.to_string())))
            .await?;
        let created = self.state.write().await.create(name, CollectionKind::Document)?;
        Ok(self.count(created))
    }

    async fn create_edge_collection(
        &self,
        name: &str,
        from: &str,
        to: &str,
    ) -> Result<Created, DriverError> {
        self.enter(Some(FaultPoint::CreateEdgeCollection(name.to_string())))
            .await?;
        let created = self.state.write().await.create(name, CollectionKind::Edge)?;
        tracing::trace!(collection = name, from, to, ?created, "Edge collection ensured");
        Ok(self.count(created))
    }

    async fn create_index(
        &self,
        collection: &str,
        index: &IndexSpec,
    ) -> Result<Created, DriverError> {
        self.enter(Some(FaultPoint::CreateIndex(collection.to_string())))
            .await?;
        let mut state = self.state.write().await;
        let target = state.collection_mut(collection)?;
        let created = if target.indexes.insert(index.clone()) {
            Created::New
        } else {
            Created::Existing
        };
        Ok(self.count(created))
    }

    async fn get_document(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<Document>, DriverError> {
        self.enter(None).await?;
        let state = self.state.read().await;
        Ok(state.collection(collection)?.documents.get(key).cloned())
    }

    async fn put_document(
        &self,
        collection: &str,
        document: &Document,
    ) -> Result<(), DriverError> {
        self.enter(None).await?;
        let mut state = self.state.write().await;
        let target = state.collection_mut(collection)?;
        if target.kind != CollectionKind::Document {
            return Err(DriverError::KindMismatch {
                name: collection.to_string(),
                existing: target.kind,
            });
        }

        for index in target.indexes.iter().filter(|i| i.kind == IndexKind::Unique) {
            let clash = target.documents.values().any(|other| {
                other.key != document.key
                    && index
                        .fields
                        .iter()
                        .all(|f| document.get(f).is_some() && other.get(f) == document.get(f))
            });
            if clash {
                return Err(DriverError::Conflict {
                    collection: collection.to_string(),
                    reason: format!("duplicate value for unique ({})", index.fields.join(", ")),
                });
            }
        }

        target
            .documents
            .insert(document.key.clone(), document.clone());
        Ok(())
    }

    async fn delete_document(&self, collection: &str, key: &str) -> Result<bool, DriverError> {
        self.enter(None).await?;
        let mut state = self.state.write().await;
        let removed = state
            .collection_mut(collection)?
            .documents
            .remove(key)
            .is_some();

        if removed {
            let gone = DocRef::new(collection, key);
            for other in state.collections.values_mut() {
                other.edges.retain(|_, e| e.from != gone && e.to != gone);
            }
        }
        Ok(removed)
    }

    async fn list_documents(
        &self,
        collection: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Document>, DriverError> {
        self.enter(None).await?;
        let state = self.state.read().await;
        Ok(state
            .collection(collection)?
            .documents
            .values()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn put_edge(&self, collection: &str, edge: &EdgeDocument) -> Result<(), DriverError> {
        self.enter(None).await?;
        let mut state = self.state.write().await;

        for endpoint in [&edge.from, &edge.to] {
            if !state.document_exists(endpoint) {
                return Err(DriverError::DocumentNotFound(endpoint.to_string()));
            }
        }

        let target = state.collection_mut(collection)?;
        if target.kind != CollectionKind::Edge {
            return Err(DriverError::KindMismatch {
                name: collection.to_string(),
                existing: target.kind,
            });
        }
        target.edges.insert(edge.key.clone(), edge.clone());
        Ok(())
    }

    async fn outbound_edges(
        &self,
        collection: &str,
        from: &DocRef,
    ) -> Result<Vec<EdgeDocument>, DriverError> {
        self.enter(None).await?;
        let state = self.state.read().await;
        Ok(state
            .collection(collection)?
            .edges
            .values()
            .filter(|e| &e.from == from)
            .cloned()
            .collect())
    }
}
