//! Migration tests against the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use graphify_core::{Describable, EventPayload, GeoPoint, IndexKind, Observer, TypeDescriptor};
use graphify_graph::{plan, GraphRegistry, IndexSpec, MigrationAction, StoreMetadata};
use graphify_store::{
    Access, AccessError, Cancel, FaultPoint, GeoIndexHook, MemoryStore, Migrator,
};

struct Book;
struct Client;
struct Library;
struct Borrow;

impl Describable for Book {
    fn describe(&self) -> TypeDescriptor {
        TypeDescriptor::new("Book")
            .indexed::<String>("isbn", IndexKind::Unique)
            .field::<String>("title")
            .field::<Option<i64>>("pages")
    }
}

impl Describable for Client {
    fn describe(&self) -> TypeDescriptor {
        TypeDescriptor::new("Client").field::<String>("name")
    }
}

impl Describable for Library {
    fn describe(&self) -> TypeDescriptor {
        TypeDescriptor::new("Library")
            .field::<String>("name")
            .field::<GeoPoint>("location")
    }
}

impl Describable for Borrow {
    fn describe(&self) -> TypeDescriptor {
        TypeDescriptor::new("Borrow").field::<chrono::DateTime<chrono::Utc>>("since")
    }
}

fn library_registry() -> GraphRegistry {
    let mut registry = GraphRegistry::new();
    registry.register_node(&Book).unwrap();
    registry.register_node(&Client).unwrap();
    registry.register_node(&Library).unwrap();
    registry.register_edge(&Client, &Book, &Borrow).unwrap();
    registry
}

/// Book, Client, Library, Borrow and the unique isbn index.
const EXPECTED_STRUCTURES: usize = 5;

#[tokio::test]
async fn test_library_migration_then_replan_is_empty() {
    let access = Access::new(MemoryStore::new());
    let registry = library_registry();
    let cancel = Cancel::new();

    let report = access.auto_migrate(&cancel, &registry).await.unwrap();
    assert_eq!(
        report.created,
        vec![
            MigrationAction::CreateCollection {
                collection: "Book".to_string()
            },
            MigrationAction::CreateCollection {
                collection: "Client".to_string()
            },
            MigrationAction::CreateCollection {
                collection: "Library".to_string()
            },
            MigrationAction::CreateEdgeCollection {
                collection: "Borrow".to_string(),
                from: "Client".to_string(),
                to: "Book".to_string(),
            },
            MigrationAction::CreateIndex {
                collection: "Book".to_string(),
                index: IndexSpec::new(IndexKind::Unique, ["isbn"]),
            },
        ]
    );

    let metadata = access.metadata(&cancel).await.unwrap();
    assert!(plan(&registry, &metadata).is_empty());
}

#[tokio::test]
async fn test_applying_twice_leaves_identical_metadata() {
    let access = Access::new(MemoryStore::new());
    let registry = library_registry();
    let cancel = Cancel::new();
    let migration = plan(&registry, &StoreMetadata::new());

    let first = access.apply_migration(&cancel, &migration).await.unwrap();
    let after_first = access.metadata(&cancel).await.unwrap();
    let second = access.apply_migration(&cancel, &migration).await.unwrap();
    let after_second = access.metadata(&cancel).await.unwrap();

    assert_eq!(after_first, after_second);
    assert_eq!(first.created.len(), EXPECTED_STRUCTURES);
    assert!(second.created.is_empty());
    assert_eq!(second.existing.len(), EXPECTED_STRUCTURES);
}

#[tokio::test]
async fn test_failed_index_action_converges_on_rerun() {
    let store = Arc::new(MemoryStore::new());
    let access = Access::from_arc(store.clone());
    let registry = library_registry();
    let cancel = Cancel::new();

    store.fail_once(FaultPoint::CreateIndex("Book".to_string()));
    let err = access.auto_migrate(&cancel, &registry).await.unwrap_err();
    assert!(err.is_retryable());
    match &err {
        AccessError::ActionFailed { action, applied, .. } => {
            assert!(matches!(action, MigrationAction::CreateIndex { .. }));
            assert_eq!(*applied, 4);
        }
        other => panic!("unexpected error: {other}"),
    }

    let rerun = access.auto_migrate(&cancel, &registry).await.unwrap();
    assert_eq!(rerun.created.len(), 1);
    assert_eq!(store.structures_created(), EXPECTED_STRUCTURES);
    let metadata = access.metadata(&cancel).await.unwrap();
    assert!(plan(&registry, &metadata).is_empty());
}

#[tokio::test]
async fn test_concurrent_migrations_create_each_structure_once() {
    let store = Arc::new(MemoryStore::new().with_latency(Duration::from_millis(2)));
    let first = Access::from_arc(store.clone());
    let second = Access::from_arc(store.clone());
    let registry = library_registry();
    let cancel = Cancel::new();

    let (a, b) = tokio::join!(
        first.auto_migrate(&cancel, &registry),
        second.auto_migrate(&cancel, &registry)
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(store.structures_created(), EXPECTED_STRUCTURES);
    assert_eq!(a.created.len() + b.created.len(), EXPECTED_STRUCTURES);
}

#[tokio::test]
async fn test_deadline_cancels_slow_migration() {
    let access = Access::new(MemoryStore::new().with_latency(Duration::from_secs(60)));
    let cancel = Cancel::with_timeout(Duration::from_millis(25));

    let err = access
        .auto_migrate(&cancel, &library_registry())
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::Cancelled));
}

#[tokio::test]
async fn test_pre_cancelled_migration_touches_nothing() {
    let store = Arc::new(MemoryStore::new());
    let access = Access::from_arc(store.clone());
    let cancel = Cancel::new();
    cancel.cancel();

    let err = access
        .auto_migrate(&cancel, &library_registry())
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::Cancelled));
    assert_eq!(store.structures_created(), 0);
}

#[tokio::test]
async fn test_collection_unavailable_before_migration() {
    let access = Access::new(MemoryStore::new());
    let registry = library_registry();
    let cancel = Cancel::new();
    let book = registry.node("Book").unwrap();

    let err = access
        .with_collection(&cancel, book, |handle| async move { handle.list(10, 0).await })
        .await
        .unwrap_err();
    assert!(matches!(err, AccessError::CollectionUnavailable { ref collection } if collection == "Book"));

    access.auto_migrate(&cancel, &registry).await.unwrap();
    let docs = access
        .with_collection(&cancel, book, |handle| async move { handle.list(10, 0).await })
        .await
        .unwrap();
    assert!(docs.is_empty());
    assert_eq!(access.active_handles(), 0);
}

#[tokio::test]
async fn test_geo_hook_adds_index_and_replan_is_empty() {
    let store = Arc::new(MemoryStore::new());
    let access = Access::from_arc(store.clone());
    let registry = library_registry();
    let cancel = Cancel::new();

    let migrator = Migrator::new(&access).hook_for(&Library, GeoIndexHook::new(["location"]));
    let report = migrator.run(&cancel, &registry).await.unwrap();
    assert_eq!(report.hooks, 1);
    assert_eq!(store.structures_created(), EXPECTED_STRUCTURES + 1);

    let metadata = access.metadata(&cancel).await.unwrap();
    assert!(metadata.has_index("Library", &IndexSpec::geo("location")));
    assert!(plan(&registry, &metadata).is_empty());

    // Hooks are create-if-absent too.
    let again = migrator.run(&cancel, &registry).await.unwrap();
    assert!(again.is_noop());
    assert_eq!(store.structures_created(), EXPECTED_STRUCTURES + 1);
}

#[tokio::test]
async fn test_failing_hook_is_wrapped_with_collection() {
    let store = Arc::new(MemoryStore::new());
    let access = Access::from_arc(store.clone());
    let registry = library_registry();
    let cancel = Cancel::new();

    store.fail_once(FaultPoint::CreateIndex("Library".to_string()));
    let err = Migrator::new(&access)
        .hook_on("Library", GeoIndexHook::new(["location"]))
        .run(&cancel, &registry)
        .await
        .unwrap_err();
    match &err {
        AccessError::Hook { collection, .. } => assert_eq!(collection, "Library"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_retryable());
    assert_eq!(access.active_handles(), 0);
}

#[tokio::test]
async fn test_observer_sees_migration_lifecycle() {
    let observer = Observer::new(64);
    let mut events = observer.subscribe();
    let access = Access::new(MemoryStore::new()).with_observer(observer);
    let cancel = Cancel::new();

    access.auto_migrate(&cancel, &library_registry()).await.unwrap();

    let mut payloads = Vec::new();
    while let Ok(event) = events.try_recv() {
        payloads.push(event.payload);
    }
    assert!(matches!(
        payloads.first(),
        Some(EventPayload::MigrationPlanned { actions: 5, .. })
    ));
    let applied = payloads
        .iter()
        .filter(|p| matches!(p, EventPayload::ActionApplied { created: true, .. }))
        .count();
    assert_eq!(applied, EXPECTED_STRUCTURES);
    assert!(matches!(
        payloads.last(),
        Some(EventPayload::MigrationCompleted {
            created: 5,
            existing: 0,
            hooks: 0,
            ..
        })
    ));
}
