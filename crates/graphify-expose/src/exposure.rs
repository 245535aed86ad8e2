//! Resources and relations derived from a finalized registry.
//!
//! One [`Resource`] per exposed node type and one [`Relation`] per edge
//! type whose endpoints are both exposed. All store work goes through the
//! access layer, so a resource whose collection has not been migrated
//! fails with `CollectionUnavailable`.

use std::sync::Arc;

use serde_json::{Map, Value};

use graphify_core::{EventPayload, SchemaError};
use graphify_graph::{EdgeType, GraphRegistry, NodeType};
use graphify_store::{Access, Cancel, DocRef, Document, EdgeDocument};

use crate::catalog::{Catalog, Operation, RelationEntry, ResourceEntry};
use crate::error::{ExposeError, Result};
use crate::filter::ExposeFilter;
use crate::validate::check_fields;

/// The exposed API surface for one registry.
pub struct Exposure {
    registry: Arc<GraphRegistry>,
    resources: Vec<Resource>,
    relations: Vec<Relation>,
}

impl Exposure {
    /// Derive resources and relations. Fails if `filter` names a node type
    /// the registry does not know.
    pub fn build(registry: Arc<GraphRegistry>, access: Access, filter: ExposeFilter) -> Result<Self> {
        if let Some(unknown) = filter.selected().find(|n| registry.node(n).is_none()) {
            return Err(SchemaError::UnknownNodeType {
                type_name: unknown.to_string(),
            }
            .into());
        }

        let resources: Vec<Resource> = registry
            .nodes()
            .iter()
            .filter(|node| filter.allows(&node.name))
            .map(|node| Resource {
                node: node.clone(),
                access: access.clone(),
            })
            .collect();

        let relations: Vec<Relation> = registry
            .edges()
            .iter()
            .filter(|edge| filter.allows(&edge.source) && filter.allows(&edge.target))
            .map(|edge| Relation {
                edge: edge.clone(),
                access: access.clone(),
            })
            .collect();

        tracing::info!(
            resources = resources.len(),
            relations = relations.len(),
            hidden_relations = registry.edges().len() - relations.len(),
            "Exposure built"
        );

        Ok(Self {
            registry,
            resources,
            relations,
        })
    }

    pub fn registry(&self) -> &GraphRegistry {
        &self.registry
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn resource(&self, name: &str) -> Result<&Resource> {
        self.resources
            .iter()
            .find(|r| r.name() == name)
            .ok_or_else(|| ExposeError::NotExposed {
                name: name.to_string(),
            })
    }

    /// The relation `name` from `source` to `target`. Edge types may share
    /// a name across endpoint pairs, so all three are needed.
    pub fn relation(&self, source: &str, target: &str, name: &str) -> Result<&Relation> {
        self.relations
            .iter()
            .find(|r| r.source() == source && r.target() == target && r.name() == name)
            .ok_or_else(|| ExposeError::NotExposed {
                name: format!("{name} ({source} -> {target})"),
            })
    }

    pub fn relations_from<'a>(&'a self, source: &'a str) -> impl Iterator<Item = &'a Relation> {
        self.relations.iter().filter(move |r| r.source() == source)
    }

    pub fn catalog(&self) -> Catalog {
        Catalog {
            resources: self
                .resources
                .iter()
                .map(|r| ResourceEntry {
                    name: r.node.name.clone(),
                    collection: r.node.collection().to_string(),
                    fields: r.node.descriptor.fields.clone(),
                    operations: Operation::RESOURCE.to_vec(),
                })
                .collect(),
            relations: self
                .relations
                .iter()
                .map(|r| RelationEntry {
                    name: r.edge.name.clone(),
                    source: r.edge.source.clone(),
                    target: r.edge.target.clone(),
                    collection: r.edge.collection().to_string(),
                    payload: r.edge.payload.fields.clone(),
                    operations: Operation::RELATION.to_vec(),
                })
                .collect(),
        }
    }
}

/// CRUD over one node type's collection.
#[derive(Clone)]
pub struct Resource {
    node: NodeType,
    access: Access,
}

impl Resource {
    pub fn name(&self) -> &str {
        &self.node.name
    }

    pub fn node(&self) -> &NodeType {
        &self.node
    }

    pub async fn get(&self, cancel: &Cancel, key: &str) -> Result<Option<Document>> {
        Ok(self
            .access
            .with_collection(cancel, &self.node, |c| async move { c.get(key).await })
            .await?)
    }

    /// Documents ordered by key.
    pub async fn list(&self, cancel: &Cancel, limit: usize, offset: usize) -> Result<Vec<Document>> {
        Ok(self
            .access
            .with_collection(cancel, &self.node, |c| async move { c.list(limit, offset).await })
            .await?)
    }

    /// Validate `body` against the node's fields and store it.
    ///
    /// The key is taken from `key`, else from a `_key` member of `body`,
    /// else generated.
    pub async fn put(&self, cancel: &Cancel, key: Option<&str>, body: Value) -> Result<Document> {
        let Value::Object(mut fields) = body else {
            return Err(ExposeError::invalid(self.name(), "body must be a JSON object"));
        };
        let embedded = match fields.remove("_key") {
            Some(Value::String(k)) => Some(k),
            Some(_) => return Err(ExposeError::invalid(self.name(), "_key must be a string")),
            None => None,
        };
        let key = match key.map(str::to_string).or(embedded) {
            Some(k) => k,
            None => new_key(),
        };
        check_key(self.name(), &key)?;
        check_fields(&self.node.descriptor, &fields)
            .map_err(|reason| ExposeError::invalid(self.name(), reason))?;

        let document = Document { key, fields };
        let document = self
            .access
            .with_collection(cancel, &self.node, |c| async move {
                c.put(&document).await?;
                Ok(document)
            })
            .await?;

        tracing::debug!(resource = %self.node.name, key = %document.key, "Document written");
        self.access.publish(EventPayload::DocumentWritten {
            collection: self.node.collection().to_string(),
            key: document.key.clone(),
        });
        Ok(document)
    }

    /// Returns false if no document had that key.
    pub async fn delete(&self, cancel: &Cancel, key: &str) -> Result<bool> {
        let removed = self
            .access
            .with_collection(cancel, &self.node, |c| async move { c.delete(key).await })
            .await?;
        if removed {
            self.access.publish(EventPayload::DocumentDeleted {
                collection: self.node.collection().to_string(),
                key: key.to_string(),
            });
        }
        Ok(removed)
    }
}

/// Connect and traverse over one edge type.
#[derive(Clone)]
pub struct Relation {
    edge: EdgeType,
    access: Access,
}

impl Relation {
    pub fn name(&self) -> &str {
        &self.edge.name
    }

    pub fn source(&self) -> &str {
        &self.edge.source
    }

    pub fn target(&self) -> &str {
        &self.edge.target
    }

    pub fn edge(&self) -> &EdgeType {
        &self.edge
    }

    /// Link `source/from_key` to `target/to_key`. `payload` may be null
    /// when the edge declares no required fields.
    pub async fn connect(
        &self,
        cancel: &Cancel,
        from_key: &str,
        to_key: &str,
        payload: Value,
    ) -> Result<EdgeDocument> {
        let fields = match payload {
            Value::Null => Map::new(),
            Value::Object(fields) => fields,
            _ => return Err(ExposeError::invalid(self.name(), "payload must be a JSON object")),
        };
        check_fields(&self.edge.payload, &fields)
            .map_err(|reason| ExposeError::invalid(self.name(), reason))?;

        let mut edge = EdgeDocument::new(
            new_key(),
            DocRef::new(self.edge.source.clone(), from_key),
            DocRef::new(self.edge.target.clone(), to_key),
        );
        edge.fields = fields;

        let edge = self
            .access
            .with_edge_collection(cancel, &self.edge, |c| async move {
                c.put_edge(&edge).await?;
                Ok(edge)
            })
            .await?;

        tracing::debug!(relation = %self.edge.name, from = %edge.from, to = %edge.to, "Edge written");
        self.access.publish(EventPayload::DocumentWritten {
            collection: self.edge.collection().to_string(),
            key: edge.key.clone(),
        });
        Ok(edge)
    }

    /// Edges of this relation leaving `source/from_key`.
    pub async fn traverse(&self, cancel: &Cancel, from_key: &str) -> Result<Vec<EdgeDocument>> {
        let from = DocRef::new(self.edge.source.clone(), from_key);
        let target = self.edge.target.as_str();
        let edges = self
            .access
            .with_edge_collection(cancel, &self.edge, |c| async move { c.outbound(&from).await })
            .await?;
        // Edge types sharing a name share a collection.
        Ok(edges
            .into_iter()
            .filter(|e| e.to.collection == target)
            .collect())
    }
}

fn new_key() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn check_key(resource: &str, key: &str) -> Result<()> {
    if key.is_empty() || key.contains('/') {
        return Err(ExposeError::invalid(resource, format!("invalid key '{key}'")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use graphify_core::{Describable, Observer, TypeDescriptor};
    use graphify_store::{AccessError, MemoryStore};
    use serde_json::json;

    struct Book;
    struct Client;
    struct Library;
    struct Borrow;
    struct Visit;

    impl Describable for Book {
        fn describe(&self) -> TypeDescriptor {
            TypeDescriptor::new("Book")
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
            TypeDescriptor::new("Library").field::<String>("name")
        }
    }

    impl Describable for Borrow {
        fn describe(&self) -> TypeDescriptor {
            TypeDescriptor::new("Borrow").field::<Option<i64>>("days")
        }
    }

    impl Describable for Visit {
        fn describe(&self) -> TypeDescriptor {
            TypeDescriptor::new("Visit")
        }
    }

    fn registry() -> Arc<GraphRegistry> {
        let mut registry = GraphRegistry::new();
        registry.register_node(&Book).unwrap();
        registry.register_node(&Client).unwrap();
        registry.register_node(&Library).unwrap();
        registry.register_edge(&Client, &Book, &Borrow).unwrap();
        registry.register_edge(&Client, &Library, &Visit).unwrap();
        Arc::new(registry)
    }

    async fn migrated(registry: &GraphRegistry) -> Access {
        let access = Access::new(MemoryStore::new());
        access.auto_migrate(&Cancel::new(), registry).await.unwrap();
        access
    }

    #[tokio::test]
    async fn test_all_filter_exposes_everything() {
        let registry = registry();
        let access = migrated(&registry).await;
        let exposure = Exposure::build(registry, access, ExposeFilter::all()).unwrap();

        let names: Vec<_> = exposure.resources().iter().map(Resource::name).collect();
        assert_eq!(names, vec!["Book", "Client", "Library"]);
        assert_eq!(exposure.relations().len(), 2);
    }

    #[tokio::test]
    async fn test_filter_hides_resources_and_dangling_relations() {
        let registry = registry();
        let access = migrated(&registry).await;
        let exposure =
            Exposure::build(registry, access, ExposeFilter::nodes(["Book", "Client"])).unwrap();

        assert!(exposure.resource("Book").is_ok());
        let err = exposure.resource("Library").err().unwrap();
        assert!(matches!(err, ExposeError::NotExposed { ref name } if name == "Library"));
        assert!(err.is_client_error());

        assert!(exposure.relation("Client", "Book", "Borrow").is_ok());
        assert!(exposure.relation("Client", "Library", "Visit").is_err());
        assert_eq!(exposure.catalog().relations.len(), 1);
    }

    #[test]
    fn test_filter_naming_unknown_node_fails() {
        let access = Access::new(MemoryStore::new());
        let err = Exposure::build(registry(), access, ExposeFilter::nodes(["Magazine"]))
            .err()
            .unwrap();
        assert!(matches!(err, ExposeError::Schema(SchemaError::UnknownNodeType { .. })));
    }

    #[tokio::test]
    async fn test_resource_crud() {
        let registry = registry();
        let access = migrated(&registry).await;
        let exposure = Exposure::build(registry, access, ExposeFilter::all()).unwrap();
        let books = exposure.resource("Book").unwrap();
        let cancel = Cancel::new();

        let written = books
            .put(&cancel, Some("b1"), json!({"title": "Dune", "pages": 412}))
            .await
            .unwrap();
        assert_eq!(written.key, "b1");

        let generated = books
            .put(&cancel, None, json!({"title": "Emma"}))
            .await
            .unwrap();
        assert_eq!(generated.key.len(), 32);

        let fetched = books.get(&cancel, "b1").await.unwrap().unwrap();
        assert_eq!(fetched.get("title"), Some(&json!("Dune")));
        assert_eq!(books.list(&cancel, 10, 0).await.unwrap().len(), 2);

        assert!(books.delete(&cancel, "b1").await.unwrap());
        assert!(!books.delete(&cancel, "b1").await.unwrap());
        assert!(books.get(&cancel, "b1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_rejects_invalid_documents() {
        let registry = registry();
        let access = migrated(&registry).await;
        let exposure = Exposure::build(registry, access, ExposeFilter::all()).unwrap();
        let books = exposure.resource("Book").unwrap();
        let cancel = Cancel::new();

        for body in [
            json!({"title": "Dune", "isbn": "x"}),
            json!({"title": "Dune", "_from": "Client/c1"}),
            json!({"pages": 12}),
            json!(["not", "an", "object"]),
        ] {
            let err = books.put(&cancel, Some("b1"), body).await.unwrap_err();
            assert!(matches!(err, ExposeError::InvalidDocument { .. }), "{err}");
        }
        let err = books
            .put(&cancel, Some("a/b"), json!({"title": "Dune"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ExposeError::InvalidDocument { .. }));
    }

    #[tokio::test]
    async fn test_unmigrated_resource_is_unavailable() {
        let exposure =
            Exposure::build(registry(), Access::new(MemoryStore::new()), ExposeFilter::all())
                .unwrap();
        let err = exposure
            .resource("Book")
            .unwrap()
            .list(&Cancel::new(), 10, 0)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExposeError::Access(AccessError::CollectionUnavailable { .. })
        ));
        assert!(!err.is_client_error());
    }

    #[tokio::test]
    async fn test_connect_and_traverse() {
        let registry = registry();
        let access = migrated(&registry).await;
        let exposure = Exposure::build(registry, access, ExposeFilter::all()).unwrap();
        let cancel = Cancel::new();

        exposure
            .resource("Client")
            .unwrap()
            .put(&cancel, Some("c1"), json!({"name": "Ada"}))
            .await
            .unwrap();
        exposure
            .resource("Book")
            .unwrap()
            .put(&cancel, Some("b1"), json!({"title": "Dune"}))
            .await
            .unwrap();

        let borrow = exposure.relation("Client", "Book", "Borrow").unwrap();
        let edge = borrow
            .connect(&cancel, "c1", "b1", json!({"days": 14}))
            .await
            .unwrap();
        assert_eq!(edge.to, DocRef::new("Book", "b1"));

        let edges = borrow.traverse(&cancel, "c1").await.unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].key, edge.key);
        assert!(borrow.traverse(&cancel, "c2").await.unwrap().is_empty());

        let err = borrow
            .connect(&cancel, "c1", "missing", Value::Null)
            .await
            .unwrap_err();
        assert!(err.is_client_error(), "{err}");
    }

    #[tokio::test]
    async fn test_relations_sharing_a_name_are_each_reachable() {
        let mut registry = GraphRegistry::new();
        registry.register_node(&Book).unwrap();
        registry.register_node(&Client).unwrap();
        registry.register_node(&Library).unwrap();
        registry.register_edge(&Client, &Book, &Borrow).unwrap();
        registry.register_edge(&Client, &Library, &Borrow).unwrap();
        let registry = Arc::new(registry);
        let access = migrated(&registry).await;
        let exposure = Exposure::build(registry, access, ExposeFilter::all()).unwrap();
        let cancel = Cancel::new();

        for (resource, key, body) in [
            ("Client", "c1", json!({"name": "Ada"})),
            ("Book", "b1", json!({"title": "Dune"})),
            ("Library", "l1", json!({"name": "Central"})),
        ] {
            exposure
                .resource(resource)
                .unwrap()
                .put(&cancel, Some(key), body)
                .await
                .unwrap();
        }

        let books = exposure.relation("Client", "Book", "Borrow").unwrap();
        let libraries = exposure.relation("Client", "Library", "Borrow").unwrap();
        assert_eq!(libraries.target(), "Library");

        books.connect(&cancel, "c1", "b1", Value::Null).await.unwrap();
        let edge = libraries
            .connect(&cancel, "c1", "l1", json!({"days": 3}))
            .await
            .unwrap();
        assert_eq!(edge.to, DocRef::new("Library", "l1"));

        let reached = libraries.traverse(&cancel, "c1").await.unwrap();
        assert_eq!(reached.len(), 1);
        assert_eq!(reached[0].key, edge.key);
        assert_eq!(books.traverse(&cancel, "c1").await.unwrap().len(), 1);

        let err = exposure.relation("Library", "Book", "Borrow").err().unwrap();
        assert!(matches!(err, ExposeError::NotExposed { ref name } if name == "Borrow (Library -> Book)"));
    }

    #[tokio::test]
    async fn test_writes_publish_events() {
        let registry = registry();
        let observer = Observer::new(16);
        let mut events = observer.subscribe();
        let access = migrated(&registry).await.with_observer(observer);
        let exposure = Exposure::build(registry, access, ExposeFilter::all()).unwrap();
        let cancel = Cancel::new();

        let books = exposure.resource("Book").unwrap();
        books
            .put(&cancel, Some("b1"), json!({"title": "Dune"}))
            .await
            .unwrap();
        books.delete(&cancel, "b1").await.unwrap();

        assert_eq!(
            events.try_recv().unwrap().payload,
            EventPayload::DocumentWritten {
                collection: "Book".to_string(),
                key: "b1".to_string()
            }
        );
        assert_eq!(
            events.try_recv().unwrap().payload,
            EventPayload::DocumentDeleted {
                collection: "Book".to_string(),
                key: "b1".to_string()
            }
        );
    }
}
