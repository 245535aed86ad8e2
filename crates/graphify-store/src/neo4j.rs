//! Neo4j store driver.
//!
//! Collections map onto labels (documents) and relationship types (edges).
//! A collection exists when a uniqueness constraint on `_key` exists for
//! its label or type; that constraint is what `create_collection` creates.
//! Geo hints become POINT indexes, persistent hints RANGE indexes, and
//! unique hints uniqueness constraints.
//!
//! Document reads and writes go through APOC JSON conversion, so property
//! values must be Neo4j-storable. The one exception is a geo value
//! (`{latitude, longitude}`), which is stored as a `point` so POINT
//! indexes cover it and read back as the same object. Other nested objects
//! are rejected by the server. Reading requires Neo4j 5.13+ (`valueType`).

use async_trait::async_trait;
use neo4rs::{query, ConfigBuilder, Graph, Query};
use serde_json::{Map, Value};

use graphify_core::config::StoreConfig;
use graphify_core::IndexKind;
use graphify_graph::{CollectionKind, IndexSpec, StoreMetadata};

use crate::driver::{Created, DocRef, Document, EdgeDocument, StoreDriver};
use crate::error::DriverError;

/// Configuration for connecting to Neo4j.
#[derive(Debug, Clone)]
pub struct Neo4jConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub database: Option<String>,
    pub max_connections: u32,
    pub fetch_size: usize,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self::from(&StoreConfig::default())
    }
}

impl From<&StoreConfig> for Neo4jConfig {
    fn from(config: &StoreConfig) -> Self {
        Self {
            uri: config.uri.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
            database: config.database.clone(),
            max_connections: config.max_connections,
            fetch_size: config.fetch_size,
        }
    }
}

/// Thread-safe Neo4j store with connection pooling.
///
/// Clone is cheap (inner Arc).
#[derive(Clone)]
pub struct Neo4jStore {
    graph: Graph,
}

impl Neo4jStore {
    /// Connect to Neo4j with the given configuration.
    pub async fn connect(config: &Neo4jConfig) -> Result<Self, DriverError> {
        let mut builder = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .max_connections(config.max_connections as usize)
            .fetch_size(config.fetch_size);
        if let Some(db) = &config.database {
            builder = builder.db(db.as_str());
        }
        let neo_config = builder
            .build()
            .map_err(|e| DriverError::Connection(e.to_string()))?;

        let graph = Graph::connect(neo_config)
            .await
            .map_err(|e| DriverError::Connection(e.to_string()))?;

        tracing::info!(uri = %config.uri, "Connected to Neo4j");
        Ok(Self { graph })
    }

    /// Get a reference to the underlying neo4rs Graph for direct operations.
    pub fn inner(&self) -> &Graph {
        &self.graph
    }

    /// Execute a write-only query.
    pub async fn run(&self, query: Query) -> Result<(), DriverError> {
        self.graph.run(query).await?;
        Ok(())
    }

    /// Execute a read query and collect all rows.
    pub async fn query_rows(&self, query: Query) -> Result<Vec<neo4rs::Row>, DriverError> {
        let mut stream = self.graph.execute(query).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Execute a read query and return the first row, if any.
    pub async fn query_one(&self, query: Query) -> Result<Option<neo4rs::Row>, DriverError> {
        let mut stream = self.graph.execute(query).await?;
        Ok(stream.next().await?)
    }

    async fn count(&self, q: Query) -> Result<i64, DriverError> {
        match self.query_one(q).await? {
            Some(row) => Ok(row.get::<i64>("cnt").unwrap_or(0)),
            None => Ok(0),
        }
    }
}

/// One row of `SHOW INDEXES`.
struct IndexRow {
    index_type: String,
    entity_type: String,
    label: String,
    properties: Vec<String>,
    owned_by_constraint: bool,
}

impl IndexRow {
    fn from_row(row: &neo4rs::Row) -> Option<Self> {
        let labels: Vec<String> = row.get("labelsOrTypes").ok()?;
        Some(Self {
            index_type: row.get("type").ok()?,
            entity_type: row.get("entityType").ok()?,
            label: labels.into_iter().next()?,
            properties: row.get("properties").ok()?,
            owned_by_constraint: row.get::<String>("owningConstraint").is_ok(),
        })
    }

    fn is_collection_marker(&self) -> bool {
        self.owned_by_constraint && self.properties.len() == 1 && self.properties[0] == "_key"
    }

    fn collection_kind(&self) -> CollectionKind {
        if self.entity_type == "RELATIONSHIP" {
            CollectionKind::Edge
        } else {
            CollectionKind::Document
        }
    }

    fn index_kind(&self) -> Option<IndexKind> {
        match self.index_type.as_str() {
            "POINT" => Some(IndexKind::Geo),
            "RANGE" if self.owned_by_constraint => Some(IndexKind::Unique),
            "RANGE" => Some(IndexKind::Persistent),
            _ => None,
        }
    }
}

#[async_trait]
impl StoreDriver for Neo4jStore {
    fn backend(&self) -> &'static str {
        "neo4j"
    }

    async fn list_collections(&self) -> Result<StoreMetadata, DriverError> {
        let q = query(
            "SHOW INDEXES
             YIELD type, entityType, labelsOrTypes, properties, owningConstraint
             WHERE labelsOrTypes IS NOT NULL
             RETURN type, entityType, labelsOrTypes, properties, owningConstraint",
        );
        let rows: Vec<IndexRow> = self
            .query_rows(q)
            .await?
            .iter()
            .filter_map(IndexRow::from_row)
            .collect();

        let mut metadata = StoreMetadata::new();
        for row in rows.iter().filter(|r| r.is_collection_marker()) {
            metadata.add_collection(row.label.clone(), row.collection_kind());
        }
        for row in rows.iter().filter(|r| !r.is_collection_marker()) {
            if let Some(kind) = row.index_kind() {
                metadata.add_index(&row.label, IndexSpec::new(kind, row.properties.clone()));
            }
        }
        Ok(metadata)
    }

    async fn collection_kind(&self, name: &str) -> Result<Option<CollectionKind>, DriverError> {
        let q = query(
            "SHOW CONSTRAINTS
             YIELD name, entityType
             WHERE name = $name
             RETURN entityType",
        )
        .param("name", marker_name(name));

        Ok(self.query_one(q).await?.map(|row| {
            match row.get::<String>("entityType").as_deref() {
                Ok("RELATIONSHIP") => CollectionKind::Edge,
                _ => CollectionKind::Document,
            }
        }))
    }

    async fn create_collection(&self, name: &str) -> Result<Created, DriverError> {
        match self.collection_kind(name).await? {
            Some(CollectionKind::Document) => return Ok(Created::Existing),
            Some(existing) => {
                return Err(DriverError::KindMismatch {
                    name: name.to_string(),
                    existing,
                })
            }
            None => {}
        }

        let cypher = format!(
            "CREATE CONSTRAINT {marker} IF NOT EXISTS
             FOR (n:{name}) REQUIRE n._key IS UNIQUE",
            marker = marker_name(name),
        );
        self.run(query(&cypher)).await?;
        Ok(Created::New)
    }

    async fn create_edge_collection(
        &self,
        name: &str,
        from: &str,
        to: &str,
    ) -> Result<Created, DriverError> {
        match self.collection_kind(name).await? {
            Some(CollectionKind::Edge) => return Ok(Created::Existing),
            Some(existing) => {
                return Err(DriverError::KindMismatch {
                    name: name.to_string(),
                    existing,
                })
            }
            None => {}
        }

        // Relationship types do not bind endpoint labels; put_edge matches them.
        let cypher = format!(
            "CREATE CONSTRAINT {marker} IF NOT EXISTS
             FOR ()-[r:{name}]-() REQUIRE r._key IS UNIQUE",
            marker = marker_name(name),
        );
        self.run(query(&cypher)).await?;
        tracing::debug!(collection = name, from, to, "Created relationship constraint");
        Ok(Created::New)
    }

    async fn create_index(
        &self,
        collection: &str,
        index: &IndexSpec,
    ) -> Result<Created, DriverError> {
        let metadata = self.list_collections().await?;
        let kind = metadata
            .collection(collection)
            .map(|c| c.kind)
            .ok_or_else(|| DriverError::UnknownCollection(collection.to_string()))?;
        if metadata.has_index(collection, index) {
            return Ok(Created::Existing);
        }

        let name = index.name_for(collection);
        let pattern = match kind {
            CollectionKind::Document => format!("(n:{collection})"),
            CollectionKind::Edge => format!("()-[n:{collection}]-()"),
        };
        let props = index
            .fields
            .iter()
            .map(|f| format!("n.{f}"))
            .collect::<Vec<_>>()
            .join(", ");

        let cypher = match index.kind {
            IndexKind::Geo => {
                format!("CREATE POINT INDEX {name} IF NOT EXISTS FOR {pattern} ON ({props})")
            }
            IndexKind::Persistent => {
                format!("CREATE RANGE INDEX {name} IF NOT EXISTS FOR {pattern} ON ({props})")
            }
            IndexKind::Unique => format!(
                "CREATE CONSTRAINT {name} IF NOT EXISTS FOR {pattern} REQUIRE ({props}) IS UNIQUE"
            ),
        };
        self.run(query(&cypher)).await?;
        Ok(Created::New)
    }

    async fn get_document(
        &self,
        collection: &str,
        key: &str,
    ) -> Result<Option<Document>, DriverError> {
        let cypher = format!(
            "MATCH (n:{collection} {{_key: $key}})
             RETURN {props} AS json",
            props = properties_json("n"),
        );
        let q = query(&cypher).param("key", key.to_string());

        match self.query_one(q).await? {
            Some(row) => Ok(Some(row_to_document(&row)?)),
            None => Ok(None),
        }
    }

    async fn put_document(
        &self,
        collection: &str,
        document: &Document,
    ) -> Result<(), DriverError> {
        let write = PropertyWrite::split(&document.fields)?;
        let cypher = format!(
            "MERGE (n:{collection} {{_key: $key}})
             SET n = apoc.convert.fromJsonMap($props)
             SET n._key = $key{points}",
            points = write.point_clauses("n"),
        );
        let q = write.bind(query(&cypher).param("key", document.key.clone()));

        self.run(q).await
    }

    async fn delete_document(&self, collection: &str, key: &str) -> Result<bool, DriverError> {
        let cypher = format!(
            "MATCH (n:{collection} {{_key: $key}})
             DETACH DELETE n
             RETURN count(n) AS cnt"
        );
        let q = query(&cypher).param("key", key.to_string());
        Ok(self.count(q).await? > 0)
    }

    async fn list_documents(
        &self,
        collection: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Document>, DriverError> {
        let cypher = format!(
            "MATCH (n:{collection})
             RETURN {props} AS json
             ORDER BY n._key
             SKIP $offset LIMIT $limit",
            props = properties_json("n"),
        );
        let q = query(&cypher)
            .param("offset", offset as i64)
            .param("limit", limit as i64);

        self.query_rows(q)
            .await?
            .iter()
            .map(row_to_document)
            .collect()
    }

    async fn put_edge(&self, collection: &str, edge: &EdgeDocument) -> Result<(), DriverError> {
        let write = PropertyWrite::split(&edge.fields)?;
        let cypher = format!(
            "MATCH (a:{from} {{_key: $from_key}})
             MATCH (b:{to} {{_key: $to_key}})
             MERGE (a)-[r:{collection} {{_key: $key}}]->(b)
             SET r = apoc.convert.fromJsonMap($props)
             SET r._key = $key{points}
             RETURN count(r) AS cnt",
            from = edge.from.collection,
            to = edge.to.collection,
            points = write.point_clauses("r"),
        );
        let q = write.bind(
            query(&cypher)
                .param("from_key", edge.from.key.clone())
                .param("to_key", edge.to.key.clone())
                .param("key", edge.key.clone()),
        );

        if self.count(q).await? == 0 {
            return Err(DriverError::DocumentNotFound(format!(
                "{} or {}",
                edge.from, edge.to
            )));
        }
        Ok(())
    }

    async fn outbound_edges(
        &self,
        collection: &str,
        from: &DocRef,
    ) -> Result<Vec<EdgeDocument>, DriverError> {
        let cypher = format!(
            "MATCH (a:{from_label} {{_key: $from_key}})-[r:{collection}]->(b)
             RETURN {props} AS json,
                    labels(b)[0] AS to_label, b._key AS to_key
             ORDER BY r._key",
            from_label = from.collection,
            props = properties_json("r"),
        );
        let q = query(&cypher).param("from_key", from.key.clone());

        let mut edges = Vec::new();
        for row in self.query_rows(q).await? {
            let doc = row_to_document(&row)?;
            let to_label: String = row.get("to_label").unwrap_or_default();
            let to_key: String = row.get("to_key").unwrap_or_default();
            edges.push(EdgeDocument {
                key: doc.key,
                from: from.clone(),
                to: DocRef::new(to_label, to_key),
                fields: doc.fields,
            });
        }
        Ok(edges)
    }
}

/// Convert a row with a `json` column of properties into a Document.
fn row_to_document(row: &neo4rs::Row) -> Result<Document, DriverError> {
    let json: String = row
        .get("json")
        .map_err(|e| DriverError::Decode(format!("Failed to read properties: {e}")))?;
    let mut fields: Map<String, Value> = serde_json::from_str(&json)?;
    let key = match fields.remove("_key") {
        Some(Value::String(key)) => key,
        _ => String::new(),
    };
    Ok(Document { key, fields })
}

/// Name of the `_key` uniqueness constraint that marks a collection.
fn marker_name(collection: &str) -> String {
    format!("gfy_{collection}__key")
}

/// Cypher expression rendering the properties of `var` as a JSON string,
/// with `point` values as `{latitude, longitude}` objects.
fn properties_json(var: &str) -> String {
    format!(
        "apoc.convert.toJson(apoc.map.fromPairs([k IN keys({var}) | [k,
             CASE WHEN valueType({var}[k]) STARTS WITH 'POINT'
                  THEN {{latitude: {var}[k].latitude, longitude: {var}[k].longitude}}
                  ELSE {var}[k] END]]))"
    )
}

/// A geo value: an object holding exactly a numeric `latitude` and `longitude`.
fn as_point(value: &Value) -> Option<(f64, f64)> {
    let object = value.as_object()?;
    if object.len() != 2 {
        return None;
    }
    Some((
        object.get("latitude")?.as_f64()?,
        object.get("longitude")?.as_f64()?,
    ))
}

/// Properties to write, with geo values split out as points.
#[derive(Debug)]
struct PropertyWrite {
    props: String,
    points: Vec<(String, f64, f64)>,
}

impl PropertyWrite {
    fn split(fields: &Map<String, Value>) -> Result<Self, DriverError> {
        let mut plain = Map::new();
        let mut points = Vec::new();
        for (name, value) in fields {
            match as_point(value) {
                Some((lat, lon)) => points.push((name.clone(), lat, lon)),
                None => {
                    plain.insert(name.clone(), value.clone());
                }
            }
        }
        Ok(Self {
            props: serde_json::to_string(&plain)?,
            points,
        })
    }

    /// One `SET` clause per point, assigned on `var`.
    fn point_clauses(&self, var: &str) -> String {
        self.points
            .iter()
            .enumerate()
            .map(|(i, (name, _, _))| {
                format!(
                    "\n             SET {var}.`{field}` = point({{latitude: $lat{i}, longitude: $lon{i}}})",
                    field = name.replace('`', "``"),
                )
            })
            .collect()
    }

    fn bind(&self, q: Query) -> Query {
        let mut q = q.param("props", self.props.clone());
        for (i, (_, lat, lon)) in self.points.iter().enumerate() {
            q = q
                .param(&format!("lat{i}"), *lat)
                .param(&format!("lon{i}"), *lon);
        }
        q
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_geo_values_are_split_into_points() {
        let fields = json!({
            "name": "Central",
            "location": {"latitude": 52.52, "longitude": 13.40},
            "meta": {"latitude": 1.0, "longitude": 2.0, "height": 3.0}
        });
        let write = PropertyWrite::split(fields.as_object().unwrap()).unwrap();

        assert_eq!(write.points, vec![("location".to_string(), 52.52, 13.40)]);
        let props: Value = serde_json::from_str(&write.props).unwrap();
        assert_eq!(
            props,
            json!({"name": "Central", "meta": {"latitude": 1.0, "longitude": 2.0, "height": 3.0}})
        );
        assert_eq!(
            write.point_clauses("n").trim(),
            "SET n.`location` = point({latitude: $lat0, longitude: $lon0})"
        );
    }

    #[test]
    fn test_as_point_requires_numeric_coordinates() {
        assert_eq!(as_point(&json!({"latitude": 1, "longitude": 2})), Some((1.0, 2.0)));
        assert!(as_point(&json!({"latitude": "1", "longitude": 2})).is_none());
        assert!(as_point(&json!({"latitude": 1})).is_none());
        assert!(as_point(&json!([1, 2])).is_none());
    }

    #[test]
    fn test_properties_json_projects_points() {
        let expr = properties_json("n");
        assert!(expr.starts_with("apoc.convert.toJson("));
        assert!(expr.contains("valueType(n[k]) STARTS WITH 'POINT'"));
        assert!(expr.contains("{latitude: n[k].latitude, longitude: n[k].longitude}"));
    }

    #[test]
    fn test_marker_name() {
        assert_eq!(marker_name("Book"), "gfy_Book__key");
    }
}
