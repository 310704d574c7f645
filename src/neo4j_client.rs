use anyhow::Result;
use async_trait::async_trait;
use neo4rs::{query, ConfigBuilder, Graph, Query};
use tracing::{debug, info};
use url::Url;

use crate::graph_store::{ColumnKind, GraphStore, Row, Statement, StoreError, Value};

/// Backend Neo4j del almacén de grafo.
pub struct Neo4jStore {
    graph: Graph,
}

pub async fn connect_from_config(
    uri: &str,
    user: &str,
    password: &str,
    database: &str,
) -> Result<Neo4jStore> {
    let url = Url::parse(uri)?;
    let host = url.host_str().unwrap_or("localhost");
    let port = url.port().unwrap_or(7687);
    let addr = format!("{host}:{port}");

    info!("Conectando a Neo4j en {addr} (base de datos '{database}')...");
    let config = ConfigBuilder::default()
        .uri(addr.as_str())
        .user(user)
        .password(password)
        .db(database)
        .build()?;
    let graph = Graph::connect(config).await?;
    info!("Conexión a Neo4j OK");
    Ok(Neo4jStore { graph })
}

/// Bolt no acepta nulos como parámetro; `Value` no los tiene.
fn bind(q: Query, key: &str, value: &Value) -> Query {
    match value {
        Value::Bool(b) => q.param(key, *b),
        Value::Int(i) => q.param(key, *i),
        Value::Float(f) => q.param(key, *f),
        Value::Text(s) => q.param(key, s.clone()),
        Value::Vector(v) => q.param(key, v.clone()),
    }
}

fn column_value(row: &neo4rs::Row, column: &str, kind: ColumnKind) -> Option<Value> {
    let value = match kind {
        ColumnKind::Text => row.get::<String>(column).map(Value::Text),
        ColumnKind::Float => row
            .get::<f64>(column)
            .map(Value::Float)
            .or_else(|| row.get::<i64>(column).map(|i| Value::Float(i as f64))),
        ColumnKind::Int => row.get::<i64>(column).map(Value::Int),
    };
    if value.is_none() {
        debug!(column, "Columna ausente o nula en la fila de Neo4j");
    }
    value
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn run(&self, statement: Statement) -> Result<Vec<Row>, StoreError> {
        debug!(statement = statement.name(), "Ejecutando sentencia en Neo4j");
        let mut q = query(statement.cypher());
        for (key, value) in statement.params() {
            q = bind(q, key, value);
        }

        let mut stream = self
            .graph
            .execute(q)
            .await
            .map_err(|e| StoreError::query(&statement, e.to_string()))?;

        let mut rows = Vec::new();
        while let Some(raw) = stream
            .next()
            .await
            .map_err(|e| StoreError::query(&statement, e.to_string()))?
        {
            let mut row = Row::new();
            for (column, kind) in statement.columns() {
                if let Some(value) = column_value(&raw, column, *kind) {
                    row.insert(column, value);
                }
            }
            rows.push(row);
        }
        Ok(rows)
    }

    fn backend(&self) -> &'static str {
        "neo4j"
    }
}
