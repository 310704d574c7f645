//! Abstracción del almacén de grafo etiquetado.
//!
//! Toda escritura y lectura pasa por sentencias Cypher parametrizadas
//! (`Statement` = texto + mapa de parámetros + columnas esperadas). Los
//! backends (`Neo4jStore`, `MemoryGraph`) sólo ejecutan sentencias; nunca se
//! interpolan valores de usuario en el texto de la consulta.

use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::statements;

/// Valor de un parámetro o de una columna de resultado.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Vector(Vec<f64>),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            Value::Vector(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Vector(v)
    }
}

/// Tipo esperado de una columna devuelta por una sentencia.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Float,
    Int,
}

/// Sentencia Cypher parametrizada.
///
/// `name` identifica la sentencia de forma estable (logs y backends que no
/// interpretan Cypher, como el grafo en memoria).
#[derive(Debug, Clone)]
pub struct Statement {
    name: &'static str,
    cypher: String,
    params: BTreeMap<String, Value>,
    columns: Vec<(&'static str, ColumnKind)>,
}

impl Statement {
    pub fn new(name: &'static str, cypher: impl Into<String>) -> Self {
        Self {
            name,
            cypher: cypher.into(),
            params: BTreeMap::new(),
            columns: Vec::new(),
        }
    }

    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    /// Sólo añade el parámetro si hay valor. Bolt no admite nulos como
    /// parámetro, así que la sentencia debe contemplar su ausencia.
    pub fn param_opt<V: Into<Value>>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.param(key, v),
            None => self,
        }
    }

    /// Declara una columna del `RETURN` que el backend debe extraer.
    pub fn returns(mut self, column: &'static str, kind: ColumnKind) -> Self {
        self.columns.push((column, kind));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn cypher(&self) -> &str {
        &self.cypher
    }

    pub fn params(&self) -> &BTreeMap<String, Value> {
        &self.params
    }

    pub fn param_value(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    pub fn columns(&self) -> &[(&'static str, ColumnKind)] {
        &self.columns
    }
}

/// Fila de resultado: columna → valor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(BTreeMap<String, Value>);

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: &str, value: impl Into<Value>) {
        self.0.insert(column.to_string(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    pub fn text(&self, column: &str) -> Result<String, StoreError> {
        self.get(column)
            .and_then(Value::as_text)
            .map(str::to_string)
            .ok_or_else(|| StoreError::MissingColumn(column.to_string()))
    }

    pub fn float(&self, column: &str) -> Result<f64, StoreError> {
        self.get(column)
            .and_then(Value::as_f64)
            .ok_or_else(|| StoreError::MissingColumn(column.to_string()))
    }

    pub fn int(&self, column: &str) -> Result<i64, StoreError> {
        self.get(column)
            .and_then(Value::as_i64)
            .ok_or_else(|| StoreError::MissingColumn(column.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("error de conexión con el almacén de grafo: {0}")]
    Connection(String),

    #[error("la sentencia '{statement}' falló: {message}")]
    Query {
        statement: &'static str,
        message: String,
    },

    #[error("el backend '{backend}' no soporta la sentencia '{statement}'")]
    Unsupported {
        backend: &'static str,
        statement: &'static str,
    },

    #[error("identificador no válido: '{0}'")]
    InvalidIdentifier(String),

    #[error("falta la columna '{0}' en el resultado")]
    MissingColumn(String),
}

impl StoreError {
    pub fn query(statement: &Statement, message: impl Into<String>) -> Self {
        StoreError::Query {
            statement: statement.name(),
            message: message.into(),
        }
    }

    /// Error benigno de esquema: otro proceso ya creó el índice/constraint.
    pub fn is_already_exists(&self) -> bool {
        match self {
            StoreError::Query { message, .. } => {
                message.contains("EquivalentSchemaRuleAlreadyExists")
                    || message.contains("IndexAlreadyExists")
                    || message.contains("already exists")
            }
            _ => false,
        }
    }
}

/// Almacén de grafo con semántica de MERGE/MATCH sobre sentencias
/// parametrizadas. Se comparte como `Arc<dyn GraphStore>`.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn run(&self, statement: Statement) -> Result<Vec<Row>, StoreError>;

    fn backend(&self) -> &'static str;
}

/// Comprueba la conectividad con `RETURN 1`.
pub async fn verify_connectivity(store: &dyn GraphStore) -> Result<(), StoreError> {
    let rows = store.run(statements::ping()).await?;
    match rows.first().and_then(|r| r.get("ok")).and_then(Value::as_i64) {
        Some(1) => Ok(()),
        _ => Err(StoreError::Connection(format!(
            "respuesta inesperada del backend '{}' al ping",
            store.backend()
        ))),
    }
}

/// Crea los constraints de unicidad de las etiquetas del grafo.
pub async fn ensure_schema(store: &dyn GraphStore) -> Result<(), StoreError> {
    for stmt in statements::schema_constraints() {
        match store.run(stmt).await {
            Ok(_) => {}
            Err(e) if e.is_already_exists() => {}
            Err(e) => return Err(e),
        }
    }
    info!(backend = store.backend(), "Esquema del grafo asegurado (constraints de unicidad).");
    Ok(())
}

/// Número de nodos por etiqueta.
pub async fn graph_stats(store: &dyn GraphStore) -> Result<BTreeMap<String, i64>, StoreError> {
    let rows = store.run(statements::count_by_label()).await?;
    let mut counts = BTreeMap::new();
    for row in rows {
        counts.insert(row.text("label")?, row.int("count")?);
    }
    Ok(counts)
}
