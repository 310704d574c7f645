//! Grafo en memoria que ejecuta el mismo conjunto de sentencias que Neo4j.
//!
//! No interpreta Cypher: despacha por `Statement::name()` y reproduce la
//! semántica de cada sentencia (MERGE por identidad, ON CREATE frente a
//! ON MATCH, MATCH que filtra filas, búsqueda vectorial coseno). Sirve para
//! ejecuciones sin Neo4j (`GRAPH_BACKEND=memory`) y para los tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::graph_store::{GraphStore, Row, Statement, StoreError, Value};
use crate::statements;

pub type Properties = BTreeMap<String, Value>;

/// (etiqueta, clave de identidad)
type NodeKey = (String, String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorIndexDef {
    pub label: String,
    pub property: String,
    pub dimensions: usize,
}

#[derive(Debug, Default)]
struct GraphData {
    nodes: BTreeMap<NodeKey, Properties>,
    relationships: BTreeSet<(String, NodeKey, NodeKey)>,
    vector_indexes: BTreeMap<String, VectorIndexDef>,
    constraints: BTreeSet<(String, String)>,
}

impl GraphData {
    /// MERGE por identidad. Devuelve `true` si el nodo se ha creado.
    fn merge_node(&mut self, label: &str, key_property: &str, key: &str) -> bool {
        let node_key = (label.to_string(), key.to_string());
        if self.nodes.contains_key(&node_key) {
            return false;
        }
        let mut props = Properties::new();
        props.insert(key_property.to_string(), Value::Text(key.to_string()));
        self.nodes.insert(node_key, props);
        true
    }

    fn props_mut(&mut self, label: &str, key: &str) -> Option<&mut Properties> {
        self.nodes.get_mut(&(label.to_string(), key.to_string()))
    }

    fn exists(&self, label: &str, key: &str) -> bool {
        self.nodes.contains_key(&(label.to_string(), key.to_string()))
    }

    fn merge_relationship(&mut self, rel: &str, from: (&str, &str), to: (&str, &str)) {
        self.relationships.insert((
            rel.to_string(),
            (from.0.to_string(), from.1.to_string()),
            (to.0.to_string(), to.1.to_string()),
        ));
    }
}

/// Almacén de grafo en proceso.
#[derive(Debug, Default)]
pub struct MemoryGraph {
    data: Mutex<GraphData>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GraphData> {
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Propiedades de un nodo identificado por etiqueta y clave.
    pub fn node(&self, label: &str, key: &str) -> Option<Properties> {
        self.lock().nodes.get(&(label.to_string(), key.to_string())).cloned()
    }

    pub fn node_count(&self, label: &str) -> usize {
        self.lock().nodes.keys().filter(|(l, _)| l == label).count()
    }

    pub fn relationship_count(&self, rel: &str) -> usize {
        self.lock().relationships.iter().filter(|(r, _, _)| r == rel).count()
    }

    pub fn has_relationship(&self, rel: &str, from: (&str, &str), to: (&str, &str)) -> bool {
        self.lock().relationships.contains(&(
            rel.to_string(),
            (from.0.to_string(), from.1.to_string()),
            (to.0.to_string(), to.1.to_string()),
        ))
    }

    pub fn has_constraint(&self, label: &str, property: &str) -> bool {
        self.lock()
            .constraints
            .contains(&(label.to_string(), property.to_string()))
    }

    pub fn vector_index(&self, name: &str) -> Option<VectorIndexDef> {
        self.lock().vector_indexes.get(name).cloned()
    }

    fn execute(&self, stmt: &Statement) -> Result<Vec<Row>, StoreError> {
        let mut g = self.lock();
        match stmt.name() {
            statements::PING => Ok(vec![Row::new().with("ok", 1_i64)]),

            statements::CREATE_CONSTRAINT => {
                let label = text(stmt, "label")?;
                let property = text(stmt, "property")?;
                g.constraints.insert((label, property));
                Ok(Vec::new())
            }

            statements::MERGE_MANUFACTURER => {
                let name = text(stmt, "name")?;
                g.merge_node("Manufacturer", "name", name.as_str());
                Ok(Vec::new())
            }

            statements::MERGE_MEDICINE => {
                let name = text(stmt, "name")?;
                g.merge_node("Medicine", "name", name.as_str());
                let mut updates = Vec::new();
                for key in ["is_tablet", "is_syrup", "is_ointment", "is_drop", "is_injection"] {
                    updates.push((key, Some(param(stmt, key)?.clone())));
                }
                // SET si el peso viene en la sentencia, REMOVE si no.
                for key in statements::WEIGHT_PROPERTIES {
                    updates.push((key, stmt.param_value(key).cloned()));
                }
                if let Some(props) = g.props_mut("Medicine", name.as_str()) {
                    for (key, value) in updates {
                        match value {
                            Some(value) => {
                                props.insert(key.to_string(), value);
                            }
                            None => {
                                props.remove(key);
                            }
                        }
                    }
                }
                if let Some(Value::Text(mf)) = stmt.param_value("manufacturer_name") {
                    if g.exists("Manufacturer", mf.as_str()) {
                        g.merge_relationship(
                            "PRODUCES",
                            ("Manufacturer", mf.as_str()),
                            ("Medicine", name.as_str()),
                        );
                    }
                }
                Ok(Vec::new())
            }

            statements::MERGE_GENERIC => {
                let generic = text(stmt, "generic_name")?;
                let medicine = text(stmt, "medicine_name")?;
                g.merge_node("Generic", "name", generic.as_str());
                if g.exists("Medicine", medicine.as_str()) {
                    g.merge_relationship(
                        "HAS_GENERIC",
                        ("Medicine", medicine.as_str()),
                        ("Generic", generic.as_str()),
                    );
                }
                Ok(Vec::new())
            }

            statements::MERGE_THERAPEUTIC_CLASS => {
                let class = text(stmt, "class_name")?;
                let medicine = text(stmt, "medicine_name")?;
                g.merge_node("TherapeuticClass", "name", class.as_str());
                if g.exists("Medicine", medicine.as_str()) {
                    g.merge_relationship(
                        "BELONGS_TO_CLASS",
                        ("Medicine", medicine.as_str()),
                        ("TherapeuticClass", class.as_str()),
                    );
                }
                Ok(Vec::new())
            }

            statements::MERGE_INDICATION => {
                let indication = text(stmt, "indication_name")?;
                let medicine = text(stmt, "medicine_name")?;
                let details = param(stmt, "details_summary")?.clone();
                g.merge_node("Indication", "name", indication.as_str());
                if let Some(props) = g.props_mut("Indication", indication.as_str()) {
                    props.insert("details_summary".to_string(), details);
                }
                if g.exists("Medicine", medicine.as_str()) {
                    g.merge_relationship(
                        "INDICATED_FOR",
                        ("Medicine", medicine.as_str()),
                        ("Indication", indication.as_str()),
                    );
                }
                Ok(Vec::new())
            }

            statements::MERGE_CHUNK => {
                let medicine = text(stmt, "medicine_name")?;
                if !g.exists("Medicine", medicine.as_str()) {
                    return Ok(Vec::new());
                }
                let chunk_id = text(stmt, "chunkId")?;
                if g.merge_node("Chunk", "chunkId", chunk_id.as_str()) {
                    let mut content = Vec::new();
                    for key in ["text", "chunkSeqId", "source", "embedding"] {
                        content.push((key, param(stmt, key)?.clone()));
                    }
                    if let Some(props) = g.props_mut("Chunk", chunk_id.as_str()) {
                        for (key, value) in content {
                            props.insert(key.to_string(), value);
                        }
                    }
                }
                g.merge_relationship(
                    "HAS_CHUNK",
                    ("Medicine", medicine.as_str()),
                    ("Chunk", chunk_id.as_str()),
                );
                Ok(vec![Row::new().with("chunkNodeId", chunk_id)])
            }

            statements::SHOW_VECTOR_INDEX => {
                let name = text(stmt, "name")?;
                Ok(g.vector_indexes
                    .contains_key(&name)
                    .then(|| Row::new().with("name", name))
                    .into_iter()
                    .collect())
            }

            statements::CREATE_VECTOR_INDEX => {
                let name = text(stmt, "index_name")?;
                let def = VectorIndexDef {
                    label: text(stmt, "label")?,
                    property: text(stmt, "property")?,
                    dimensions: int(stmt, "dimensions")? as usize,
                };
                // IF NOT EXISTS: un índice con el mismo nombre no se toca.
                g.vector_indexes.entry(name).or_insert(def);
                Ok(Vec::new())
            }

            statements::VECTOR_SEARCH => {
                let index_name = text(stmt, "index_name")?;
                let top_k = int(stmt, "top_k")?.max(0) as usize;
                let query = match param(stmt, "query_embedding")? {
                    Value::Vector(v) => v.clone(),
                    _ => return Err(StoreError::query(stmt, "query_embedding no es un vector")),
                };
                let def = g.vector_indexes.get(&index_name).cloned().ok_or_else(|| {
                    StoreError::query(stmt, format!("no existe el índice vectorial '{index_name}'"))
                })?;
                if query.len() != def.dimensions {
                    return Err(StoreError::query(
                        stmt,
                        format!(
                            "el vector de consulta tiene {} dimensiones y el índice '{index_name}' {}",
                            query.len(),
                            def.dimensions
                        ),
                    ));
                }

                let mut scored: Vec<(f64, String)> = g
                    .nodes
                    .iter()
                    .filter(|((label, _), _)| *label == def.label)
                    .filter_map(|(_, props)| {
                        let embedding = props.get(&def.property)?.as_vector()?;
                        if embedding.len() != def.dimensions {
                            return None;
                        }
                        let text = props.get("text")?.as_text()?.to_string();
                        Some((cosine_score(&query, embedding), text))
                    })
                    .collect();
                scored.sort_by(|a, b| b.0.total_cmp(&a.0));
                scored.truncate(top_k);

                Ok(scored
                    .into_iter()
                    .map(|(score, text)| Row::new().with("text", text).with("score", score))
                    .collect())
            }

            statements::COUNT_BY_LABEL => {
                let mut counts: BTreeMap<&str, i64> = BTreeMap::new();
                for (label, _) in g.nodes.keys() {
                    *counts.entry(label.as_str()).or_default() += 1;
                }
                Ok(counts
                    .into_iter()
                    .map(|(label, count)| Row::new().with("label", label).with("count", count))
                    .collect())
            }

            other => Err(StoreError::Unsupported {
                backend: "memory",
                statement: other,
            }),
        }
    }
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn run(&self, statement: Statement) -> Result<Vec<Row>, StoreError> {
        self.execute(&statement)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

fn param<'a>(stmt: &'a Statement, key: &str) -> Result<&'a Value, StoreError> {
    stmt.param_value(key)
        .ok_or_else(|| StoreError::query(stmt, format!("falta el parámetro ${key}")))
}

fn text(stmt: &Statement, key: &str) -> Result<String, StoreError> {
    param(stmt, key)?
        .as_text()
        .map(str::to_string)
        .ok_or_else(|| StoreError::query(stmt, format!("el parámetro ${key} debe ser texto")))
}

fn int(stmt: &Statement, key: &str) -> Result<i64, StoreError> {
    param(stmt, key)?
        .as_i64()
        .ok_or_else(|| StoreError::query(stmt, format!("el parámetro ${key} debe ser entero")))
}

/// Similitud coseno normalizada a [0, 1] como la devuelve Neo4j: (1 + cos) / 2.
pub fn cosine_score(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (1.0 + dot / (norm_a * norm_b)) / 2.0
}
