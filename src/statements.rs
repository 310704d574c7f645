//! Sentencias Cypher del pipeline. Cada constructor fija el texto, los
//! parámetros y las columnas devueltas; `name` es estable y lo usan los logs
//! y el grafo en memoria.

use crate::graph_store::{ColumnKind, Statement, Value};
use crate::models::{MedicineRecord, RecordChunk};
use crate::vector_store::VectorIndexSpec;

pub const PING: &str = "ping";
pub const CREATE_CONSTRAINT: &str = "create_constraint";
pub const MERGE_MANUFACTURER: &str = "merge_manufacturer";
pub const MERGE_MEDICINE: &str = "merge_medicine";
pub const MERGE_GENERIC: &str = "merge_generic";
pub const MERGE_THERAPEUTIC_CLASS: &str = "merge_therapeutic_class";
pub const MERGE_INDICATION: &str = "merge_indication";
pub const MERGE_CHUNK: &str = "merge_chunk";
pub const SHOW_VECTOR_INDEX: &str = "show_vector_index";
pub const CREATE_VECTOR_INDEX: &str = "create_vector_index";
pub const VECTOR_SEARCH: &str = "vector_search";
pub const COUNT_BY_LABEL: &str = "count_by_label";

/// (nombre del constraint, etiqueta, propiedad identidad)
pub const IDENTITY_KEYS: [(&str, &str, &str); 6] = [
    ("medicine_name", "Medicine", "name"),
    ("manufacturer_name", "Manufacturer", "name"),
    ("generic_name", "Generic", "name"),
    ("therapeutic_class_name", "TherapeuticClass", "name"),
    ("indication_name", "Indication", "name"),
    ("chunk_id", "Chunk", "chunkId"),
];

pub fn ping() -> Statement {
    Statement::new(PING, "RETURN 1 AS ok").returns("ok", ColumnKind::Int)
}

pub fn schema_constraints() -> Vec<Statement> {
    IDENTITY_KEYS
        .iter()
        .map(|(name, label, property)| {
            Statement::new(
                CREATE_CONSTRAINT,
                format!(
                    "CREATE CONSTRAINT {name} IF NOT EXISTS
                     FOR (n:{label})
                     REQUIRE n.{property} IS UNIQUE"
                ),
            )
            .param("label", *label)
            .param("property", *property)
        })
        .collect()
}

pub fn merge_manufacturer(name: &str) -> Statement {
    Statement::new(MERGE_MANUFACTURER, "MERGE (mf:Manufacturer {name: $name})").param("name", name)
}

/// Propiedades de peso del :Medicine; las ausentes en el registro se borran.
pub const WEIGHT_PROPERTIES: [&str; 2] = ["weight_mg", "weight_ml_other"];

/// MERGE del nodo :Medicine (propiedades sobrescritas en cada pasada) y, si
/// el registro trae fabricante, la arista PRODUCES desde el :Manufacturer.
/// Un peso ausente se quita con `REMOVE` en lugar de pasar un nulo.
pub fn merge_medicine(name: &str, record: &MedicineRecord) -> Statement {
    let weights = [
        (WEIGHT_PROPERTIES[0], record.weight_mg.as_ref().map(Value::from)),
        (WEIGHT_PROPERTIES[1], record.weight_other.as_ref().map(Value::from)),
    ];

    let mut cypher = String::from(
        "MERGE (m:Medicine {name: $name})
         SET m.is_tablet = $is_tablet,
             m.is_syrup = $is_syrup,
             m.is_ointment = $is_ointment,
             m.is_drop = $is_drop,
             m.is_injection = $is_injection",
    );
    for (property, value) in &weights {
        if value.is_some() {
            cypher.push_str(&format!(",\n             m.{property} = ${property}"));
        }
    }
    let removed: Vec<String> = weights
        .iter()
        .filter(|(_, value)| value.is_none())
        .map(|(property, _)| format!("m.{property}"))
        .collect();
    if !removed.is_empty() {
        cypher.push_str(&format!("\n         REMOVE {}", removed.join(", ")));
    }

    let manufacturer = record.manufacturer_name();
    if manufacturer.is_some() {
        cypher.push_str(
            "
         WITH m
         MATCH (mf:Manufacturer {name: $manufacturer_name})
         MERGE (mf)-[:PRODUCES]->(m)",
        );
    }

    let forms = record.forms();
    let mut stmt = Statement::new(MERGE_MEDICINE, cypher)
        .param("name", name)
        .param("is_tablet", forms.tablet)
        .param("is_syrup", forms.syrup)
        .param("is_ointment", forms.ointment)
        .param("is_drop", forms.drop)
        .param("is_injection", forms.injection)
        .param_opt("manufacturer_name", manufacturer);
    for (property, value) in weights {
        stmt = stmt.param_opt(property, value);
    }
    stmt
}

pub fn merge_generic(medicine_name: &str, generic_name: &str) -> Statement {
    Statement::new(
        MERGE_GENERIC,
        "MERGE (g:Generic {name: $generic_name})
         WITH g
         MATCH (m:Medicine {name: $medicine_name})
         MERGE (m)-[:HAS_GENERIC]->(g)",
    )
    .param("generic_name", generic_name)
    .param("medicine_name", medicine_name)
}

pub fn merge_therapeutic_class(medicine_name: &str, class_name: &str) -> Statement {
    Statement::new(
        MERGE_THERAPEUTIC_CLASS,
        "MERGE (t:TherapeuticClass {name: $class_name})
         WITH t
         MATCH (m:Medicine {name: $medicine_name})
         MERGE (m)-[:BELONGS_TO_CLASS]->(t)",
    )
    .param("class_name", class_name)
    .param("medicine_name", medicine_name)
}

pub fn merge_indication(medicine_name: &str, indication: &str, details_summary: &str) -> Statement {
    Statement::new(
        MERGE_INDICATION,
        "MERGE (i:Indication {name: $indication_name})
         ON CREATE SET i.details_summary = $details_summary
         ON MATCH SET i.details_summary = $details_summary
         WITH i
         MATCH (m:Medicine {name: $medicine_name})
         MERGE (m)-[:INDICATED_FOR]->(i)",
    )
    .param("indication_name", indication)
    .param("details_summary", details_summary)
    .param("medicine_name", medicine_name)
}

/// Crea el :Chunk sólo si el :Medicine propietario existe. El contenido se
/// fija únicamente al crear (first-write-wins). Sin fila de vuelta = no enlazado.
pub fn merge_chunk(chunk: &RecordChunk, owner: &str, embedding: Vec<f64>) -> Statement {
    Statement::new(
        MERGE_CHUNK,
        "MATCH (m:Medicine {name: $medicine_name})
         MERGE (c:Chunk {chunkId: $chunkId})
         ON CREATE SET c.text = $text,
                       c.chunkSeqId = $chunkSeqId,
                       c.source = $source,
                       c.embedding = $embedding
         MERGE (m)-[:HAS_CHUNK]->(c)
         RETURN c.chunkId AS chunkNodeId",
    )
    .param("medicine_name", owner)
    .param("chunkId", chunk.chunk_id.as_str())
    .param("text", chunk.text.as_str())
    .param("chunkSeqId", chunk.seq)
    .param("source", chunk.source.as_str())
    .param("embedding", embedding)
    .returns("chunkNodeId", ColumnKind::Text)
}

pub fn show_vector_index(name: &str) -> Statement {
    Statement::new(
        SHOW_VECTOR_INDEX,
        "SHOW VECTOR INDEXES YIELD name WHERE name = $name RETURN name",
    )
    .param("name", name)
    .returns("name", ColumnKind::Text)
}

/// Los nombres de índice, etiqueta y propiedad no se pueden parametrizar en
/// DDL; `spec` debe estar validado antes (ver `VectorIndexSpec::validate`).
pub fn create_vector_index(spec: &VectorIndexSpec) -> Statement {
    let cypher = format!(
        "\
CREATE VECTOR INDEX `{name}` IF NOT EXISTS
FOR (c:{label})
ON (c.{property})
OPTIONS {{
  indexConfig: {{
    `vector.dimensions`: {dimensions},
    `vector.similarity_function`: 'cosine'
  }}
}}",
        name = spec.name,
        label = spec.label,
        property = spec.property,
        dimensions = spec.dimensions,
    );
    Statement::new(CREATE_VECTOR_INDEX, cypher)
        .param("index_name", spec.name.as_str())
        .param("label", spec.label.as_str())
        .param("property", spec.property.as_str())
        .param("dimensions", spec.dimensions)
}

pub fn vector_search(index_name: &str, top_k: usize, query_embedding: Vec<f64>) -> Statement {
    Statement::new(
        VECTOR_SEARCH,
        "CALL db.index.vector.queryNodes($index_name, $top_k, $query_embedding)
         YIELD node AS chunk, score
         RETURN chunk.text AS text, score
         ORDER BY score DESC",
    )
    .param("index_name", index_name)
    .param("top_k", top_k)
    .param("query_embedding", query_embedding)
    .returns("text", ColumnKind::Text)
    .returns("score", ColumnKind::Float)
}

pub fn count_by_label() -> Statement {
    Statement::new(
        COUNT_BY_LABEL,
        "MATCH (n) UNWIND labels(n) AS label
         RETURN label, count(*) AS count
         ORDER BY label",
    )
    .returns("label", ColumnKind::Text)
    .returns("count", ColumnKind::Int)
}
