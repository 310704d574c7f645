//! Índice vectorial sobre `:Chunk(embedding)` y búsqueda semántica.
//!
//! API pública:
//!   - `ensure_vector_index(&dyn GraphStore, &VectorIndexSpec)`
//!   - `Retriever::search(&str, usize)`.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::graph_store::{GraphStore, StoreError};
use crate::llm::EmbeddingProvider;
use crate::models::SearchHit;
use crate::statements;

/// Definición de un índice vectorial coseno.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorIndexSpec {
    pub name: String,
    pub label: String,
    pub property: String,
    pub dimensions: usize,
}

impl VectorIndexSpec {
    pub fn new(name: &str, label: &str, property: &str, dimensions: usize) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            property: property.to_string(),
            dimensions,
        }
    }

    /// Índice por defecto del pipeline: `:Chunk(embedding)`.
    pub fn for_chunks(name: &str, dimensions: usize) -> Self {
        Self::new(name, "Chunk", "embedding", dimensions)
    }

    /// Nombre, etiqueta y propiedad acaban interpolados en DDL.
    pub fn validate(&self) -> Result<(), StoreError> {
        for ident in [&self.name, &self.label, &self.property] {
            let valid = !ident.is_empty()
                && ident
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if !valid {
                return Err(StoreError::InvalidIdentifier(ident.clone()));
            }
        }
        if self.dimensions == 0 {
            return Err(StoreError::InvalidIdentifier(format!(
                "{}: dimensiones = 0",
                self.name
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStatus {
    Created,
    AlreadyExists,
}

/// Garantiza que el índice vectorial exista. Idempotente: si otro proceso lo
/// crea a la vez, el error de esquema resultante se trata como "ya existe".
pub async fn ensure_vector_index(
    store: &dyn GraphStore,
    spec: &VectorIndexSpec,
) -> Result<IndexStatus, StoreError> {
    spec.validate()?;
    let index_name = &spec.name;

    let existing = store.run(statements::show_vector_index(index_name)).await?;
    if !existing.is_empty() {
        info!("Índice vectorial '{index_name}' ya existe.");
        return Ok(IndexStatus::AlreadyExists);
    }

    match store.run(statements::create_vector_index(spec)).await {
        Ok(_) => {
            info!(
                "Índice vectorial '{index_name}' creado sobre :{}({}) con {} dimensiones.",
                spec.label, spec.property, spec.dimensions
            );
            Ok(IndexStatus::Created)
        }
        Err(e) if e.is_already_exists() => {
            info!("Índice vectorial '{index_name}' creado por otro proceso.");
            Ok(IndexStatus::AlreadyExists)
        }
        Err(e) => Err(e),
    }
}

/// Búsqueda vectorial sobre los chunks. Nunca falla: cualquier error del
/// proveedor o del almacén se registra y se devuelve una lista vacía.
#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn GraphStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    index_name: String,
}

impl Retriever {
    pub fn new(
        store: Arc<dyn GraphStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        index_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            embedder,
            index_name: index_name.into(),
        }
    }

    /// Los `top_k` chunks más similares, ordenados por score descendente.
    pub async fn search(&self, query_text: &str, top_k: usize) -> Vec<SearchHit> {
        if top_k == 0 {
            return Vec::new();
        }

        // 1) Embedding de la query
        let query_vec = match self.embedder.embed_one(query_text).await {
            Ok(v) => v,
            Err(e) => {
                warn!("No se pudo generar el embedding de la consulta: {e:#}");
                return Vec::new();
            }
        };

        // 2) Vector search
        let rows = match self
            .store
            .run(statements::vector_search(&self.index_name, top_k, query_vec))
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                error!(
                    index = %self.index_name,
                    "Error en la búsqueda vectorial: {e}. ¿Está creado y poblado el índice?"
                );
                return Vec::new();
            }
        };

        // 3) Filas → (texto, score)
        let mut hits = Vec::with_capacity(rows.len());
        for row in rows {
            match (row.text("text"), row.float("score")) {
                (Ok(text), Ok(score)) => hits.push(SearchHit { text, score }),
                _ => warn!("Fila de búsqueda vectorial sin texto o score; se descarta."),
            }
        }
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        hits
    }
}
