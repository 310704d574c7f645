//! Ingesta de ficheros JSON de medicamentos en el grafo: grafo estructurado,
//! chunks con embeddings enlazados a su :Medicine e índice vectorial.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::{
    app_state::StatusHandle,
    chunking::{chunk_record, TextSplitter},
    config::AppConfig,
    graph_builder::{build_structured_graph, GraphBuildReport},
    graph_store::GraphStore,
    llm::EmbeddingProvider,
    models::{MedicineRecord, RecordChunk},
    statements,
    vector_store::{ensure_vector_index, VectorIndexSpec},
};

/// Resultado de ingerir un chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    Linked,
    /// El :Medicine propietario no existe: el chunk se descarta sin reintento.
    OwnerMissing,
    EmbeddingFailed(String),
    StoreFailed(String),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkIngestReport {
    pub linked: usize,
    pub owner_missing: usize,
    pub failed: usize,
}

impl ChunkIngestReport {
    fn record(&mut self, outcome: &ChunkOutcome) {
        match outcome {
            ChunkOutcome::Linked => self.linked += 1,
            ChunkOutcome::OwnerMissing => self.owner_missing += 1,
            ChunkOutcome::EmbeddingFailed(_) | ChunkOutcome::StoreFailed(_) => self.failed += 1,
        }
    }
}

/// Parámetros de la ingesta.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub splitter: TextSplitter,
    pub embed_concurrency: usize,
    pub index: VectorIndexSpec,
}

impl IngestSettings {
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        Ok(Self {
            splitter: TextSplitter::new(cfg.chunk_size, cfg.chunk_overlap)?,
            embed_concurrency: cfg.embed_concurrency,
            index: VectorIndexSpec::for_chunks(&cfg.vector_index_name, cfg.embedding_dimensions),
        })
    }
}

/// Resumen de los resultados de una operación de ingesta.
#[derive(Debug, Default, Clone, Serialize)]
pub struct IngestionSummary {
    pub files_scanned: u32,
    pub files_ingested: u32,
    pub files_skipped: u32,
    pub graph: GraphBuildReport,
    pub chunks: ChunkIngestReport,
    pub index_ready: bool,
}

/// Implementa cómo se mostrará el resumen como texto.
impl std::fmt::Display for IngestionSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Resumen: {} ficheros escaneados, {} ingeridos, {} omitidos. {} medicamentos ({} omitidos, {} con error). {} chunks enlazados, {} sin medicamento, {} con error.",
            self.files_scanned,
            self.files_ingested,
            self.files_skipped,
            self.graph.built,
            self.graph.skipped,
            self.graph.failed,
            self.chunks.linked,
            self.chunks.owner_missing,
            self.chunks.failed
        )
    }
}

/// Embebe y guarda cada chunk, enlazándolo al :Medicine que indica `owner_of`.
///
/// Los embeddings se piden con hasta `concurrency` llamadas en vuelo, pero en
/// el orden de entrada; las escrituras en el grafo son secuenciales. Un fallo
/// en un chunk se registra y se continúa con el siguiente.
pub async fn ingest_chunks<F>(
    store: &dyn GraphStore,
    embedder: &dyn EmbeddingProvider,
    chunks: &[RecordChunk],
    owner_of: F,
    concurrency: usize,
) -> ChunkIngestReport
where
    F: Fn(&RecordChunk) -> &str,
{
    let pending: Vec<_> = chunks
        .iter()
        .map(|chunk| embedder.embed_one(&chunk.text))
        .collect();
    let embeddings: Vec<Result<Vec<f64>>> = stream::iter(pending)
        .buffered(concurrency.max(1))
        .collect()
        .await;

    let mut report = ChunkIngestReport::default();
    for (chunk, embedding) in chunks.iter().zip(embeddings) {
        let owner = owner_of(chunk);
        let outcome = match embedding {
            Ok(vector) => store_chunk(store, chunk, owner, vector).await,
            Err(e) => ChunkOutcome::EmbeddingFailed(format!("{e:#}")),
        };

        match &outcome {
            ChunkOutcome::Linked => {
                info!(chunk_id = %chunk.chunk_id, medicine = %owner, "Chunk ingerido con embedding.")
            }
            ChunkOutcome::OwnerMissing => warn!(
                chunk_id = %chunk.chunk_id,
                medicine = %owner,
                "No se pudo enlazar el chunk: no existe el nodo :Medicine."
            ),
            ChunkOutcome::EmbeddingFailed(e) | ChunkOutcome::StoreFailed(e) => error!(
                chunk_id = %chunk.chunk_id,
                medicine = %owner,
                "Error ingiriendo el chunk: {e}"
            ),
        }
        report.record(&outcome);
    }
    report
}

async fn store_chunk(
    store: &dyn GraphStore,
    chunk: &RecordChunk,
    owner: &str,
    embedding: Vec<f64>,
) -> ChunkOutcome {
    match store
        .run(statements::merge_chunk(chunk, owner, embedding))
        .await
    {
        Ok(rows) if rows.iter().any(|r| r.text("chunkNodeId").is_ok()) => ChunkOutcome::Linked,
        Ok(_) => ChunkOutcome::OwnerMissing,
        Err(e) => ChunkOutcome::StoreFailed(e.to_string()),
    }
}

/// Lee un fichero JSON con una lista de registros.
pub async fn load_records(path: &Path) -> Result<Vec<MedicineRecord>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("No se pudo leer {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("No se pudo decodificar el JSON de {}", path.display()))
}

/// Ingiere un fichero ya parseado. Sólo se trocean los registros que el
/// constructor del grafo no ha omitido.
pub async fn ingest_records(
    store: &dyn GraphStore,
    embedder: &dyn EmbeddingProvider,
    records: &[MedicineRecord],
    settings: &IngestSettings,
) -> (GraphBuildReport, ChunkIngestReport) {
    let graph = build_structured_graph(store, records).await;

    let chunks: Vec<RecordChunk> = records
        .iter()
        .filter(|r| r.medicine_name().is_some())
        .flat_map(|r| chunk_record(r, &settings.splitter))
        .collect();

    if chunks.is_empty() {
        info!("No se generaron chunks para ingerir.");
        return (graph, ChunkIngestReport::default());
    }

    info!("Ingiriendo {} chunks con embeddings...", chunks.len());
    let report = ingest_chunks(
        store,
        embedder,
        &chunks,
        RecordChunk::owner_name,
        settings.embed_concurrency,
    )
    .await;
    (graph, report)
}

/// Pipeline completo sobre una lista de ficheros. Los errores de un fichero
/// se registran y no detienen el resto; el índice vectorial se asegura al final.
pub async fn ingest_files(
    store: &dyn GraphStore,
    embedder: &dyn EmbeddingProvider,
    paths: &[PathBuf],
    settings: &IngestSettings,
    status: &StatusHandle,
) -> IngestionSummary {
    let mut summary = IngestionSummary::default();
    let total_files = paths.len().max(1) as f32;

    for (index, path) in paths.iter().enumerate() {
        summary.files_scanned += 1;
        let progress = (index + 1) as f32 / total_files;
        status.update(
            format!("[{}/{}] Procesando: {}...", index + 1, paths.len(), path.display()),
            progress,
        );

        match ingest_file(store, embedder, path, settings).await {
            Ok(Some((graph, chunks))) => {
                summary.files_ingested += 1;
                summary.graph.built += graph.built;
                summary.graph.skipped += graph.skipped;
                summary.graph.failed += graph.failed;
                summary.chunks.linked += chunks.linked;
                summary.chunks.owner_missing += chunks.owner_missing;
                summary.chunks.failed += chunks.failed;
            }
            Ok(None) => {
                summary.files_skipped += 1;
                status.update(
                    format!("[{}/{}] Omitido: {}", index + 1, paths.len(), path.display()),
                    progress,
                );
            }
            Err(err) => {
                summary.files_skipped += 1;
                error!("Error ingiriendo {}: {err:#}", path.display());
                status.update(format!("ERROR en {}: {err:#}", path.display()), progress);
            }
        }
    }

    status.update("Asegurando el índice vectorial...", 1.0);
    match ensure_vector_index(store, &settings.index).await {
        Ok(_) => summary.index_ready = true,
        Err(e) => error!("Error creando el índice vectorial '{}': {e}", settings.index.name),
    }

    info!("{summary}");
    summary
}

async fn ingest_file(
    store: &dyn GraphStore,
    embedder: &dyn EmbeddingProvider,
    path: &Path,
    settings: &IngestSettings,
) -> Result<Option<(GraphBuildReport, ChunkIngestReport)>> {
    info!("--- Procesando fichero: {} ---", path.display());
    let records = load_records(path).await?;
    if records.is_empty() {
        warn!("No hay registros en {}", path.display());
        return Ok(None);
    }

    let (graph, chunks) = ingest_records(store, embedder, &records, settings).await;
    if graph.built == 0 && graph.failed > 0 {
        return Err(anyhow!(
            "Ningún registro de {} pudo escribirse en el grafo",
            path.display()
        ));
    }
    info!(
        "Ingerido {}: {} medicamentos, {} chunks enlazados.",
        path.display(),
        graph.built,
        chunks.linked
    );
    Ok(Some((graph, chunks)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryGraph;
    use async_trait::async_trait;

    struct LengthEmbedder;

    #[async_trait]
    impl EmbeddingProvider for LengthEmbedder {
        async fn embed_one(&self, text: &str) -> Result<Vec<f64>> {
            if text.contains("FAIL") {
                return Err(anyhow!("proveedor caído"));
            }
            Ok(vec![text.len() as f64, 1.0])
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    fn chunk(id: &str, owner: &str, text: &str) -> RecordChunk {
        RecordChunk {
            chunk_id: id.into(),
            seq: 0,
            text: text.into(),
            medicine_name_ref: owner.into(),
            source: "medicine_database".into(),
            start: 0,
            overlap: 0,
        }
    }

    #[tokio::test]
    async fn failures_are_reported_per_chunk() {
        let graph = MemoryGraph::new();
        let record = MedicineRecord {
            name: Some("Abdorin".into()),
            ..Default::default()
        };
        build_structured_graph(&graph, &[record]).await;

        let chunks = vec![
            chunk("a", "Abdorin", "ok"),
            chunk("b", "Ghost", "orphan"),
            chunk("c", "Abdorin", "FAIL"),
            chunk("d", "Abdorin", "also ok"),
        ];
        let report = ingest_chunks(&graph, &LengthEmbedder, &chunks, RecordChunk::owner_name, 2).await;

        assert_eq!(
            report,
            ChunkIngestReport { linked: 2, owner_missing: 1, failed: 1 }
        );
        assert!(graph.node("Chunk", "b").is_none());
        assert!(graph.node("Chunk", "c").is_none());
        assert_eq!(graph.relationship_count("HAS_CHUNK"), 2);
    }

    #[tokio::test]
    async fn owner_selector_is_honoured() {
        let graph = MemoryGraph::new();
        let record = MedicineRecord {
            name: Some("Napa".into()),
            ..Default::default()
        };
        build_structured_graph(&graph, &[record]).await;

        let chunks = vec![chunk("x", "Somebody Else", "text")];
        let report = ingest_chunks(&graph, &LengthEmbedder, &chunks, |_| "Napa", 1).await;
        assert_eq!(report.linked, 1);
        assert!(graph.has_relationship("HAS_CHUNK", ("Medicine", "Napa"), ("Chunk", "x")));
    }
}
