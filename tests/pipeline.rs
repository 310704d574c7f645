mod common;

use std::sync::Arc;

use common::*;
use medicine_graph_rag::{
    app_state::StatusHandle,
    chunking::TextSplitter,
    graph_store::{self, Value},
    ingest::{self, ingest_chunks},
    memory_store::MemoryGraph,
    models::RecordChunk,
    rag::{AnswerComposer, PromptTemplate, NO_CONTEXT_ANSWER},
    vector_store::{ensure_vector_index, Retriever},
};

#[tokio::test]
async fn ingests_a_file_end_to_end_and_answers() {
    let graph = Arc::new(MemoryGraph::new());
    let embedder = HashingEmbedder::new();
    let (_file, path) = json_file(MEDICINES);

    graph_store::ensure_schema(graph.as_ref()).await.unwrap();
    let summary = ingest::ingest_files(
        graph.as_ref(),
        embedder.as_ref(),
        &[path],
        &settings(),
        &StatusHandle::default(),
    )
    .await;

    assert_eq!(summary.files_ingested, 1);
    assert_eq!(summary.graph.built, 2);
    assert_eq!(summary.graph.skipped, 1);
    assert!(summary.index_ready);
    assert!(summary.chunks.linked > 2);
    assert_eq!(summary.chunks.owner_missing, 0);

    // Grafo estructurado
    let abdorin = graph.node("Medicine", "Abdorin").unwrap();
    assert_eq!(abdorin.get("is_tablet"), Some(&Value::Bool(true)));
    assert_eq!(abdorin.get("weight_mg"), Some(&Value::Int(500)));
    assert!(graph.has_relationship("PRODUCES", ("Manufacturer", "AcmeCo"), ("Medicine", "Abdorin")));
    assert!(graph.has_relationship(
        "INDICATED_FOR",
        ("Medicine", "Napa Extra"),
        ("Indication", "Fever")
    ));
    assert!(graph.has_relationship(
        "HAS_GENERIC",
        ("Medicine", "Napa Extra"),
        ("Generic", "Paracetamol")
    ));
    let napa = graph.node("Medicine", "Napa Extra").unwrap();
    assert_eq!(napa.get("is_syrup"), Some(&Value::Bool(true)));
    assert_eq!(napa.get("weight_mg"), Some(&Value::Text("665".into())));
    assert!(graph.node("Manufacturer", "Orphan Labs").is_none());
    assert!(graph.has_constraint("Chunk", "chunkId"));

    // Chunks enlazados
    assert!(graph.node("Chunk", "medicine-abdorin-chunk0000").is_some());
    assert!(graph.node("Chunk", "medicine-napa_extra-chunk0000").is_some());
    assert!(graph.has_relationship(
        "HAS_CHUNK",
        ("Medicine", "Abdorin"),
        ("Chunk", "medicine-abdorin-chunk0000")
    ));
    assert_eq!(graph.relationship_count("HAS_CHUNK"), graph.node_count("Chunk"));

    // Consulta
    let generator = CountingGenerator::new();
    let retriever = Retriever::new(graph.clone(), embedder.clone(), INDEX);
    let composer = AnswerComposer::new(retriever, generator.clone(), PromptTemplate::default(), 3);
    let answer = composer.answer("What is Abdorin used for? Acidity?").await;

    assert_eq!(answer, "Abdorin is indicated for acidity.");
    assert_eq!(generator.calls(), 1);
    let prompt = generator.prompts.lock().unwrap()[0].clone();
    assert!(prompt.contains("Chunk (Similarity: "));
    assert!(prompt.contains("Abdorin"));
    assert!(prompt.contains("User Question: What is Abdorin used for? Acidity?"));
}

#[tokio::test]
async fn single_antacid_record_builds_graph_and_linked_chunk() {
    let graph = MemoryGraph::new();
    let embedder = HashingEmbedder::new();
    let (_file, path) = json_file(
        r#"[{
            "Medicine Name": "Abdorin",
            "Therapeutic Class": "Antacid",
            "Indications": "Acidity",
            "Tablet": 1,
            "Manufacturer": "AcmeCo"
        }]"#,
    );
    let mut defaults = settings();
    defaults.splitter = TextSplitter::default();

    let summary = ingest::ingest_files(
        &graph,
        embedder.as_ref(),
        &[path],
        &defaults,
        &StatusHandle::default(),
    )
    .await;
    assert_eq!(summary.graph.built, 1);
    assert!(summary.chunks.linked >= 1);

    let medicine = graph.node("Medicine", "Abdorin").unwrap();
    assert_eq!(medicine.get("is_tablet"), Some(&Value::Bool(true)));
    for flag in ["is_syrup", "is_ointment", "is_drop", "is_injection"] {
        assert_eq!(medicine.get(flag), Some(&Value::Bool(false)), "{flag}");
    }
    assert_eq!(graph.node_count("Medicine"), 1);
    assert_eq!(graph.node_count("Manufacturer"), 1);
    assert!(graph.has_relationship("PRODUCES", ("Manufacturer", "AcmeCo"), ("Medicine", "Abdorin")));
    assert!(graph.has_relationship(
        "BELONGS_TO_CLASS",
        ("Medicine", "Abdorin"),
        ("TherapeuticClass", "Antacid")
    ));
    assert!(graph.has_relationship(
        "INDICATED_FOR",
        ("Medicine", "Abdorin"),
        ("Indication", "Acidity")
    ));

    let chunk = graph.node("Chunk", "medicine-abdorin-chunk0000").unwrap();
    let text = chunk.get("text").and_then(Value::as_text).unwrap();
    assert!(text.contains("Abdorin") && text.contains("Antacid"));
    assert!(graph.has_relationship(
        "HAS_CHUNK",
        ("Medicine", "Abdorin"),
        ("Chunk", "medicine-abdorin-chunk0000")
    ));
}

#[tokio::test]
async fn reingesting_is_idempotent_and_chunks_keep_first_content() {
    let graph = MemoryGraph::new();
    let embedder = HashingEmbedder::new();
    let status = StatusHandle::default();

    let (_first, first_path) = json_file(MEDICINES);
    ingest::ingest_files(&graph, embedder.as_ref(), &[first_path], &settings(), &status).await;
    // Con el splitter 120/30, los detalles de la indicación caen en el segundo chunk.
    let details_chunk = graph.node("Chunk", "medicine-abdorin-chunk0001").unwrap();
    let chunk_text = details_chunk.get("text").cloned().unwrap();
    let chunk_embedding = details_chunk.get("embedding").cloned().unwrap();
    assert!(chunk_text.as_text().unwrap().contains("Relief of heartburn"));
    let counts = graph_store::graph_stats(&graph).await.unwrap();
    let edges = graph.relationship_count("HAS_CHUNK");

    let changed = MEDICINES.replace("Relief of heartburn", "Easing of heartburn");
    let (_second, second_path) = json_file(&changed);
    ingest::ingest_files(&graph, embedder.as_ref(), &[second_path], &settings(), &status).await;

    assert_eq!(graph_store::graph_stats(&graph).await.unwrap(), counts);
    assert_eq!(graph.relationship_count("HAS_CHUNK"), edges);
    let kept = graph.node("Chunk", "medicine-abdorin-chunk0001").unwrap();
    assert_eq!(kept.get("text"), Some(&chunk_text));
    assert_eq!(kept.get("embedding"), Some(&chunk_embedding));
    let indication = graph.node("Indication", "Acidity").unwrap();
    assert_eq!(
        indication.get("details_summary"),
        Some(&Value::Text("Easing of heartburn and acid indigestion.".into()))
    );
}

#[tokio::test]
async fn orphan_chunks_are_dropped() {
    let graph = MemoryGraph::new();
    let embedder = HashingEmbedder::new();
    let chunk = RecordChunk {
        chunk_id: "medicine-ghost-chunk0000".into(),
        seq: 0,
        text: "Medicine Name: Ghost".into(),
        medicine_name_ref: "Ghost".into(),
        source: "medicine_database".into(),
        start: 0,
        overlap: 0,
    };

    let report = ingest_chunks(&graph, embedder.as_ref(), &[chunk], RecordChunk::owner_name, 1).await;

    assert_eq!(report.owner_missing, 1);
    assert_eq!(report.linked, 0);
    assert_eq!(graph.node_count("Chunk"), 0);
    assert_eq!(graph.relationship_count("HAS_CHUNK"), 0);
}

#[tokio::test]
async fn search_returns_top_k_in_descending_order() {
    let graph = Arc::new(MemoryGraph::new());
    let embedder = HashingEmbedder::new();
    let (_file, path) = json_file(MEDICINES);
    ingest::ingest_files(
        graph.as_ref(),
        embedder.as_ref(),
        &[path],
        &settings(),
        &StatusHandle::default(),
    )
    .await;

    let retriever = Retriever::new(graph.clone(), embedder.clone(), INDEX);
    let hits = retriever.search("Paracetamol fever headache", 2).await;
    assert_eq!(hits.len(), 2);
    assert!(hits[0].score >= hits[1].score);
    assert!(hits.iter().all(|h| (0.0..=1.0).contains(&h.score)));
    assert!(hits[0].text.contains("Fever") || hits[0].text.contains("Paracetamol"));

    assert!(retriever.search("anything", 0).await.is_empty());
    let all = retriever.search("Abdorin", 100).await;
    assert_eq!(all.len(), graph.node_count("Chunk"));
}

#[tokio::test]
async fn empty_index_answers_without_calling_the_generator() {
    let graph = Arc::new(MemoryGraph::new());
    ensure_vector_index(graph.as_ref(), &settings().index).await.unwrap();

    let generator = CountingGenerator::new();
    let retriever = Retriever::new(graph.clone(), HashingEmbedder::new(), INDEX);
    let composer = AnswerComposer::new(retriever, generator.clone(), PromptTemplate::default(), 3);

    assert_eq!(composer.answer("unrelated nonsense query").await, NO_CONTEXT_ANSWER);
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn missing_index_degrades_to_the_fallback_answer() {
    let graph = Arc::new(MemoryGraph::new());
    let generator = CountingGenerator::new();
    let retriever = Retriever::new(graph, HashingEmbedder::new(), "does_not_exist");
    let composer = AnswerComposer::new(retriever, generator.clone(), PromptTemplate::default(), 3);

    assert_eq!(composer.answer("Abdorin").await, NO_CONTEXT_ANSWER);
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn bad_files_are_skipped_and_the_rest_ingested() {
    let graph = MemoryGraph::new();
    let embedder = HashingEmbedder::new();
    let (_bad, bad_path) = json_file("{ not json");
    let (_empty, empty_path) = json_file("[]");
    let (_good, good_path) = json_file(MEDICINES);
    let missing = good_path.with_file_name("does-not-exist.json");

    let summary = ingest::ingest_files(
        &graph,
        embedder.as_ref(),
        &[bad_path, missing, empty_path, good_path],
        &settings(),
        &StatusHandle::default(),
    )
    .await;

    assert_eq!(summary.files_scanned, 4);
    assert_eq!(summary.files_skipped, 3);
    assert_eq!(summary.files_ingested, 1);
    assert!(summary.index_ready);
    assert_eq!(graph.node_count("Medicine"), 2);
}
