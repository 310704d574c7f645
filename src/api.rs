use std::collections::BTreeMap;
use std::path::PathBuf;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::spawn;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    app_state::{AppState, Status},
    graph_store,
    ingest::{self, IngestSettings},
    models::SearchHit,
};

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(code: StatusCode, message: impl Into<String>) -> ApiError {
    (code, Json(json!({ "error": message.into() })))
}

// --- Payloads y Respuestas de la API ---

#[derive(Deserialize)]
pub struct RagQueryPayload {
    question: String,
}

#[derive(Serialize)]
pub struct RagQueryResponse {
    answer: String,
}

#[derive(Deserialize)]
pub struct SearchPayload {
    query: String,
    top_k: Option<usize>,
}

#[derive(Deserialize)]
pub struct IngestPayload {
    paths: Vec<PathBuf>,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/rag-query", post(rag_query_handler))
        .route("/api/search", post(search_handler))
        .route("/api/ingest", post(ingest_handler))
        .route("/api/status", get(status_handler))
        .route("/api/graph-stats", get(graph_stats_handler))
        .route("/api/health", get(health_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .with_state(app_state)
}

// --- Handlers ---

/// Nunca devuelve error HTTP por fallos de recuperación o del LLM: la
/// respuesta fija correspondiente va en `answer`.
#[axum::debug_handler]
async fn rag_query_handler(
    State(state): State<AppState>,
    Json(payload): Json<RagQueryPayload>,
) -> Result<Json<RagQueryResponse>, ApiError> {
    if payload.question.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "La pregunta está vacía."));
    }
    let answer = state.composer.answer(&payload.question).await;
    Ok(Json(RagQueryResponse { answer }))
}

#[axum::debug_handler]
async fn search_handler(
    State(state): State<AppState>,
    Json(payload): Json<SearchPayload>,
) -> Json<Vec<SearchHit>> {
    let top_k = payload.top_k.unwrap_or(state.config.similarity_top_k);
    Json(state.retriever.search(&payload.query, top_k).await)
}

#[axum::debug_handler]
async fn ingest_handler(
    State(state): State<AppState>,
    Json(payload): Json<IngestPayload>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.paths.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Debe indicar al menos un fichero JSON.",
        ));
    }
    let settings = IngestSettings::from_config(&state.config)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")))?;

    if !state.status.try_begin("Iniciando ingesta...") {
        return Err(api_error(
            StatusCode::CONFLICT,
            "Ya hay una ingesta en curso.",
        ));
    }

    let job_id = Uuid::new_v4().to_string();
    info!(job_id = %job_id, "Ingesta de {} ficheros lanzada.", payload.paths.len());

    let job = job_id.clone();
    spawn(async move {
        let summary = ingest::ingest_files(
            state.store.as_ref(),
            state.embedder.as_ref(),
            &payload.paths,
            &settings,
            &state.status,
        )
        .await;

        if summary.files_ingested == 0 {
            error!(job_id = %job, "La ingesta no procesó ningún fichero.");
            state
                .status
                .finish(format!("Error en la ingesta: ningún fichero procesado. {summary}"));
        } else {
            state.status.finish(format!("¡Ingesta completada! {summary}"));
        }
    });

    Ok((StatusCode::ACCEPTED, Json(json!({ "job_id": job_id }))))
}

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Json<Status> {
    Json(state.status.snapshot())
}

#[axum::debug_handler]
async fn graph_stats_handler(
    State(state): State<AppState>,
) -> Result<Json<BTreeMap<String, i64>>, ApiError> {
    graph_store::graph_stats(state.store.as_ref())
        .await
        .map(Json)
        .map_err(|e| {
            error!("Error consultando estadísticas del grafo: {e}");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })
}

#[axum::debug_handler]
async fn health_handler(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    match graph_store::verify_connectivity(state.store.as_ref()).await {
        Ok(()) => Ok(Json(json!({ "status": "ok", "backend": state.store.backend() }))),
        Err(e) => {
            error!("Error en el health check del grafo: {e}");
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

// --- Handler de Apagado ---

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    let sender = state
        .shutdown_sender
        .lock()
        .unwrap_or_else(|p| p.into_inner())
        .take();
    if let Some(sender) = sender {
        let _ = sender.send(());
    }
    StatusCode::OK
}
