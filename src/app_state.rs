use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::{
    config::AppConfig, graph_store::GraphStore, llm::EmbeddingProvider, rag::AnswerComposer,
    vector_store::Retriever,
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn GraphStore>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub retriever: Retriever,
    pub composer: Arc<AnswerComposer>,
    pub status: StatusHandle,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Status {
    pub is_busy: bool,
    pub message: String,
    pub progress: f32, // Valor entre 0.0 y 1.0
    pub updated_at: DateTime<Utc>,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            is_busy: false,
            message: "Servidor listo.".to_string(),
            progress: 0.0,
            updated_at: Utc::now(),
        }
    }
}

/// Estado de progreso compartido entre la ingesta en segundo plano y la API.
#[derive(Debug, Clone, Default)]
pub struct StatusHandle(Arc<Mutex<Status>>);

impl StatusHandle {
    pub fn snapshot(&self) -> Status {
        self.0.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn update(&self, message: impl Into<String>, progress: f32) {
        let mut status = self.0.lock().unwrap_or_else(|p| p.into_inner());
        status.message = message.into();
        status.progress = progress.clamp(0.0, 1.0);
        status.updated_at = Utc::now();
    }

    /// Marca el inicio de un trabajo. Devuelve `false` si ya había uno en curso.
    pub fn try_begin(&self, message: impl Into<String>) -> bool {
        let mut status = self.0.lock().unwrap_or_else(|p| p.into_inner());
        if status.is_busy {
            return false;
        }
        status.is_busy = true;
        status.message = message.into();
        status.progress = 0.0;
        status.updated_at = Utc::now();
        true
    }

    pub fn finish(&self, message: impl Into<String>) {
        let mut status = self.0.lock().unwrap_or_else(|p| p.into_inner());
        status.is_busy = false;
        status.message = message.into();
        status.progress = 0.0;
        status.updated_at = Utc::now();
    }
}
