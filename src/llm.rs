//! Proveedores externos de embeddings y de generación.
//!
//! `EmbeddingProvider` y `GenerationProvider` son las dos interfaces estrechas
//! que usa el pipeline; `LlmManager` las implementa sobre Rig (Ollama u
//! OpenAI) con un timeout acotado por llamada.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rig::client::{CompletionClient as _, EmbeddingsClient as _};
use rig::completion::Prompt;
use rig::embeddings::EmbeddingModel;
use rig::providers::{ollama, openai};

use crate::config::{AppConfig, LlmProvider};

/// Texto → vector de dimensión fija.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed_one(&self, text: &str) -> Result<Vec<f64>>;

    /// Por defecto, una llamada por texto y en orden.
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed_one(text).await?);
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize;
}

/// Prompt renderizado → respuesta en lenguaje natural.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Cliente Rig compartido, creado una sola vez al arrancar.
#[derive(Clone)]
enum RigClient {
    OpenAI(openai::Client),
    Ollama(ollama::Client),
}

/// Gestor de LLMs y embeddings.
#[derive(Clone)]
pub struct LlmManager {
    provider: LlmProvider,
    client: RigClient,
    embedding_model: String,
    chat_model: String,
    dimensions: usize,
    timeout: Duration,
}

impl std::fmt::Debug for LlmManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmManager")
            .field("provider", &self.provider)
            .field("embedding_model", &self.embedding_model)
            .field("chat_model", &self.chat_model)
            .field("dimensions", &self.dimensions)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        let client = match cfg.llm_provider {
            LlmProvider::OpenAI => {
                if std::env::var("OPENAI_API_KEY").is_err() {
                    return Err(anyhow!("Falta OPENAI_API_KEY en el entorno"));
                }
                RigClient::OpenAI(openai::Client::from_env())
            }
            // Rig lee OLLAMA_API_BASE_URL (por defecto http://localhost:11434).
            LlmProvider::Ollama => RigClient::Ollama(ollama::Client::from_env()),
        };

        Ok(Self {
            provider: cfg.llm_provider.clone(),
            client,
            embedding_model: cfg.llm_embedding_model.clone(),
            chat_model: cfg.llm_chat_model.clone(),
            dimensions: cfg.embedding_dimensions,
            timeout: cfg.provider_timeout,
        })
    }

    async fn with_timeout<T>(
        &self,
        what: &str,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.timeout, fut).await.map_err(|_| {
            anyhow!(
                "Tiempo agotado ({:?}) esperando al proveedor {:?} ({what})",
                self.timeout,
                self.provider
            )
        })?
    }

    // ---------------------------------------------------------------------
    // EMBEDDINGS
    // ---------------------------------------------------------------------

    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f64>>> {
        let expected = texts.len();
        let vectors = match &self.client {
            RigClient::OpenAI(client) => {
                let model = client.embedding_model(&self.embedding_model);
                model.embed_texts(texts).await?
            }
            RigClient::Ollama(client) => {
                let model = client.embedding_model_with_ndims(&self.embedding_model, self.dimensions);
                model.embed_texts(texts).await?
            }
        };

        if vectors.len() != expected {
            return Err(anyhow!(
                "Número de embeddings ({}) distinto al número de textos ({})",
                vectors.len(),
                expected
            ));
        }
        Ok(vectors.into_iter().map(|e| e.vec).collect())
    }

    // ---------------------------------------------------------------------
    // CHAT / COMPLETION
    // ---------------------------------------------------------------------

    async fn complete(&self, prompt: &str) -> Result<String> {
        let answer = match &self.client {
            RigClient::OpenAI(client) => {
                let agent = client.agent(&self.chat_model).build();
                agent.prompt(prompt).await?
            }
            RigClient::Ollama(client) => {
                let agent = client.agent(&self.chat_model).build();
                agent.prompt(prompt).await?
            }
        };
        Ok(answer)
    }
}

#[async_trait]
impl EmbeddingProvider for LlmManager {
    async fn embed_one(&self, text: &str) -> Result<Vec<f64>> {
        let mut vectors = self
            .with_timeout("embedding", self.embed_texts(vec![text.to_string()]))
            .await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow!("El proveedor no devolvió ningún embedding"))
    }

    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f64>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.with_timeout("embedding por lotes", self.embed_texts(texts.to_vec()))
            .await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[async_trait]
impl GenerationProvider for LlmManager {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.with_timeout("generación", self.complete(prompt)).await
    }
}
