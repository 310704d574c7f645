//! Carga y gestión de configuración de la aplicación (grafo + LLM + pipeline).

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::chunking::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};

pub const DEFAULT_VECTOR_INDEX_NAME: &str = "medicine_chunks";
pub const DEFAULT_TOP_K: usize = 3;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAI,
    Ollama,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }

    fn default_embedding_model(&self) -> &'static str {
        match self {
            Self::OpenAI => "text-embedding-3-small",
            Self::Ollama => "mxbai-embed-large",
        }
    }

    fn default_chat_model(&self) -> &'static str {
        match self {
            Self::OpenAI => "gpt-4o-mini",
            Self::Ollama => "llama3",
        }
    }

    fn default_dimensions(&self) -> usize {
        match self {
            Self::OpenAI => 1536,
            Self::Ollama => 1024,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GraphBackend {
    Neo4j {
        uri: String,
        user: String,
        password: String,
        database: String,
    },
    Memory,
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub graph_backend: GraphBackend,
    pub server_addr: String,

    pub llm_provider: LlmProvider,
    pub llm_embedding_model: String,
    pub llm_chat_model: String,
    pub embedding_dimensions: usize,
    pub provider_timeout: Duration,

    pub vector_index_name: String,
    pub similarity_top_k: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embed_concurrency: usize,
    pub prompt_template_file: Option<PathBuf>,
    pub ingest_files: Vec<PathBuf>,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Igual que `from_env`, pero leyendo de una función arbitraria.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| get(key).ok_or_else(|| anyhow!("Falta {key} en el entorno"));

        let graph_backend = match get("GRAPH_BACKEND")
            .unwrap_or_else(|| "neo4j".to_string())
            .to_lowercase()
            .as_str()
        {
            "neo4j" => GraphBackend::Neo4j {
                uri: require("NEO4J_URI")?,
                user: get("NEO4J_USER")
                    .or_else(|| get("NEO4J_USERNAME"))
                    .ok_or_else(|| anyhow!("Falta NEO4J_USER en el entorno"))?,
                password: require("NEO4J_PASSWORD")?,
                database: get("NEO4J_DATABASE").unwrap_or_else(|| "neo4j".to_string()),
            },
            "memory" => GraphBackend::Memory,
            other => return Err(anyhow!("Backend de grafo no soportado: {other}")),
        };

        let server_addr = get("SERVER_ADDR").unwrap_or_else(|| "127.0.0.1:3322".to_string());

        let llm_provider =
            LlmProvider::from_str(&get("LLM_PROVIDER").unwrap_or_else(|| "ollama".to_string()))?;
        let llm_embedding_model = get("LLM_EMBEDDING_MODEL")
            .unwrap_or_else(|| llm_provider.default_embedding_model().to_string());
        let llm_chat_model = get("LLM_CHAT_MODEL")
            .unwrap_or_else(|| llm_provider.default_chat_model().to_string());

        let number = |key: &str, default: usize| -> Result<usize> {
            match get(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<usize>()
                    .with_context(|| format!("{key} debe ser un entero no negativo (valor: '{raw}')")),
                None => Ok(default),
            }
        };

        let embedding_dimensions =
            number("EMBEDDING_DIMENSIONS", llm_provider.default_dimensions())?;
        let provider_timeout = Duration::from_secs(number("PROVIDER_TIMEOUT_SECS", 60)? as u64);
        let similarity_top_k = number("SIMILARITY_TOP_K", DEFAULT_TOP_K)?;
        let chunk_size = number("CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?;
        let chunk_overlap = number("CHUNK_OVERLAP", DEFAULT_CHUNK_OVERLAP)?;
        let embed_concurrency = number("EMBED_CONCURRENCY", 1)?.max(1);

        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(anyhow!(
                "CHUNK_OVERLAP ({chunk_overlap}) debe ser menor que CHUNK_SIZE ({chunk_size})"
            ));
        }
        if embedding_dimensions == 0 {
            return Err(anyhow!("EMBEDDING_DIMENSIONS debe ser mayor que 0"));
        }

        let vector_index_name =
            get("VECTOR_INDEX_NAME").unwrap_or_else(|| DEFAULT_VECTOR_INDEX_NAME.to_string());
        let prompt_template_file = get("PROMPT_TEMPLATE_FILE").map(PathBuf::from);
        let ingest_files = get("INGEST_FILES")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(PathBuf::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            graph_backend,
            server_addr,
            llm_provider,
            llm_embedding_model,
            llm_chat_model,
            embedding_dimensions,
            provider_timeout,
            vector_index_name,
            similarity_top_k,
            chunk_size,
            chunk_overlap,
            embed_concurrency,
            prompt_template_file,
            ingest_files,
        })
    }
}
