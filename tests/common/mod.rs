#![allow(dead_code)]

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use medicine_graph_rag::{
    chunking::TextSplitter,
    ingest::IngestSettings,
    llm::{EmbeddingProvider, GenerationProvider},
    vector_store::VectorIndexSpec,
};
use tempfile::NamedTempFile;

pub const DIMS: usize = 32;
pub const INDEX: &str = "medicine_chunks";

/// Bolsa de palabras con hash FNV: textos que comparten palabras quedan cerca.
pub struct HashingEmbedder {
    pub calls: AtomicUsize,
}

impl HashingEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

pub fn embed(text: &str) -> Vec<f64> {
    let mut vector = vec![0.0; DIMS];
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in token.to_lowercase().bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        vector[(hash % DIMS as u64) as usize] += 1.0;
    }
    vector
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    async fn embed_one(&self, text: &str) -> Result<Vec<f64>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(embed(text))
    }

    fn dimensions(&self) -> usize {
        DIMS
    }
}

/// Devuelve siempre la misma respuesta y cuenta las llamadas.
pub struct CountingGenerator {
    pub calls: AtomicUsize,
    pub prompts: std::sync::Mutex<Vec<String>>,
}

impl CountingGenerator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            prompts: std::sync::Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationProvider for CountingGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok("Abdorin is indicated for acidity.".to_string())
    }
}

pub fn settings() -> IngestSettings {
    IngestSettings {
        splitter: TextSplitter::new(120, 30).unwrap(),
        embed_concurrency: 3,
        index: VectorIndexSpec::for_chunks(INDEX, DIMS),
    }
}

pub fn json_file(contents: &str) -> (NamedTempFile, PathBuf) {
    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    let path = file.path().to_path_buf();
    (file, path)
}

pub const MEDICINES: &str = r#"[
  {
    "Medicine Name": "Abdorin",
    "Generics indicated": null,
    "Therapeutic Class": "Antacid",
    "Indications": "Acidity",
    "Indications Details": "Relief of heartburn and acid indigestion.",
    "Weight (mg)": 500,
    "Weight (ml/other)": null,
    "Tablet": 1,
    "Syrup": 0,
    "Ointment": 0,
    "Drop": 0,
    "Injection": 0,
    "Manufacturer": "AcmeCo"
  },
  {
    "Medicine Name": "Napa Extra",
    "Generics indicated": "Paracetamol",
    "Therapeutic Class": "Analgesic",
    "Indications": " Fever ",
    "Indications Details": "Fever, headache and mild pain.",
    "Weight (mg)": "665",
    "Tablet": 1,
    "Syrup": "1",
    "Manufacturer": "Beximco"
  },
  {
    "Generics indicated": "Unnamed",
    "Manufacturer": "Orphan Labs"
  }
]"#;
