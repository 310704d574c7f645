//! Respuesta a preguntas sobre el grafo de medicamentos (RAG).
//!
//! Flujo:
//!   1. Búsqueda vectorial sobre :Chunk(embedding) con el `Retriever`.
//!   2. Sin resultados → respuesta fija, sin llamar al LLM.
//!   3. Construcción del bloque de contexto y renderizado de la plantilla.
//!   4. El LLM responde; si falla, se devuelve la respuesta fija de error.

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::{error, info};

use crate::{llm::GenerationProvider, models::SearchHit, vector_store::Retriever};

pub const NO_CONTEXT_ANSWER: &str =
    "I could not find relevant information in the knowledge graph to answer your question.";
pub const GENERATION_ERROR_ANSWER: &str =
    "There was an error processing your question with the language model.";

pub const DEFAULT_QA_TEMPLATE: &str = r#"
You are a helpful AI assistant. Your task is to answer the user's question based *only* on the provided context retrieved from a knowledge graph.
The context consists of text chunks from documents related to medicines and its attributes such as Medicine, Generic, TherapeuticClass, Indication, Manufacturer.
If the context does not contain enough information to answer the question, state that clearly (e.g., "Based on the provided context, I cannot answer this question.").
Do not make up information or use external knowledge.
Be concise and directly answer the question.

Provided Context:
---
{context}
---

User Question: {question}

Answer:
"#;

const CONTEXT_SLOT: &str = "{context}";
const QUESTION_SLOT: &str = "{question}";
const CHUNK_SEPARATOR: &str = "\n\n---\n\n";

/// Plantilla de prompt con los huecos `{context}` y `{question}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    text: String,
}

impl PromptTemplate {
    pub fn parse(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        for slot in [CONTEXT_SLOT, QUESTION_SLOT] {
            if !text.contains(slot) {
                return Err(anyhow!("La plantilla de prompt no contiene {slot}"));
            }
        }
        Ok(Self { text })
    }

    pub async fn from_file(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("No se pudo leer la plantilla {}", path.display()))?;
        Self::parse(text)
    }

    /// Sustituye los huecos en una sola pasada: las llaves que aparezcan en
    /// el contexto o en la pregunta no se vuelven a interpretar.
    pub fn render(&self, context: &str, question: &str) -> String {
        let mut out = String::with_capacity(self.text.len() + context.len() + question.len());
        let mut rest = self.text.as_str();
        while let Some(pos) = rest.find('{') {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            if let Some(after) = tail.strip_prefix(CONTEXT_SLOT) {
                out.push_str(context);
                rest = after;
            } else if let Some(after) = tail.strip_prefix(QUESTION_SLOT) {
                out.push_str(question);
                rest = after;
            } else {
                out.push('{');
                rest = &tail[1..];
            }
        }
        out.push_str(rest);
        out
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            text: DEFAULT_QA_TEMPLATE.to_string(),
        }
    }
}

/// Bloque de contexto: un fragmento por resultado, en orden de ranking.
pub fn build_context(hits: &[SearchHit]) -> String {
    hits.iter()
        .map(|hit| format!("Chunk (Similarity: {:.4}):\n{}", hit.score, hit.text))
        .collect::<Vec<_>>()
        .join(CHUNK_SEPARATOR)
}

/// Compone respuestas a partir de los chunks recuperados y el LLM.
pub struct AnswerComposer {
    retriever: Retriever,
    generator: Arc<dyn GenerationProvider>,
    template: PromptTemplate,
    top_k: usize,
}

impl AnswerComposer {
    pub fn new(
        retriever: Retriever,
        generator: Arc<dyn GenerationProvider>,
        template: PromptTemplate,
        top_k: usize,
    ) -> Self {
        Self {
            retriever,
            generator,
            template,
            top_k,
        }
    }

    /// Siempre devuelve texto: los fallos de recuperación o de generación se
    /// traducen a las respuestas fijas.
    pub async fn answer(&self, question: &str) -> String {
        info!("Pregunta recibida: {question}");
        let hits = self.retriever.search(question, self.top_k).await;
        if hits.is_empty() {
            info!("Sin contexto relevante para la pregunta.");
            return NO_CONTEXT_ANSWER.to_string();
        }

        let context = build_context(&hits);
        let prompt = self.template.render(&context, question);
        match self.generator.generate(&prompt).await {
            Ok(answer) => answer,
            Err(e) => {
                error!("Error generando la respuesta: {e:#}");
                GENERATION_ERROR_ANSWER.to_string()
            }
        }
    }
}
