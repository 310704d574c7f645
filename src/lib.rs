// Módulos de la aplicación
pub mod api;
pub mod app_state;
pub mod chunking;
pub mod config;
pub mod graph_builder;
pub mod graph_store;
pub mod ingest;
pub mod llm;
pub mod memory_store;
pub mod models;
pub mod neo4j_client;
pub mod rag;
pub mod statements;
pub mod vector_store;
