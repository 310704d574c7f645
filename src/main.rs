use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use axum::Router;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use medicine_graph_rag::{
    api,
    app_state::{AppState, StatusHandle},
    config::{AppConfig, GraphBackend},
    graph_store::{self, GraphStore},
    ingest::{self, IngestSettings},
    llm::{EmbeddingProvider, GenerationProvider, LlmManager},
    memory_store::MemoryGraph,
    neo4j_client,
    rag::{AnswerComposer, PromptTemplate},
    vector_store::{ensure_vector_index, Retriever},
};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Cargar configuración
    let cfg = AppConfig::from_env().context("Error al cargar la configuración")?;

    // 3. Conectar al grafo, comprobar conectividad y asegurar esquema
    let store: Arc<dyn GraphStore> = match &cfg.graph_backend {
        GraphBackend::Neo4j {
            uri,
            user,
            password,
            database,
        } => Arc::new(
            neo4j_client::connect_from_config(uri, user, password, database)
                .await
                .context("Error conectando a Neo4j")?,
        ),
        GraphBackend::Memory => {
            warn!("Usando el grafo en memoria: los datos no se persisten.");
            Arc::new(MemoryGraph::new())
        }
    };
    graph_store::verify_connectivity(store.as_ref())
        .await
        .context("El almacén de grafo no responde")?;
    graph_store::ensure_schema(store.as_ref())
        .await
        .context("Error asegurando el esquema del grafo")?;

    // 4. Inicializar gestor de LLMs
    let llm = Arc::new(LlmManager::from_config(&cfg).context("Error inicializando LLM Manager")?);
    let embedder: Arc<dyn EmbeddingProvider> = llm.clone();
    let generator: Arc<dyn GenerationProvider> = llm;

    // 5. Ingesta inicial (opcional) e índice vectorial
    let status = StatusHandle::default();
    let settings = IngestSettings::from_config(&cfg)?;
    if cfg.ingest_files.is_empty() {
        ensure_vector_index(store.as_ref(), &settings.index)
            .await
            .context("Error asegurando el índice vectorial")?;
    } else {
        status.try_begin("Ingesta inicial...");
        let summary = ingest::ingest_files(
            store.as_ref(),
            embedder.as_ref(),
            &cfg.ingest_files,
            &settings,
            &status,
        )
        .await;
        status.finish(format!("Ingesta inicial completada. {summary}"));
        if !summary.index_ready {
            error!("El índice vectorial no está disponible; las consultas no devolverán contexto.");
        }
    }

    // 6. Plantilla de prompt y compositor de respuestas
    let template = match &cfg.prompt_template_file {
        Some(path) => PromptTemplate::from_file(path).await?,
        None => PromptTemplate::default(),
    };
    let retriever = Retriever::new(store.clone(), embedder.clone(), &cfg.vector_index_name);
    let composer = AnswerComposer::new(
        retriever.clone(),
        generator,
        template,
        cfg.similarity_top_k,
    );

    // Crear canal para la señal de apagado.
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    // 7. Crear estado compartido de la aplicación
    let app_state = AppState {
        config: cfg.clone(),
        store,
        embedder,
        retriever,
        composer: Arc::new(composer),
        status,
        shutdown_sender: Arc::new(Mutex::new(Some(shutdown_tx))),
    };

    // 8. Configurar el router de la API
    let app = Router::new().merge(api::create_router(app_state)).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    );

    // 9. Iniciar el servidor
    let listener = tokio::net::TcpListener::bind(&cfg.server_addr)
        .await
        .with_context(|| format!("No se pudo escuchar en {}", cfg.server_addr))?;
    info!("🚀 Servidor escuchando en http://{}", cfg.server_addr);

    // Configurar el apagado ordenado.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}
