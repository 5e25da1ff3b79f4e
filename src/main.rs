//! binsift server binary

use std::sync::Arc;

use anyhow::Context;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use binsift::api::create_app;
use binsift::config::{AppConfig, LogFormat};
use binsift::storage::{EmbeddingStore, MemoryDocumentRepository, MemoryEmbeddingStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;

    init_tracing(&config)?;

    let search_config = config.search_config()?;

    let (store, repository) = match &config.storage.data_dir {
        Some(dir) => {
            tracing::info!(data_dir = %dir, "Opening journaled stores");
            let store = MemoryEmbeddingStore::open(search_config.dimension, dir)
                .await
                .with_context(|| format!("failed to open embedding store in {}", dir))?;
            let repository = MemoryDocumentRepository::open(dir)
                .await
                .with_context(|| format!("failed to open document repository in {}", dir))?;
            (store, repository)
        }
        None => {
            tracing::warn!(
                "storage.data_dir not set; embeddings and documents will not survive a restart"
            );
            (
                MemoryEmbeddingStore::new(search_config.dimension)?,
                MemoryDocumentRepository::new(),
            )
        }
    };
    let embeddings: Arc<dyn EmbeddingStore> = Arc::new(store);
    embeddings
        .init()
        .await
        .context("failed to initialise embedding store")?;

    tracing::info!(
        dimension = search_config.dimension,
        scan_cap = search_config.scan_cap,
        candidate_factor = search_config.candidate_factor,
        rerank_factor = search_config.rerank_factor,
        embeddings = embeddings.count().await?,
        documents = repository.len().await,
        "Starting binsift"
    );

    let documents = Arc::new(repository);
    let router = create_app(search_config, embeddings, documents)?.layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    tracing::info!(%addr, "Listening for HTTP traffic");

    axum::serve(listener, router).await?;

    Ok(())
}

fn init_tracing(config: &AppConfig) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.logging.level.clone()))
        .unwrap_or_else(|_| EnvFilter::new("binsift=info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.logging.format {
        LogFormat::Json => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            registry.with(tracing_subscriber::fmt::layer()).init();
        }
    }

    Ok(())
}
