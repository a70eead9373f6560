mod activity;
mod cache;
mod config;
mod db;
mod errors;
mod exam;
mod interview;
mod llm_client;
mod models;
mod qna;
mod rag;
mod report;
mod routes;
mod state;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cache::RedisCache;
use crate::config::Config;
use crate::db::create_pool;
use crate::llm_client::LlmClient;
use crate::rag::embedding::{
    CachedEmbeddingService, EmbeddingService, HashEmbeddingService, RemoteEmbeddingService,
};
use crate::rag::splitter::TextSplitter;
use crate::rag::store::VectorStore;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Mentor API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config).await?;

    // Initialize Redis
    let cache = RedisCache::connect(&config.redis_url).await?;

    // Initialize S3 / MinIO
    let s3 = build_s3_client(&config).await;
    info!("S3 client initialized");

    // Initialize LLM client
    let llm = LlmClient::from_config(&config)?;
    if llm.is_configured() {
        info!("LLM client initialized (model: {})", llm.model());
    } else {
        warn!("No LLM API key configured; AI endpoints will answer 503");
    }

    let embedder = build_embedder(&config, cache.clone())?;
    info!(
        "Embedding service: {} ({} dims)",
        embedder.model_name(),
        embedder.dimensions()
    );

    let store = VectorStore::new(db.clone(), cache.clone(), config.cache_ttl_secs());
    let splitter = TextSplitter::new(config.chunk_size, config.chunk_overlap);

    // Build app state
    let state = AppState {
        db,
        cache,
        s3,
        llm,
        embedder,
        store,
        splitter,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict allowed origins once the web UI has a fixed host

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Remote embeddings when an API key is configured, local hash vectors
/// otherwise. Both sit behind the Redis embedding cache.
fn build_embedder(config: &Config, cache: RedisCache) -> Result<Arc<dyn EmbeddingService>> {
    match &config.embedding_api_key {
        Some(key) => {
            let remote = RemoteEmbeddingService::new(
                key.clone(),
                &config.embedding_api_base,
                config.embedding_model.clone(),
                config.vector_dimension,
            )?;
            Ok(Arc::new(CachedEmbeddingService::new(remote, cache)))
        }
        None => {
            warn!("EMBEDDING_API_KEY not set; using local hash embeddings");
            let local = HashEmbeddingService::new(config.vector_dimension);
            Ok(Arc::new(CachedEmbeddingService::new(local, cache)))
        }
    }
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "mentor-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}
