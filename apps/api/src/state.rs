use std::sync::Arc;

use aws_sdk_s3::Client as S3Client;
use sqlx::PgPool;

use crate::cache::RedisCache;
use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::rag::embedding::EmbeddingService;
use crate::rag::splitter::TextSplitter;
use crate::rag::store::VectorStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// Sessions, conversation history, activity logs and search caches.
    pub cache: RedisCache,
    /// Markdown report exports.
    pub s3: S3Client,
    pub llm: LlmClient,
    /// Pluggable embedder. Remote when EMBEDDING_API_KEY is set, hash-based otherwise.
    pub embedder: Arc<dyn EmbeddingService>,
    pub store: VectorStore,
    pub splitter: TextSplitter,
    pub config: Config,
}
