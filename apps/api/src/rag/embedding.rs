//! Embeddings: text vectorisation behind a pluggable trait.
//!
//! `RemoteEmbeddingService` calls an OpenAI-compatible `/embeddings` endpoint.
//! `HashEmbeddingService` is a deterministic offline fallback used when no
//! embedding key is configured. Either can be wrapped in
//! `CachedEmbeddingService` to reuse vectors through Redis.
//!
//! `AppState` holds an `Arc<dyn EmbeddingService>`, chosen at startup via config.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::{digest, RedisCache};
use crate::errors::AppError;

/// Maximum texts per remote batch request.
const MAX_BATCH_SIZE: usize = 32;
const MAX_RETRIES: u32 = 3;
const BACKOFF_BASE_MS: u64 = 1000;
const REQUEST_TIMEOUT_SECS: u64 = 30;
/// Cached vectors live for one hour.
pub const EMBEDDING_CACHE_TTL_SECS: u64 = 3600;

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait EmbeddingService: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError>;

    /// Embeds many texts; output order matches input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError>;

    fn dimensions(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// Cosine similarity; 0.0 on length mismatch or a zero vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

// ────────────────────────────────────────────────────────────────────────────
// RemoteEmbeddingService
// ────────────────────────────────────────────────────────────────────────────

pub struct RemoteEmbeddingService {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
    dimensions: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

/// Models that cannot shorten their output reject a `dimensions` parameter.
fn requested_dimensions(model: &str, dimensions: usize) -> Option<usize> {
    if model.contains("ada-002") {
        None
    } else {
        Some(dimensions)
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

impl RemoteEmbeddingService {
    pub fn new(
        api_key: String,
        api_base: &str,
        model: String,
        dimensions: usize,
    ) -> Result<Self, AppError> {
        if api_key.trim().is_empty() {
            return Err(AppError::Validation("Embedding API key cannot be empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Embedding(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            api_base: api_base.trim_end_matches('/').to_string(),
            model,
            dimensions,
        })
    }

    async fn call_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        let mut attempt = 0;
        loop {
            match self.call_api(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(RetryableOr::Retryable(msg)) if attempt + 1 < MAX_RETRIES => {
                    let backoff_ms = BACKOFF_BASE_MS * 2_u64.pow(attempt);
                    warn!(
                        "Embedding call failed ({msg}), retrying after {backoff_ms}ms (attempt {}/{MAX_RETRIES})",
                        attempt + 1
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    attempt += 1;
                }
                Err(RetryableOr::Retryable(msg)) | Err(RetryableOr::Fatal(msg)) => {
                    return Err(AppError::Embedding(msg))
                }
            }
        }
    }

    async fn call_api(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetryableOr> {
        debug!("Embedding {} texts with {}", texts.len(), self.model);

        let response = self
            .client
            .post(format!("{}/embeddings", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
                dimensions: requested_dimensions(&self.model, self.dimensions),
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RetryableOr::Retryable(e.to_string())
                } else {
                    RetryableOr::Fatal(e.to_string())
                }
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(RetryableOr::Retryable(format!("status {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RetryableOr::Fatal(format!("status {status}: {body}")));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| RetryableOr::Fatal(format!("invalid embedding response: {e}")))?;

        order_by_index(parsed.data, texts.len(), self.dimensions).map_err(RetryableOr::Fatal)
    }
}

enum RetryableOr {
    Retryable(String),
    Fatal(String),
}

/// Re-orders provider results by `index`, validating count and dimensions.
fn order_by_index(
    mut data: Vec<EmbeddingData>,
    expected: usize,
    dimensions: usize,
) -> Result<Vec<Vec<f32>>, String> {
    if data.len() != expected {
        return Err(format!("expected {expected} embeddings, got {}", data.len()));
    }
    data.sort_by_key(|d| d.index);
    data.into_iter()
        .map(|d| {
            if d.embedding.len() == dimensions {
                Ok(d.embedding)
            } else {
                Err(format!(
                    "expected {dimensions} dimensions, got {}",
                    d.embedding.len()
                ))
            }
        })
        .collect()
}

#[async_trait]
impl EmbeddingService for RemoteEmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| AppError::Embedding("provider returned no embedding".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(AppError::Validation("Cannot embed empty text".into()));
        }
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH_SIZE) {
            out.extend(self.call_with_retry(batch).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ────────────────────────────────────────────────────────────────────────────
// HashEmbeddingService
// ────────────────────────────────────────────────────────────────────────────

/// Bag-of-words vectors built from MD5 word hashes. Deterministic across
/// builds, so stored vectors stay comparable after upgrades.
pub struct HashEmbeddingService {
    dimensions: usize,
}

impl HashEmbeddingService {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn vectorize(&self, text: &str) -> Vec<f32> {
        let normalized = text.to_lowercase();
        let words: Vec<&str> = normalized.split_whitespace().collect();
        let dim = self.dimensions as u64;
        let mut embedding = vec![0.0f32; self.dimensions];

        for (pos, word) in words.iter().enumerate() {
            let hash = stable_hash(word);
            // Earlier words weigh more.
            let weight = 1.0 / (pos as f32 + 1.0);
            embedding[(hash % dim) as usize] += weight;
            embedding[((hash >> 16) % dim) as usize] += weight * 0.7;
            embedding[((hash >> 32) % dim) as usize] += weight * 0.5;
        }

        for pair in words.windows(2) {
            let hash = stable_hash(&format!("{} {}", pair[0], pair[1]));
            embedding[(hash % dim) as usize] += 0.8;
        }

        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for v in embedding.iter_mut() {
                *v /= magnitude;
            }
        }
        embedding
    }
}

fn stable_hash(s: &str) -> u64 {
    let d = md5::compute(s.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&d.0[..8]);
    u64::from_le_bytes(bytes)
}

#[async_trait]
impl EmbeddingService for HashEmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        Ok(self.vectorize(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        "local-hash"
    }
}

// ────────────────────────────────────────────────────────────────────────────
// CachedEmbeddingService
// ────────────────────────────────────────────────────────────────────────────

/// Redis read-through cache in front of another embedding service.
/// Cache failures degrade to direct calls.
pub struct CachedEmbeddingService<E> {
    inner: E,
    cache: RedisCache,
    ttl_secs: u64,
}

impl<E: EmbeddingService> CachedEmbeddingService<E> {
    pub fn new(inner: E, cache: RedisCache) -> Self {
        Self {
            inner,
            cache,
            ttl_secs: EMBEDDING_CACHE_TTL_SECS,
        }
    }

    fn key(&self, text: &str) -> String {
        embedding_cache_key(self.inner.model_name(), text)
    }

    async fn lookup(&self, key: &str) -> Option<Vec<f32>> {
        match self.cache.get_json::<Vec<f32>>(key).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!("Embedding cache read failed: {e}");
                None
            }
        }
    }

    async fn store(&self, key: &str, vector: &[f32]) {
        if let Err(e) = self.cache.set_json(key, &vector, self.ttl_secs).await {
            warn!("Embedding cache write failed: {e}");
        }
    }
}

/// Fills the cache-miss slots with freshly embedded vectors, in input order.
fn merge_batch(
    mut slots: Vec<Option<Vec<f32>>>,
    misses: &[usize],
    fresh: Vec<Vec<f32>>,
) -> Result<Vec<Vec<f32>>, AppError> {
    if fresh.len() != misses.len() {
        return Err(AppError::Embedding(format!(
            "expected {} embeddings, got {}",
            misses.len(),
            fresh.len()
        )));
    }
    for (&i, vector) in misses.iter().zip(fresh) {
        slots[i] = Some(vector);
    }
    slots
        .into_iter()
        .map(|s| s.ok_or_else(|| AppError::Embedding("missing embedding in batch".into())))
        .collect()
}

pub fn embedding_cache_key(model: &str, text: &str) -> String {
    format!("embedding:{}", digest(format!("{model}:{text}")))
}

#[async_trait]
impl<E: EmbeddingService> EmbeddingService for CachedEmbeddingService<E> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        let key = self.key(text);
        if let Some(hit) = self.lookup(&key).await {
            return Ok(hit);
        }
        let vector = self.inner.embed(text).await?;
        self.store(&key, &vector).await;
        Ok(vector)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        let mut slots: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        let mut misses: Vec<usize> = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            let hit = self.lookup(&self.key(text)).await;
            if hit.is_none() {
                misses.push(i);
            }
            slots.push(hit);
        }

        if !misses.is_empty() {
            debug!("Embedding cache: {} hits, {} misses", texts.len() - misses.len(), misses.len());
            let to_embed: Vec<String> = misses.iter().map(|&i| texts[i].clone()).collect();
            let fresh = self.inner.embed_batch(&to_embed).await?;
            for (&i, vector) in misses.iter().zip(&fresh) {
                self.store(&self.key(&texts[i]), vector).await;
            }
            return merge_batch(slots, &misses, fresh);
        }

        merge_batch(slots, &[], Vec::new())
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        let c = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&a, &c).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_hash_embedding_is_normalized_and_deterministic() {
        let svc = HashEmbeddingService::new(64);
        let v1 = svc.vectorize("Rust ownership and borrowing");
        let v2 = svc.vectorize("rust OWNERSHIP and borrowing");
        assert_eq!(v1.len(), 64);
        assert_eq!(v1, v2);
        let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hash_embedding_ranks_related_text_higher() {
        let svc = HashEmbeddingService::new(256);
        let query = svc.vectorize("tcp congestion control");
        let related = svc.vectorize("tcp congestion control algorithms like cubic");
        let unrelated = svc.vectorize("french verb conjugation tables");
        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn test_hash_embedding_of_empty_text_is_zero() {
        let svc = HashEmbeddingService::new(8);
        assert!(svc.vectorize("   ").iter().all(|&x| x == 0.0));
    }

    #[tokio::test]
    async fn test_hash_batch_preserves_order() {
        let svc = HashEmbeddingService::new(32);
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let batch = svc.embed_batch(&texts).await.unwrap();
        assert_eq!(batch[0], svc.vectorize("alpha"));
        assert_eq!(batch[1], svc.vectorize("beta"));
    }

    #[test]
    fn test_order_by_index_reorders_and_validates() {
        let data = vec![
            EmbeddingData {
                embedding: vec![2.0, 2.0],
                index: 1,
            },
            EmbeddingData {
                embedding: vec![1.0, 1.0],
                index: 0,
            },
        ];
        let ordered = order_by_index(data, 2, 2).unwrap();
        assert_eq!(ordered, vec![vec![1.0, 1.0], vec![2.0, 2.0]]);

        let short = vec![EmbeddingData {
            embedding: vec![1.0],
            index: 0,
        }];
        assert!(order_by_index(short, 1, 2).is_err());
    }

    #[test]
    fn test_request_carries_configured_dimensions() {
        let input = vec!["hi".to_string()];
        let body = serde_json::to_value(EmbeddingRequest {
            model: "text-embedding-3-small",
            input: &input,
            dimensions: requested_dimensions("text-embedding-3-small", 384),
        })
        .unwrap();
        assert_eq!(body["dimensions"], 384);
        assert_eq!(body["model"], "text-embedding-3-small");

        let legacy = serde_json::to_value(EmbeddingRequest {
            model: "text-embedding-ada-002",
            input: &input,
            dimensions: requested_dimensions("text-embedding-ada-002", 1536),
        })
        .unwrap();
        assert!(legacy.get("dimensions").is_none());
    }

    #[test]
    fn test_merge_batch_keeps_hits_and_fills_misses_in_order() {
        let slots = vec![Some(vec![1.0]), None, Some(vec![3.0]), None];
        let merged = merge_batch(slots, &[1, 3], vec![vec![2.0], vec![4.0]]).unwrap();
        assert_eq!(merged, vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0]]);
    }

    #[test]
    fn test_merge_batch_all_hits() {
        let slots = vec![Some(vec![1.0]), Some(vec![2.0])];
        let merged = merge_batch(slots, &[], Vec::new()).unwrap();
        assert_eq!(merged, vec![vec![1.0], vec![2.0]]);
    }

    #[test]
    fn test_merge_batch_rejects_short_provider_reply() {
        let slots = vec![None, None];
        assert!(merge_batch(slots, &[0, 1], vec![vec![1.0]]).is_err());
    }

    #[test]
    fn test_remote_requires_key() {
        assert!(RemoteEmbeddingService::new(" ".into(), "https://x/v1", "m".into(), 8).is_err());
    }

    #[test]
    fn test_cache_key_depends_on_model() {
        let a = embedding_cache_key("m1", "hello");
        assert!(a.starts_with("embedding:"));
        assert_ne!(a, embedding_cache_key("m2", "hello"));
    }
}
