//! Vector store: knowledge bases, documents and embedded chunks in Postgres,
//! with a Redis cache in front of similarity search.
//!
//! Embeddings live in a `REAL[]` column and are scored in process. Each
//! knowledge base row carries a `search_generation` that is bumped in the same
//! transaction that adds chunks; it is part of every search cache key, so
//! results cached before an ingest are never served after it.

use serde_json::Value;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::{digest, RedisCache};
use crate::errors::AppError;
use crate::models::knowledge::{ChunkRow, DocumentRow, KbStats, KnowledgeBaseRow, ScoredChunk};
use crate::rag::ranking::{rank_by_similarity, rank_hybrid};
use crate::rag::splitter::ChunkDraft;

pub const KNOWLEDGE_DOMAINS: [&str; 3] = ["it", "language", "cert"];

#[derive(Clone)]
pub struct VectorStore {
    pool: PgPool,
    cache: RedisCache,
    cache_ttl_secs: u64,
}

impl VectorStore {
    pub fn new(pool: PgPool, cache: RedisCache, cache_ttl_secs: u64) -> Self {
        Self {
            pool,
            cache,
            cache_ttl_secs,
        }
    }

    pub async fn create_knowledge_base(
        &self,
        user_id: &str,
        name: &str,
        domain: &str,
        sub_domain: Option<&str>,
    ) -> Result<KnowledgeBaseRow, AppError> {
        validate_domain(domain)?;
        if name.trim().is_empty() {
            return Err(AppError::Validation("name must not be empty".into()));
        }
        if user_id.trim().is_empty() {
            return Err(AppError::Validation("user_id must not be empty".into()));
        }

        let kb = sqlx::query_as::<_, KnowledgeBaseRow>(
            "INSERT INTO knowledge_bases (id, user_id, name, domain, sub_domain)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, user_id, name, domain, sub_domain, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(name.trim())
        .bind(domain)
        .bind(sub_domain)
        .fetch_one(&self.pool)
        .await?;

        info!("Created knowledge base {} ({}) for user {}", kb.id, kb.domain, kb.user_id);
        Ok(kb)
    }

    pub async fn list_knowledge_bases(&self, user_id: &str) -> Result<Vec<KnowledgeBaseRow>, AppError> {
        Ok(sqlx::query_as::<_, KnowledgeBaseRow>(
            "SELECT id, user_id, name, domain, sub_domain, created_at
             FROM knowledge_bases
             WHERE user_id = $1
             ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn get_knowledge_base(&self, kb_id: Uuid) -> Result<KnowledgeBaseRow, AppError> {
        sqlx::query_as::<_, KnowledgeBaseRow>(
            "SELECT id, user_id, name, domain, sub_domain, created_at
             FROM knowledge_bases WHERE id = $1",
        )
        .bind(kb_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Knowledge base {kb_id} not found")))
    }

    /// Stores a document, its chunks and their embeddings atomically and
    /// invalidates cached searches for the knowledge base.
    pub async fn add_document(
        &self,
        kb_id: Uuid,
        document: &NewDocument<'_>,
        chunks: &[ChunkDraft],
        embeddings: &[Vec<f32>],
    ) -> Result<Uuid, AppError> {
        ensure_aligned(chunks, embeddings)?;

        let id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO documents (id, kb_id, file_name, file_type, content)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(kb_id)
        .bind(document.file_name)
        .bind(document.file_type)
        .bind(document.content)
        .execute(&mut *tx)
        .await?;

        add_chunks(&mut tx, kb_id, id, chunks, embeddings).await?;

        sqlx::query(
            "UPDATE knowledge_bases SET search_generation = search_generation + 1 WHERE id = $1",
        )
        .bind(kb_id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(
            "Stored document {id} ({}) with {} chunks in {kb_id}",
            document.file_name,
            chunks.len()
        );
        Ok(id)
    }

    /// Top-k chunks by cosine similarity, served from cache when possible.
    pub async fn similarity_search(
        &self,
        kb_id: Uuid,
        query: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, AppError> {
        let generation = self.search_generation(kb_id).await?;
        let key = search_cache_key(kb_id, generation, top_k, query);
        match self.cache.get_json::<Vec<ScoredChunk>>(&key).await {
            Ok(Some(hit)) => {
                debug!("Search cache hit for {kb_id}");
                return Ok(hit);
            }
            Ok(None) => {}
            Err(e) => warn!("Search cache read failed, querying directly: {e}"),
        }

        let results = rank_by_similarity(query, self.load_chunks(kb_id).await?, top_k);

        if let Err(e) = self.cache.set_json(&key, &results, self.cache_ttl_secs).await {
            warn!("Search cache write failed: {e}");
        }
        Ok(results)
    }

    pub async fn hybrid_search(
        &self,
        kb_id: Uuid,
        query: &[f32],
        keyword: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, AppError> {
        Ok(rank_hybrid(query, keyword, self.load_chunks(kb_id).await?, top_k))
    }

    pub async fn list_documents(&self, kb_id: Uuid) -> Result<Vec<DocumentRow>, AppError> {
        Ok(sqlx::query_as::<_, DocumentRow>(
            "SELECT id, kb_id, file_name, file_type, created_at
             FROM documents WHERE kb_id = $1
             ORDER BY created_at DESC",
        )
        .bind(kb_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn kb_stats(&self, kb_id: Uuid) -> Result<KbStats, AppError> {
        Ok(sqlx::query_as::<_, KbStats>(
            "SELECT
                (SELECT COUNT(*) FROM chunks WHERE kb_id = $1) AS chunk_count,
                (SELECT COUNT(*) FROM documents WHERE kb_id = $1) AS document_count",
        )
        .bind(kb_id)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn search_generation(&self, kb_id: Uuid) -> Result<i64, AppError> {
        sqlx::query_scalar::<_, i64>("SELECT search_generation FROM knowledge_bases WHERE id = $1")
            .bind(kb_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Knowledge base {kb_id} not found")))
    }

    async fn load_chunks(&self, kb_id: Uuid) -> Result<Vec<ChunkRow>, AppError> {
        Ok(sqlx::query_as::<_, ChunkRow>(
            "SELECT id, document_id, content, metadata, embedding
             FROM chunks WHERE kb_id = $1
             ORDER BY id",
        )
        .bind(kb_id)
        .fetch_all(&self.pool)
        .await?)
    }
}

pub fn validate_domain(domain: &str) -> Result<(), AppError> {
    if KNOWLEDGE_DOMAINS.contains(&domain) {
        Ok(())
    } else {
        Err(AppError::Validation(format!(
            "domain must be one of {}, got '{domain}'",
            KNOWLEDGE_DOMAINS.join(", ")
        )))
    }
}

/// A parsed upload ready to be stored alongside its chunks.
pub struct NewDocument<'a> {
    pub file_name: &'a str,
    pub file_type: &'a str,
    pub content: &'a str,
}

fn ensure_aligned(chunks: &[ChunkDraft], embeddings: &[Vec<f32>]) -> Result<(), AppError> {
    if chunks.len() != embeddings.len() {
        return Err(AppError::Validation(format!(
            "{} chunks but {} embeddings",
            chunks.len(),
            embeddings.len()
        )));
    }
    Ok(())
}

async fn add_chunks(
    tx: &mut Transaction<'_, Postgres>,
    kb_id: Uuid,
    document_id: Uuid,
    chunks: &[ChunkDraft],
    embeddings: &[Vec<f32>],
) -> Result<(), AppError> {
    for (chunk, embedding) in chunks.iter().zip(embeddings) {
        sqlx::query(
            "INSERT INTO chunks (kb_id, document_id, content, metadata, embedding)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(kb_id)
        .bind(document_id)
        .bind(&chunk.content)
        .bind(&chunk.metadata)
        .bind(embedding)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

fn search_cache_key(kb_id: Uuid, generation: i64, top_k: usize, query: &[f32]) -> String {
    let bytes: Vec<u8> = query.iter().flat_map(|v| v.to_le_bytes()).collect();
    format!("search:{kb_id}:{generation}:{top_k}:{}", digest(bytes))
}

/// Metadata attached to a chunk, for callers that only need the source name.
pub fn chunk_source(metadata: &Value) -> Option<&str> {
    metadata.get("source").and_then(Value::as_str)
}
