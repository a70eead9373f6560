use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct KnowledgeBaseRow {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub domain: String,
    pub sub_domain: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DocumentRow {
    pub id: Uuid,
    pub kb_id: Uuid,
    pub file_name: String,
    pub file_type: String,
    pub created_at: DateTime<Utc>,
}

/// A stored chunk including its embedding. Never serialized to clients.
#[derive(Debug, Clone, FromRow)]
pub struct ChunkRow {
    pub id: i64,
    pub document_id: Uuid,
    pub content: String,
    pub metadata: Value,
    pub embedding: Vec<f32>,
}

/// A retrieval hit as returned to callers: no raw vector.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredChunk {
    pub id: i64,
    pub document_id: Uuid,
    pub content: String,
    pub metadata: Value,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct KbStats {
    pub chunk_count: i64,
    pub document_count: i64,
}
