use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// A finished interview as persisted for reporting.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InterviewRow {
    pub id: Uuid,
    pub user_id: String,
    pub kb_id: Option<Uuid>,
    pub domain: String,
    pub score: f64,
    pub feedback: String,
    pub transcript: Value,
    pub created_at: DateTime<Utc>,
}
