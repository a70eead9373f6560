use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::activity::{self, ActivityType};
use crate::errors::AppError;
use crate::models::knowledge::{DocumentRow, KbStats, KnowledgeBaseRow, ScoredChunk};
use crate::rag::ingest::{ingest_document, IngestReport};
use crate::state::AppState;

const DEFAULT_TOP_K: usize = 5;
const MAX_TOP_K: usize = 50;

#[derive(Deserialize)]
pub struct CreateKnowledgeBaseRequest {
    pub user_id: String,
    pub name: String,
    pub domain: String,
    pub sub_domain: Option<String>,
}

#[derive(Deserialize)]
pub struct UserIdQuery {
    pub user_id: String,
}

#[derive(Serialize)]
pub struct KnowledgeBaseInfo {
    #[serde(flatten)]
    pub kb: KnowledgeBaseRow,
    pub stats: KbStats,
    pub documents: Vec<DocumentRow>,
}

#[derive(Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub top_k: Option<usize>,
    pub keyword: Option<String>,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<ScoredChunk>,
}

/// POST /api/knowledge-bases
pub async fn handle_create_knowledge_base(
    State(state): State<AppState>,
    Json(req): Json<CreateKnowledgeBaseRequest>,
) -> Result<(StatusCode, Json<KnowledgeBaseRow>), AppError> {
    let kb = state
        .store
        .create_knowledge_base(&req.user_id, &req.name, &req.domain, req.sub_domain.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(kb)))
}

/// GET /api/knowledge-bases?user_id=
pub async fn handle_list_knowledge_bases(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<Vec<KnowledgeBaseRow>>, AppError> {
    Ok(Json(state.store.list_knowledge_bases(&params.user_id).await?))
}

/// GET /api/knowledge-bases/:kb_id
pub async fn handle_get_knowledge_base(
    State(state): State<AppState>,
    Path(kb_id): Path<Uuid>,
) -> Result<Json<KnowledgeBaseInfo>, AppError> {
    let kb = state.store.get_knowledge_base(kb_id).await?;
    let stats = state.store.kb_stats(kb_id).await?;
    let documents = state.store.list_documents(kb_id).await?;
    Ok(Json(KnowledgeBaseInfo {
        kb,
        stats,
        documents,
    }))
}

/// POST /api/knowledge-bases/:kb_id/documents
/// Multipart upload; the first field carrying a file name is ingested.
pub async fn handle_upload_document(
    State(state): State<AppState>,
    Path(kb_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<IngestReport>), AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read upload: {e}")))?;

        let report = ingest_document(&state, kb_id, &file_name, bytes.to_vec()).await?;
        activity::record(
            &state.cache,
            &report.user_id,
            ActivityType::Upload,
            json!({
                "kb_id": kb_id,
                "file_name": report.file_name,
                "chunk_count": report.chunk_count,
            }),
            None,
        )
        .await;
        return Ok((StatusCode::CREATED, Json(report)));
    }
    Err(AppError::Validation("No file field in upload".into()))
}

/// POST /api/knowledge-bases/:kb_id/search
pub async fn handle_search(
    State(state): State<AppState>,
    Path(kb_id): Path<Uuid>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(AppError::Validation("query must not be empty".into()));
    }
    let top_k = req.top_k.unwrap_or(DEFAULT_TOP_K).min(MAX_TOP_K);
    state.store.get_knowledge_base(kb_id).await?;

    let query_vec = state.embedder.embed(&req.query).await?;
    let results = match req.keyword.as_deref().map(str::trim) {
        Some(keyword) if !keyword.is_empty() => {
            state
                .store
                .hybrid_search(kb_id, &query_vec, keyword, top_k)
                .await?
        }
        _ => state.store.similarity_search(kb_id, &query_vec, top_k).await?,
    };

    Ok(Json(SearchResponse {
        query: req.query,
        results,
    }))
}
