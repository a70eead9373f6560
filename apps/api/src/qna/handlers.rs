use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::activity::{self, ActivityType};
use crate::errors::AppError;
use crate::models::knowledge::ScoredChunk;
use crate::qna::agent::{self, AnswerEvaluation};
use crate::qna::history;
use crate::rag::retrieve::retrieve_context;
use crate::rag::store::chunk_source;
use crate::state::AppState;

const ASK_TOP_K: usize = 3;
const RELATED_TOP_K: usize = 2;
const MAX_CONTEXT_CHARS: usize = 4000;

#[derive(Deserialize)]
pub struct AskRequest {
    pub question: String,
    pub kb_id: Uuid,
    pub user_id: String,
    #[serde(default)]
    pub conversation_mode: bool,
}

#[derive(Serialize)]
pub struct AskResponse {
    pub question: String,
    pub answer: String,
    pub confidence: f32,
    pub sources: Vec<String>,
    pub context_docs: Vec<ScoredChunk>,
    pub conversation_mode: bool,
    pub history_updated: bool,
}

#[derive(Deserialize)]
pub struct EvaluateRequest {
    pub question: String,
    pub answer: String,
    pub expected_answer: Option<String>,
}

#[derive(Deserialize)]
pub struct RelatedQuestionsRequest {
    pub question: String,
    pub kb_id: Uuid,
}

#[derive(Serialize)]
pub struct RelatedQuestionsResponse {
    pub original_question: String,
    pub related_questions: Vec<String>,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub user_id: String,
    pub kb_id: Uuid,
    pub history: String,
    pub history_count: usize,
}

fn require(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Distinct source file names of the retrieved chunks, in rank order.
fn document_sources(chunks: &[ScoredChunk]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for name in chunks.iter().filter_map(|c| chunk_source(&c.metadata)) {
        if !sources.iter().any(|s| s == name) {
            sources.push(name.to_string());
        }
    }
    sources
}

/// POST /api/qna/ask
pub async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    require("question", &req.question)?;
    require("user_id", &req.user_id)?;
    state.store.get_knowledge_base(req.kb_id).await?;

    let retrieved =
        retrieve_context(&state, req.kb_id, &req.question, ASK_TOP_K, MAX_CONTEXT_CHARS).await?;
    let past = history::load(&state.cache, &req.user_id, req.kb_id).await?;

    let answer = agent::answer_question(
        &state.llm,
        &req.question,
        &retrieved.context,
        &past,
        req.conversation_mode,
    )
    .await?;

    let sources = if answer.sources.is_empty() {
        document_sources(&retrieved.chunks)
    } else {
        answer.sources
    };

    if req.conversation_mode {
        let updated = history::append_exchange(&past, &req.question, &answer.answer);
        history::save(&state.cache, &req.user_id, req.kb_id, &updated).await?;
    }

    activity::record(
        &state.cache,
        &req.user_id,
        ActivityType::Qna,
        json!({
            "kb_id": req.kb_id,
            "question_count": 1,
            "confidence": answer.confidence,
        }),
        None,
    )
    .await;

    Ok(Json(AskResponse {
        question: req.question,
        answer: answer.answer,
        confidence: answer.confidence,
        sources,
        context_docs: retrieved.chunks,
        conversation_mode: req.conversation_mode,
        history_updated: req.conversation_mode,
    }))
}

/// POST /api/qna/evaluate
pub async fn handle_evaluate(
    State(state): State<AppState>,
    Json(req): Json<EvaluateRequest>,
) -> Result<Json<AnswerEvaluation>, AppError> {
    require("question", &req.question)?;
    require("answer", &req.answer)?;
    let evaluation = agent::evaluate_answer_quality(
        &state.llm,
        &req.question,
        &req.answer,
        req.expected_answer.as_deref(),
    )
    .await?;
    Ok(Json(evaluation))
}

/// POST /api/qna/related-questions
pub async fn handle_related_questions(
    State(state): State<AppState>,
    Json(req): Json<RelatedQuestionsRequest>,
) -> Result<Json<RelatedQuestionsResponse>, AppError> {
    require("question", &req.question)?;
    state.store.get_knowledge_base(req.kb_id).await?;

    let retrieved =
        retrieve_context(&state, req.kb_id, &req.question, RELATED_TOP_K, MAX_CONTEXT_CHARS)
            .await?;
    let related_questions =
        agent::related_questions(&state.llm, &req.question, &retrieved.context).await?;

    Ok(Json(RelatedQuestionsResponse {
        original_question: req.question,
        related_questions,
    }))
}

/// GET /api/qna/conversation-history/:user_id/:kb_id
pub async fn handle_get_history(
    State(state): State<AppState>,
    Path((user_id, kb_id)): Path<(String, Uuid)>,
) -> Result<Json<HistoryResponse>, AppError> {
    let text = history::load(&state.cache, &user_id, kb_id).await?;
    Ok(Json(HistoryResponse {
        history_count: history::exchange_count(&text),
        user_id,
        kb_id,
        history: text,
    }))
}

/// DELETE /api/qna/conversation-history/:user_id/:kb_id
pub async fn handle_clear_history(
    State(state): State<AppState>,
    Path((user_id, kb_id)): Path<(String, Uuid)>,
) -> Result<Json<serde_json::Value>, AppError> {
    let cleared = history::clear(&state.cache, &user_id, kb_id).await?;
    Ok(Json(json!({ "cleared": cleared })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: i64, source: Option<&str>) -> ScoredChunk {
        ScoredChunk {
            id,
            document_id: Uuid::nil(),
            content: String::new(),
            metadata: source.map(|s| json!({ "source": s })).unwrap_or_else(|| json!({})),
            score: 0.5,
        }
    }

    #[test]
    fn test_document_sources_are_distinct_and_ordered() {
        let chunks = vec![
            chunk(1, Some("b.pdf")),
            chunk(2, None),
            chunk(3, Some("a.md")),
            chunk(4, Some("b.pdf")),
        ];
        assert_eq!(document_sources(&chunks), vec!["b.pdf", "a.md"]);
    }
}
