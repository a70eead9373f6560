use uuid::Uuid;

use crate::errors::AppError;
use crate::models::knowledge::ScoredChunk;
use crate::rag::ranking::build_context;
use crate::state::AppState;

/// Retrieved chunks plus the prompt context built from them.
pub struct Retrieved {
    pub chunks: Vec<ScoredChunk>,
    pub context: String,
}

/// Embeds `query` and pulls the `top_k` most similar chunks from a knowledge
/// base, joining them into at most `max_chars` of context.
pub async fn retrieve_context(
    state: &AppState,
    kb_id: Uuid,
    query: &str,
    top_k: usize,
    max_chars: usize,
) -> Result<Retrieved, AppError> {
    let query_vec = state.embedder.embed(query).await?;
    let chunks = state.store.similarity_search(kb_id, &query_vec, top_k).await?;
    let context = build_context(&chunks, max_chars);
    Ok(Retrieved { chunks, context })
}
