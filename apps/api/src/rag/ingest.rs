//! Document ingestion: load, split and embed, then store the document and its
//! chunks in one transaction. Nothing is written until every chunk is embedded.

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::rag::embedding::EmbeddingService;
use crate::rag::loader::{load_document, DocumentKind, LoadedSection};
use crate::rag::splitter::{ChunkDraft, TextSplitter};
use crate::rag::store::NewDocument;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct IngestReport {
    /// Owner of the knowledge base, used for activity tracking.
    #[serde(skip)]
    pub user_id: String,
    pub document_id: Uuid,
    pub file_name: String,
    pub section_count: usize,
    pub chunk_count: usize,
    pub embedding_model: String,
}

/// Chunks with their embeddings, aligned by position.
pub struct PreparedChunks {
    pub drafts: Vec<ChunkDraft>,
    pub embeddings: Vec<Vec<f32>>,
}

/// Splits loaded sections and embeds every chunk. Pure with respect to the
/// database, so a failed embedding leaves no partial document behind.
pub async fn prepare_chunks(
    embedder: &dyn EmbeddingService,
    splitter: &TextSplitter,
    file_name: &str,
    sections: &[LoadedSection],
) -> Result<PreparedChunks, AppError> {
    let drafts = splitter.split_sections(file_name, sections);
    if drafts.is_empty() {
        return Err(AppError::UnprocessableEntity(format!(
            "{file_name} produced no text chunks"
        )));
    }
    let texts: Vec<String> = drafts.iter().map(|d| d.content.clone()).collect();
    let embeddings = embedder.embed_batch(&texts).await?;
    Ok(PreparedChunks { drafts, embeddings })
}

pub async fn ingest_document(
    state: &AppState,
    kb_id: Uuid,
    file_name: &str,
    bytes: Vec<u8>,
) -> Result<IngestReport, AppError> {
    if bytes.is_empty() {
        return Err(AppError::Validation("Uploaded file is empty".into()));
    }
    if bytes.len() > state.config.max_document_bytes {
        return Err(AppError::Validation(format!(
            "File exceeds the {} byte limit",
            state.config.max_document_bytes
        )));
    }
    let kind = DocumentKind::from_file_name(file_name)
        .ok_or_else(|| AppError::Validation(format!("unsupported file type: {file_name}")))?;

    let kb = state.store.get_knowledge_base(kb_id).await?;

    let name = file_name.to_string();
    let sections = tokio::task::spawn_blocking(move || load_document(&name, &bytes))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("document loader panicked: {e}")))??;

    let prepared = prepare_chunks(
        state.embedder.as_ref(),
        &state.splitter,
        file_name,
        &sections,
    )
    .await?;
    let full_text = sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    let document = NewDocument {
        file_name,
        file_type: kind.as_str(),
        content: &full_text,
    };
    let document_id = state
        .store
        .add_document(kb_id, &document, &prepared.drafts, &prepared.embeddings)
        .await?;
    let chunk_count = prepared.drafts.len();

    info!(
        "Ingested {file_name} into {kb_id}: {} sections, {chunk_count} chunks",
        sections.len()
    );

    Ok(IngestReport {
        user_id: kb.user_id,
        document_id,
        file_name: file_name.to_string(),
        section_count: sections.len(),
        chunk_count,
        embedding_model: state.embedder.model_name().to_string(),
    })
}
