pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::activity::handlers as activity;
use crate::exam::handlers as exam;
use crate::interview::handlers as interview;
use crate::qna::handlers as qna;
use crate::rag::handlers as rag;
use crate::report::handlers as report;
use crate::state::AppState;

/// Multipart framing on top of the document itself.
const UPLOAD_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.max_document_bytes + UPLOAD_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(health::health_handler))
        // Knowledge bases
        .route(
            "/api/knowledge-bases",
            post(rag::handle_create_knowledge_base).get(rag::handle_list_knowledge_bases),
        )
        .route("/api/knowledge-bases/:kb_id", get(rag::handle_get_knowledge_base))
        .route(
            "/api/knowledge-bases/:kb_id/documents",
            post(rag::handle_upload_document).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/knowledge-bases/:kb_id/search", post(rag::handle_search))
        // Question answering
        .route("/api/qna/ask", post(qna::handle_ask))
        .route("/api/qna/evaluate", post(qna::handle_evaluate))
        .route("/api/qna/related-questions", post(qna::handle_related_questions))
        .route(
            "/api/qna/conversation-history/:user_id/:kb_id",
            get(qna::handle_get_history).delete(qna::handle_clear_history),
        )
        // Interviews
        .route("/api/interview/start", post(interview::handle_start))
        .route("/api/interview/:id", get(interview::handle_get_session))
        .route("/api/interview/:id/answer", post(interview::handle_answer))
        .route("/api/interview/:id/stream", get(interview::handle_stream))
        .route("/api/interview/:id/end", post(interview::handle_end))
        // Exams
        .route("/api/exam/types", get(exam::handle_exam_types))
        .route("/api/exam/generate-question", post(exam::handle_generate_question))
        .route(
            "/api/exam/generate-question-set",
            post(exam::handle_generate_question_set),
        )
        .route("/api/exam/evaluate-answer", post(exam::handle_evaluate_answer))
        .route("/api/exam/simulate", post(exam::handle_simulate))
        .route("/api/exam/:exam_id/submit", post(exam::handle_submit))
        .route("/api/exam/records/:record_id", get(exam::handle_get_record))
        // Reports
        .route("/api/report", get(report::handle_user_summary))
        .route("/api/report/generate", post(report::handle_generate_report))
        .route("/api/report/export", post(report::handle_export_report))
        // Learning history
        .route(
            "/api/history/:user_id",
            get(activity::handle_list_history).delete(activity::handle_clear_history),
        )
        .route("/api/history/:user_id/stats", get(activity::handle_history_stats))
        .route("/api/history/:user_id/trend", get(activity::handle_history_trend))
        .route("/api/history/:user_id/weak-areas", get(activity::handle_weak_areas))
        .with_state(state)
}
