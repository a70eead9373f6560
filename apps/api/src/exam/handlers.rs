use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::activity::{self, ActivityType};
use crate::errors::AppError;
use crate::exam::agent::{self, ExamAnswerEvaluation};
use crate::exam::catalog::{find_exam, QuestionType, CATALOG};
use crate::exam::grading::{calculate_score, ScoreReport};
use crate::exam::models::{self, ExamPaper, ExamQuestion, ExamRecord, ExamSession};
use crate::rag::retrieve::retrieve_context;
use crate::state::AppState;

const DEFAULT_SET_SIZE: usize = 10;
const DEFAULT_EXAM_SIZE: usize = 20;
const DEFAULT_TIME_LIMIT_MINUTES: u32 = 120;
/// Accuracy at or above which the exam topic counts as a strong area.
const STRONG_ACCURACY: f64 = 80.0;
/// Accuracy below which the exam topic counts as a weak area.
const WEAK_ACCURACY: f64 = 60.0;
const CONTEXT_TOP_K: usize = 5;
const MAX_CONTEXT_CHARS: usize = 4000;

fn default_difficulty() -> String {
    "medium".to_string()
}

#[derive(Deserialize)]
pub struct GenerateQuestionRequest {
    pub exam_type: String,
    pub question_type: QuestionType,
    pub topic: String,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    #[serde(default)]
    pub context: String,
}

#[derive(Deserialize)]
pub struct GenerateSetRequest {
    pub exam_type: String,
    pub topic: String,
    pub count: Option<usize>,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    #[serde(default)]
    pub context: String,
}

#[derive(Serialize)]
pub struct QuestionSetResponse {
    pub exam_type: String,
    pub topic: String,
    pub count: usize,
    pub questions: Vec<ExamQuestion>,
}

#[derive(Deserialize)]
pub struct EvaluateAnswerRequest {
    pub question: String,
    pub correct_answer: String,
    pub user_answer: String,
}

#[derive(Deserialize)]
pub struct SimulateRequest {
    pub user_id: String,
    pub exam_type: String,
    pub topic: String,
    pub question_count: Option<usize>,
    pub time_limit: Option<u32>,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
    /// Ground the questions in this knowledge base.
    pub kb_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct SubmitRequest {
    pub answers: HashMap<u32, String>,
}

#[derive(Serialize)]
pub struct SubmitResponse {
    pub record_id: Uuid,
    pub score_report: ScoreReport,
}

fn require(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} must not be empty")));
    }
    Ok(())
}

/// GET /api/exam/types
pub async fn handle_exam_types() -> Json<Value> {
    Json(json!({ "exam_types": CATALOG }))
}

/// POST /api/exam/generate-question
pub async fn handle_generate_question(
    State(state): State<AppState>,
    Json(req): Json<GenerateQuestionRequest>,
) -> Result<Json<ExamQuestion>, AppError> {
    require("topic", &req.topic)?;
    let question = agent::generate_question(
        &state.llm,
        &req.exam_type,
        req.question_type,
        &req.topic,
        &req.difficulty,
        &req.context,
    )
    .await?;
    Ok(Json(question))
}

/// POST /api/exam/generate-question-set
pub async fn handle_generate_question_set(
    State(state): State<AppState>,
    Json(req): Json<GenerateSetRequest>,
) -> Result<Json<QuestionSetResponse>, AppError> {
    require("topic", &req.topic)?;
    let questions = agent::generate_question_set(
        &state.llm,
        &req.exam_type,
        &req.topic,
        req.count.unwrap_or(DEFAULT_SET_SIZE),
        &req.difficulty,
        &req.context,
    )
    .await?;
    Ok(Json(QuestionSetResponse {
        exam_type: req.exam_type,
        topic: req.topic,
        count: questions.len(),
        questions,
    }))
}

/// POST /api/exam/evaluate-answer
pub async fn handle_evaluate_answer(
    State(state): State<AppState>,
    Json(req): Json<EvaluateAnswerRequest>,
) -> Result<Json<ExamAnswerEvaluation>, AppError> {
    require("question", &req.question)?;
    require("user_answer", &req.user_answer)?;
    let evaluation =
        agent::evaluate_answer(&state.llm, &req.question, &req.correct_answer, &req.user_answer)
            .await?;
    Ok(Json(evaluation))
}

/// POST /api/exam/simulate
pub async fn handle_simulate(
    State(state): State<AppState>,
    Json(req): Json<SimulateRequest>,
) -> Result<(StatusCode, Json<ExamPaper>), AppError> {
    require("user_id", &req.user_id)?;
    require("topic", &req.topic)?;
    let exam = find_exam(&req.exam_type)?;

    let context = match req.kb_id {
        Some(kb_id) => {
            state.store.get_knowledge_base(kb_id).await?;
            retrieve_context(&state, kb_id, &req.topic, CONTEXT_TOP_K, MAX_CONTEXT_CHARS)
                .await?
                .context
        }
        None => String::new(),
    };

    let questions = agent::generate_question_set(
        &state.llm,
        exam.key,
        &req.topic,
        req.question_count.unwrap_or(DEFAULT_EXAM_SIZE),
        &req.difficulty,
        &context,
    )
    .await?;
    if questions.is_empty() {
        return Err(AppError::Llm("no exam questions could be generated".into()));
    }

    let session = ExamSession {
        exam_id: Uuid::new_v4(),
        user_id: req.user_id,
        exam_type: exam.key.to_string(),
        exam_name: exam.name.to_string(),
        topic: req.topic,
        time_limit_minutes: req.time_limit.unwrap_or(DEFAULT_TIME_LIMIT_MINUTES),
        questions,
        created_at: Utc::now(),
    };
    models::save_exam(&state.cache, &session).await?;

    info!(
        "Created {} exam {} with {} questions for user {}",
        session.exam_type,
        session.exam_id,
        session.questions.len(),
        session.user_id
    );

    Ok((StatusCode::CREATED, Json(session.paper())))
}

/// POST /api/exam/:exam_id/submit
pub async fn handle_submit(
    State(state): State<AppState>,
    Path(exam_id): Path<Uuid>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<SubmitResponse>, AppError> {
    let exam = models::load_exam(&state.cache, exam_id).await?;
    let score_report = calculate_score(&req.answers, &exam.questions);

    let record = ExamRecord {
        record_id: Uuid::new_v4(),
        exam_id,
        user_id: exam.user_id.clone(),
        exam_type: exam.exam_type.clone(),
        topic: exam.topic.clone(),
        user_answers: req.answers,
        score_report: score_report.clone(),
        submitted_at: Utc::now(),
    };
    models::save_record(&state.cache, &record).await?;

    let minutes = (record.submitted_at - exam.created_at).num_seconds() as f64 / 60.0;
    let (weak_areas, strong_areas): (Vec<&str>, Vec<&str>) = match score_report.accuracy {
        a if a < WEAK_ACCURACY => (vec![exam.topic.as_str()], vec![]),
        a if a >= STRONG_ACCURACY => (vec![], vec![exam.topic.as_str()]),
        _ => (vec![], vec![]),
    };
    activity::record(
        &state.cache,
        &exam.user_id,
        ActivityType::Exam,
        json!({
            "exam_id": exam_id,
            "record_id": record.record_id,
            "exam_type": exam.exam_type,
            "topic": exam.topic,
            "question_count": score_report.total_questions,
            "score": score_report.accuracy,
            "grade": score_report.grade,
            "time_spent": (minutes * 10.0).round() / 10.0,
            "weak_areas": weak_areas,
            "strong_areas": strong_areas,
        }),
        None,
    )
    .await;

    Ok(Json(SubmitResponse {
        record_id: record.record_id,
        score_report,
    }))
}

/// GET /api/exam/records/:record_id
pub async fn handle_get_record(
    State(state): State<AppState>,
    Path(record_id): Path<Uuid>,
) -> Result<Json<ExamRecord>, AppError> {
    Ok(Json(models::load_record(&state.cache, record_id).await?))
}
