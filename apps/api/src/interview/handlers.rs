use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    Json,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::activity::{self, ActivityType};
use crate::errors::AppError;
use crate::interview::agent::{self, parse_turn_evaluation, TurnEvaluation};
use crate::interview::scene::SceneType;
use crate::interview::session::{self, InterviewSession, Turn};
use crate::rag::retrieve::retrieve_context;
use crate::report::generator::{generate_technical_report, InterviewData, InterviewReport};
use crate::state::AppState;

const CONTEXT_TOP_K: usize = 3;
const MAX_CONTEXT_CHARS: usize = 3000;
const STREAM_APOLOGY: &str = "Sorry, something went wrong while evaluating your answer.";

#[derive(Deserialize)]
pub struct StartRequest {
    pub user_id: String,
    pub kb_id: Option<Uuid>,
    pub scene: String,
    pub topic: Option<String>,
}

#[derive(Serialize)]
pub struct StartResponse {
    pub session_id: Uuid,
    pub scene: SceneType,
    pub topic: String,
    pub question: String,
}

#[derive(Deserialize)]
pub struct AnswerRequest {
    pub answer: String,
}

#[derive(Serialize)]
pub struct AnswerResponse {
    pub session_id: Uuid,
    #[serde(flatten)]
    pub evaluation: TurnEvaluation,
    pub turn_count: usize,
}

#[derive(Serialize)]
pub struct EndResponse {
    pub session_id: Uuid,
    pub interview_id: Uuid,
    pub closing: String,
    pub feedback: String,
    pub average_score: f64,
    pub report: InterviewReport,
}

/// Stream events, serialized as `{"type": "token" | "end", ...}`.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    Token {
        token: String,
    },
    End {
        #[serde(flatten)]
        evaluation: TurnEvaluation,
    },
}

impl StreamEvent {
    fn into_sse(self) -> Result<SseEvent, Infallible> {
        let data = serde_json::to_string(&self).unwrap_or_default();
        Ok(SseEvent::default().data(data))
    }
}

fn require_answer(answer: &str) -> Result<(), AppError> {
    if answer.trim().is_empty() {
        return Err(AppError::Validation("answer must not be empty".into()));
    }
    Ok(())
}

/// Context for the question being answered; empty without a knowledge base.
async fn question_context(state: &AppState, session: &InterviewSession) -> Result<String, AppError> {
    let (Some(kb_id), Some(question)) = (session.kb_id, session.last_question()) else {
        return Ok(String::new());
    };
    let retrieved =
        retrieve_context(state, kb_id, question, CONTEXT_TOP_K, MAX_CONTEXT_CHARS).await?;
    Ok(retrieved.context)
}

/// POST /api/interview/start
pub async fn handle_start(
    State(state): State<AppState>,
    Json(req): Json<StartRequest>,
) -> Result<(StatusCode, Json<StartResponse>), AppError> {
    if req.user_id.trim().is_empty() {
        return Err(AppError::Validation("user_id must not be empty".into()));
    }
    let scene: SceneType = req.scene.parse()?;

    let kb = match req.kb_id {
        Some(kb_id) => Some(state.store.get_knowledge_base(kb_id).await?),
        None => None,
    };
    let topic = req
        .topic
        .filter(|t| !t.trim().is_empty())
        .or_else(|| kb.as_ref().and_then(|kb| kb.sub_domain.clone()))
        .or_else(|| kb.as_ref().map(|kb| kb.name.clone()))
        .unwrap_or_else(|| scene.default_topic().to_string());

    let mut session = InterviewSession::new(&req.user_id, req.kb_id, scene, &topic);
    let question = agent::opening_question(&state.llm, &session, state.config.llm_temperature).await?;
    session.transcript.push(Turn::interviewer(question.clone()));
    session::save(&state.cache, &session).await?;

    info!("Started {} interview {} for user {}", scene, session.id, session.user_id);

    Ok((
        StatusCode::CREATED,
        Json(StartResponse {
            session_id: session.id,
            scene,
            topic,
            question,
        }),
    ))
}

/// POST /api/interview/:id/answer
pub async fn handle_answer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AnswerRequest>,
) -> Result<Json<AnswerResponse>, AppError> {
    require_answer(&req.answer)?;
    let mut session = session::load(&state.cache, id).await?;

    let context = question_context(&state, &session).await?;
    let evaluation = agent::evaluate_turn(
        &state.llm,
        &session,
        &context,
        &req.answer,
        state.config.llm_temperature,
    )
    .await?;

    session.record_turn(&req.answer, evaluation.clone());
    session::commit(&state.cache, &mut session).await?;

    Ok(Json(AnswerResponse {
        session_id: id,
        evaluation,
        turn_count: session.evaluations.len(),
    }))
}

#[derive(Deserialize)]
pub struct StreamQuery {
    pub answer: String,
}

/// GET /api/interview/:id/stream?answer=
///
/// Streams the evaluation as it is generated, then an `end` event with the
/// parsed score, follow-up and comment. The turn is saved once the model
/// finishes.
pub async fn handle_stream(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(q): Query<StreamQuery>,
) -> Result<Sse<ReceiverStream<Result<SseEvent, Infallible>>>, AppError> {
    require_answer(&q.answer)?;
    let session = session::load(&state.cache, id).await?;
    let context = question_context(&state, &session).await?;

    let (tx, rx) = mpsc::channel(64);

    tokio::spawn(async move {
        let mut session = session;
        let outcome = stream_turn(&state, &session, &context, &q.answer, &tx).await;

        let evaluation = match outcome {
            Ok(evaluation) => {
                session.record_turn(&q.answer, evaluation.clone());
                match session::commit(&state.cache, &mut session).await {
                    Ok(()) => evaluation,
                    Err(e) => {
                        warn!("Failed to save streamed turn for interview {}: {e}", session.id);
                        TurnEvaluation {
                            comment: format!("{} (not saved: {e})", evaluation.comment),
                            ..evaluation
                        }
                    }
                }
            }
            Err(e) => {
                warn!("Streaming evaluation failed for interview {}: {e}", session.id);
                let _ = tx
                    .send(StreamEvent::Token { token: STREAM_APOLOGY.to_string() }.into_sse())
                    .await;
                TurnEvaluation {
                    score: 0.0,
                    follow_up: String::new(),
                    comment: e.to_string(),
                }
            }
        };

        let _ = tx.send(StreamEvent::End { evaluation }.into_sse()).await;
    });

    Ok(Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::default()))
}

/// Forwards each fragment as a token event and parses the full reply.
async fn stream_turn(
    state: &AppState,
    session: &InterviewSession,
    context: &str,
    answer: &str,
    tx: &mpsc::Sender<Result<SseEvent, Infallible>>,
) -> Result<TurnEvaluation, AppError> {
    let mut fragments = agent::stream_turn(
        &state.llm,
        session,
        context,
        answer,
        state.config.llm_temperature,
    )
    .await?;

    let mut full = String::new();
    while let Some(fragment) = fragments.next().await {
        let fragment = fragment.map_err(|e| AppError::llm("evaluation stream broke off", e))?;
        full.push_str(&fragment);
        // A closed channel means the client left; keep reading so the turn is still recorded.
        let _ = tx.send(StreamEvent::Token { token: fragment }.into_sse()).await;
    }
    Ok(parse_turn_evaluation(&full))
}

/// POST /api/interview/:id/end
pub async fn handle_end(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<EndResponse>, AppError> {
    let mut session = session::load(&state.cache, id).await?;
    let temperature = state.config.llm_temperature;

    let closing = agent::closing_remarks(&state.llm, &session, temperature).await?;
    session.transcript.push(Turn::interviewer(closing.clone()));
    let feedback = agent::feedback(&state.llm, &session, temperature).await?;

    let report = generate_technical_report(&InterviewData {
        role: session.scene.to_string(),
        topic: session.topic.clone(),
        transcript: session.transcript.clone(),
        feedback: feedback.clone(),
        evaluations: session.evaluations.clone(),
    });
    let average_score = session.average_score();

    let interview_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO interviews (id, user_id, kb_id, domain, score, feedback, transcript)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(interview_id)
    .bind(&session.user_id)
    .bind(session.kb_id)
    .bind(session.scene.as_str())
    .bind(average_score)
    .bind(&feedback)
    .bind(sqlx::types::Json(&session.transcript))
    .execute(&state.db)
    .await?;

    session::delete(&state.cache, id).await?;

    let minutes = (chrono::Utc::now() - session.started_at).num_seconds() as f64 / 60.0;
    let weak_areas = report
        .technical
        .as_ref()
        .map(|t| t.weak_points.clone())
        .unwrap_or_default();
    activity::record(
        &state.cache,
        &session.user_id,
        ActivityType::Interview,
        json!({
            "interview_id": interview_id,
            "scene": session.scene,
            "topic": session.topic,
            "score": average_score,
            "question_count": session.evaluations.len(),
            "time_spent": (minutes * 10.0).round() / 10.0,
            "weak_areas": weak_areas,
        }),
        None,
    )
    .await;

    info!(
        "Ended interview {} for user {} (average score {:.2})",
        id, session.user_id, average_score
    );

    Ok(Json(EndResponse {
        session_id: id,
        interview_id,
        closing,
        feedback,
        average_score,
        report,
    }))
}

/// GET /api/interview/:id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<InterviewSession>, AppError> {
    Ok(Json(session::load(&state.cache, id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_token_event_shape() {
        let value = serde_json::to_value(StreamEvent::Token { token: "Hi".into() }).unwrap();
        assert_eq!(value, json!({"type": "token", "token": "Hi"}));
    }

    #[test]
    fn test_end_event_shape() {
        let value: Value = serde_json::to_value(StreamEvent::End {
            evaluation: TurnEvaluation {
                score: 4.0,
                follow_up: "Why?".into(),
                comment: "Good".into(),
            },
        })
        .unwrap();
        assert_eq!(
            value,
            json!({"type": "end", "score": 4.0, "follow_up": "Why?", "comment": "Good"})
        );
    }
}
