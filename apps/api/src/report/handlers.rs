use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::activity::{self, ActivityType};
use crate::errors::AppError;
use crate::rag::store::validate_domain;
use crate::report::export::export_report;
use crate::report::generator::{
    generate_interview_report, generate_technical_report, user_summary, InterviewData,
    InterviewReport, UserSummary,
};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct GenerateReportRequest {
    pub user_id: String,
    #[serde(flatten)]
    pub interview: InterviewData,
    #[serde(default)]
    pub technical: bool,
}

#[derive(Deserialize)]
pub struct SummaryQuery {
    pub user_id: String,
    pub domain: String,
}

#[derive(Deserialize)]
pub struct ExportRequest {
    pub user_id: String,
    pub report: InterviewReport,
}

#[derive(Serialize)]
pub struct ExportResponse {
    pub bucket: String,
    pub key: String,
}

/// POST /api/report/generate
pub async fn handle_generate_report(
    State(state): State<AppState>,
    Json(req): Json<GenerateReportRequest>,
) -> Result<Json<InterviewReport>, AppError> {
    if req.user_id.trim().is_empty() {
        return Err(AppError::Validation("user_id must not be empty".into()));
    }
    if req.interview.transcript.is_empty() && req.interview.feedback.trim().is_empty() {
        return Err(AppError::Validation(
            "a transcript or feedback is required to build a report".into(),
        ));
    }

    let report = if req.technical {
        generate_technical_report(&req.interview)
    } else {
        generate_interview_report(&req.interview)
    };

    activity::record(
        &state.cache,
        &req.user_id,
        ActivityType::Report,
        json!({
            "report_id": report.report_id,
            "topic": report.topic,
            "score": report.score,
            "weak_areas": report.technical.as_ref().map(|t| t.weak_points.clone()).unwrap_or_default(),
        }),
        None,
    )
    .await;

    Ok(Json(report))
}

/// GET /api/report?user_id=&domain=
pub async fn handle_user_summary(
    State(state): State<AppState>,
    Query(q): Query<SummaryQuery>,
) -> Result<Json<UserSummary>, AppError> {
    validate_domain(&q.domain)?;
    Ok(Json(user_summary(&state.db, &q.user_id, &q.domain).await?))
}

/// POST /api/report/export
pub async fn handle_export_report(
    State(state): State<AppState>,
    Json(req): Json<ExportRequest>,
) -> Result<Json<ExportResponse>, AppError> {
    if req.user_id.trim().is_empty() {
        return Err(AppError::Validation("user_id must not be empty".into()));
    }
    let key = export_report(&state.s3, &state.config.s3_bucket, &req.user_id, &req.report).await?;
    Ok(Json(ExportResponse {
        bucket: state.config.s3_bucket.clone(),
        key,
    }))
}
