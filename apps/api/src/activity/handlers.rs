use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::activity::analysis::{
    activity_stats, progress_trend, weak_areas, ActivityStats, ProgressTrend, WeakAreaAnalysis,
};
use crate::activity::tracker::{self, ActivityRecord, ActivityType, HISTORY_CAP};
use crate::errors::AppError;
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: usize = 100;
const DEFAULT_TREND_DAYS: i64 = 30;

#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(rename = "type")]
    pub activity_type: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct TrendQuery {
    pub days: Option<i64>,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub user_id: String,
    pub activities: Vec<ActivityRecord>,
}

#[derive(Serialize)]
pub struct ClearResponse {
    pub cleared: bool,
}

/// GET /api/history/:user_id
pub async fn handle_list_history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, AppError> {
    let activity_type = params
        .activity_type
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .map(str::parse::<ActivityType>)
        .transpose()?;
    let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(HISTORY_CAP);
    let activities = tracker::list(&state.cache, &user_id, activity_type, limit).await?;
    Ok(Json(HistoryResponse {
        user_id,
        activities,
    }))
}

/// GET /api/history/:user_id/stats
pub async fn handle_history_stats(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ActivityStats>, AppError> {
    let records = tracker::list(&state.cache, &user_id, None, HISTORY_CAP).await?;
    Ok(Json(activity_stats(&records)))
}

/// GET /api/history/:user_id/trend
pub async fn handle_history_trend(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<TrendQuery>,
) -> Result<Json<ProgressTrend>, AppError> {
    let days = params.days.unwrap_or(DEFAULT_TREND_DAYS);
    if !(1..=365).contains(&days) {
        return Err(AppError::Validation("days must be between 1 and 365".into()));
    }
    let records = tracker::list(&state.cache, &user_id, None, HISTORY_CAP).await?;
    Ok(Json(progress_trend(&records, days, Utc::now().date_naive())))
}

/// GET /api/history/:user_id/weak-areas
pub async fn handle_weak_areas(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<WeakAreaAnalysis>, AppError> {
    let records = tracker::list(&state.cache, &user_id, None, HISTORY_CAP).await?;
    Ok(Json(weak_areas(&records)))
}

/// DELETE /api/history/:user_id
pub async fn handle_clear_history(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ClearResponse>, AppError> {
    let cleared = tracker::clear(&state.cache, &user_id).await?;
    Ok(Json(ClearResponse { cleared }))
}
