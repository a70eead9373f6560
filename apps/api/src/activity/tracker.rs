//! Activity tracker: per-user learning history kept in a capped Redis list.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::cache::RedisCache;
use crate::errors::AppError;

/// Newest entries kept per user.
pub const HISTORY_CAP: usize = 1000;
/// History expires 30 days after the last recorded activity.
pub const HISTORY_TTL_SECS: u64 = 30 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    Interview,
    Exam,
    Qna,
    Upload,
    Report,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Interview => "interview",
            ActivityType::Exam => "exam",
            ActivityType::Qna => "qna",
            ActivityType::Upload => "upload",
            ActivityType::Report => "report",
        }
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "interview" => Ok(ActivityType::Interview),
            "exam" => Ok(ActivityType::Exam),
            "qna" => Ok(ActivityType::Qna),
            "upload" => Ok(ActivityType::Upload),
            "report" => Ok(ActivityType::Report),
            other => Err(AppError::Validation(format!("unknown activity type '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub user_id: String,
    pub activity_type: ActivityType,
    pub timestamp: DateTime<Utc>,
    /// Free-form payload. Aggregations read `time_spent`, `question_count`,
    /// `score`, `weak_areas` and `strong_areas` when present.
    pub data: Value,
    pub metadata: Value,
}

fn history_key(user_id: &str) -> String {
    format!("user_history:{user_id}")
}

/// Records an activity. Failures are logged and swallowed so that tracking
/// never breaks the operation being tracked.
pub async fn record(
    cache: &RedisCache,
    user_id: &str,
    activity_type: ActivityType,
    data: Value,
    metadata: Option<Value>,
) {
    let entry = ActivityRecord {
        user_id: user_id.to_string(),
        activity_type,
        timestamp: Utc::now(),
        data,
        metadata: metadata.unwrap_or_else(|| Value::Object(Default::default())),
    };
    if let Err(e) = cache
        .push_capped(&history_key(user_id), &entry, HISTORY_CAP, HISTORY_TTL_SECS)
        .await
    {
        warn!("Failed to record {activity_type} activity for {user_id}: {e}");
    }
}

/// Newest-first activities, optionally filtered by type.
pub async fn list(
    cache: &RedisCache,
    user_id: &str,
    activity_type: Option<ActivityType>,
    limit: usize,
) -> Result<Vec<ActivityRecord>, AppError> {
    let records: Vec<ActivityRecord> = cache.list_json(&history_key(user_id), HISTORY_CAP).await?;
    Ok(records
        .into_iter()
        .filter(|r| activity_type.map_or(true, |t| r.activity_type == t))
        .take(limit)
        .collect())
}

pub async fn clear(cache: &RedisCache, user_id: &str) -> Result<bool, AppError> {
    Ok(cache.delete(&history_key(user_id)).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_activity_type_round_trips_through_str() {
        for t in [
            ActivityType::Interview,
            ActivityType::Exam,
            ActivityType::Qna,
            ActivityType::Upload,
            ActivityType::Report,
        ] {
            assert_eq!(t.as_str().parse::<ActivityType>().unwrap(), t);
        }
        assert!("QNA".parse::<ActivityType>().is_ok());
        assert!("speech".parse::<ActivityType>().is_err());
    }

    #[test]
    fn test_record_serializes_type_as_snake_case() {
        let record = ActivityRecord {
            user_id: "u1".into(),
            activity_type: ActivityType::Qna,
            timestamp: Utc::now(),
            data: json!({"question_count": 1}),
            metadata: json!({}),
        };
        let v = serde_json::to_value(&record).unwrap();
        assert_eq!(v["activity_type"], "qna");
    }

    #[test]
    fn test_history_key() {
        assert_eq!(history_key("alice"), "user_history:alice");
    }
}
