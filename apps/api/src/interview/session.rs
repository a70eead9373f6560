//! Interview sessions, one Redis key per session id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::{RedisCache, VersionedWrite};
use crate::errors::AppError;
use crate::interview::agent::TurnEvaluation;
use crate::interview::scene::SceneType;
use crate::llm_client::parse::round2;

pub const SESSION_TTL_SECS: u64 = 2 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Interviewer,
    Candidate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub content: String,
}

impl Turn {
    pub fn interviewer(content: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Interviewer,
            content: content.into(),
        }
    }

    pub fn candidate(content: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Candidate,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterviewSession {
    pub id: Uuid,
    pub user_id: String,
    pub kb_id: Option<Uuid>,
    pub scene: SceneType,
    pub topic: String,
    pub transcript: Vec<Turn>,
    /// One evaluation per answered question, in order.
    pub evaluations: Vec<TurnEvaluation>,
    pub started_at: DateTime<Utc>,
    /// Bumped on every committed update; guards against lost turns.
    #[serde(default)]
    pub version: u64,
}

impl InterviewSession {
    pub fn new(user_id: &str, kb_id: Option<Uuid>, scene: SceneType, topic: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            kb_id,
            scene,
            topic: topic.to_string(),
            transcript: Vec::new(),
            evaluations: Vec::new(),
            started_at: Utc::now(),
            version: 0,
        }
    }

    /// The interviewer's most recent message.
    pub fn last_question(&self) -> Option<&str> {
        self.transcript
            .iter()
            .rev()
            .find(|t| t.speaker == Speaker::Interviewer)
            .map(|t| t.content.as_str())
    }

    /// Appends the candidate's answer and the interviewer's reply. The reply
    /// is the follow-up question, or the comment when there is none.
    pub fn record_turn(&mut self, answer: &str, evaluation: TurnEvaluation) {
        self.transcript.push(Turn::candidate(answer));
        let reply = if evaluation.follow_up.is_empty() {
            evaluation.comment.clone()
        } else {
            evaluation.follow_up.clone()
        };
        if !reply.is_empty() {
            self.transcript.push(Turn::interviewer(reply));
        }
        self.evaluations.push(evaluation);
    }

    pub fn scores(&self) -> Vec<f64> {
        self.evaluations.iter().map(|e| e.score).collect()
    }

    /// Mean turn score, 0 when nothing has been answered yet.
    pub fn average_score(&self) -> f64 {
        if self.evaluations.is_empty() {
            return 0.0;
        }
        round2(self.evaluations.iter().map(|e| e.score).sum::<f64>() / self.evaluations.len() as f64)
    }

    /// Transcript as `Interviewer: ...` / `Candidate: ...` lines for prompts.
    pub fn history_text(&self) -> String {
        self.transcript
            .iter()
            .map(|t| {
                let who = match t.speaker {
                    Speaker::Interviewer => "Interviewer",
                    Speaker::Candidate => "Candidate",
                };
                format!("{who}: {}", t.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn session_key(id: Uuid) -> String {
    format!("interview:{id}")
}

pub async fn load(cache: &RedisCache, id: Uuid) -> Result<InterviewSession, AppError> {
    cache
        .get_json::<InterviewSession>(&session_key(id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Interview session {id} not found or expired")))
}

/// Stores a freshly started session.
pub async fn save(cache: &RedisCache, session: &InterviewSession) -> Result<(), AppError> {
    cache
        .set_json(&session_key(session.id), session, SESSION_TTL_SECS)
        .await?;
    Ok(())
}

/// Writes back a session loaded earlier, failing if another request updated
/// it in the meantime.
pub async fn commit(cache: &RedisCache, session: &mut InterviewSession) -> Result<(), AppError> {
    let expected = session.version;
    session.version += 1;
    let outcome = cache
        .set_json_if_version(&session_key(session.id), expected, session, SESSION_TTL_SECS)
        .await;
    match outcome {
        Ok(VersionedWrite::Stored) => Ok(()),
        other => {
            session.version = expected;
            Err(write_error(session.id, other?))
        }
    }
}

fn write_error(id: Uuid, outcome: VersionedWrite) -> AppError {
    match outcome {
        VersionedWrite::Missing => {
            AppError::NotFound(format!("Interview session {id} not found or expired"))
        }
        _ => AppError::Conflict(format!(
            "Interview session {id} was updated by another request; reload and retry"
        )),
    }
}

pub async fn delete(cache: &RedisCache, id: Uuid) -> Result<bool, AppError> {
    Ok(cache.delete(&session_key(id)).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(score: f64, follow_up: &str, comment: &str) -> TurnEvaluation {
        TurnEvaluation {
            score,
            follow_up: follow_up.into(),
            comment: comment.into(),
        }
    }

    fn session() -> InterviewSession {
        let mut s = InterviewSession::new("alice", None, SceneType::It, "rust");
        s.transcript.push(Turn::interviewer("What is ownership?"));
        s
    }

    #[test]
    fn test_record_turn_appends_answer_and_follow_up() {
        let mut s = session();
        s.record_turn("Each value has one owner.", eval(4.0, "What about borrowing?", "Good."));
        assert_eq!(s.transcript.len(), 3);
        assert_eq!(s.transcript[1], Turn::candidate("Each value has one owner."));
        assert_eq!(s.last_question(), Some("What about borrowing?"));
        assert_eq!(s.scores(), vec![4.0]);
    }

    #[test]
    fn test_record_turn_uses_comment_without_follow_up() {
        let mut s = session();
        s.record_turn("No idea.", eval(1.0, "", "Review the basics."));
        assert_eq!(s.last_question(), Some("Review the basics."));
    }

    #[test]
    fn test_average_score() {
        let mut s = session();
        assert_eq!(s.average_score(), 0.0);
        s.record_turn("a", eval(4.0, "q2", ""));
        s.record_turn("b", eval(3.0, "q3", ""));
        s.record_turn("c", eval(3.0, "q4", ""));
        assert_eq!(s.average_score(), 3.33);
    }

    #[test]
    fn test_history_text() {
        let mut s = session();
        s.record_turn("Single owner.", eval(4.0, "And moves?", ""));
        assert_eq!(
            s.history_text(),
            "Interviewer: What is ownership?\nCandidate: Single owner.\nInterviewer: And moves?"
        );
    }

    #[test]
    fn test_session_round_trips_through_json() {
        let s = session();
        let back: InterviewSession = serde_json::from_str(&serde_json::to_string(&s).unwrap()).unwrap();
        assert_eq!(back.id, s.id);
        assert_eq!(back.transcript, s.transcript);
        assert_eq!(session_key(s.id), format!("interview:{}", s.id));
    }

    #[test]
    fn test_version_defaults_for_sessions_stored_without_one() {
        let mut value = serde_json::to_value(session()).unwrap();
        value.as_object_mut().unwrap().remove("version");
        let back: InterviewSession = serde_json::from_value(value).unwrap();
        assert_eq!(back.version, 0);
    }

    #[test]
    fn test_concurrent_update_is_a_conflict() {
        let id = Uuid::nil();
        assert!(matches!(
            write_error(id, VersionedWrite::Conflict),
            AppError::Conflict(_)
        ));
        assert!(matches!(
            write_error(id, VersionedWrite::Missing),
            AppError::NotFound(_)
        ));
    }
}
