use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::RedisCache;
use crate::errors::AppError;
use crate::exam::catalog::QuestionType;
use crate::exam::grading::ScoreReport;

pub const EXAM_TTL_SECS: u64 = 60 * 60;
pub const RECORD_TTL_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamQuestion {
    pub id: u32,
    pub exam_type: String,
    pub question_type: QuestionType,
    pub topic: String,
    pub difficulty: String,
    pub question: String,
    pub options: Vec<String>,
    pub answer: String,
    pub explanation: String,
    pub generated_at: DateTime<Utc>,
}

/// A question as shown to the candidate, without answer or explanation.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateQuestion {
    pub id: u32,
    pub question_type: QuestionType,
    pub question: String,
    pub options: Vec<String>,
}

impl From<&ExamQuestion> for CandidateQuestion {
    fn from(q: &ExamQuestion) -> Self {
        Self {
            id: q.id,
            question_type: q.question_type,
            question: q.question.clone(),
            options: q.options.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamSession {
    pub exam_id: Uuid,
    pub user_id: String,
    pub exam_type: String,
    pub exam_name: String,
    pub topic: String,
    pub time_limit_minutes: u32,
    pub questions: Vec<ExamQuestion>,
    pub created_at: DateTime<Utc>,
}

/// The exam paper handed to the candidate.
#[derive(Debug, Clone, Serialize)]
pub struct ExamPaper {
    pub exam_id: Uuid,
    pub exam_type: String,
    pub exam_name: String,
    pub topic: String,
    pub time_limit_minutes: u32,
    pub question_count: usize,
    pub questions: Vec<CandidateQuestion>,
    pub created_at: DateTime<Utc>,
}

impl ExamSession {
    pub fn paper(&self) -> ExamPaper {
        ExamPaper {
            exam_id: self.exam_id,
            exam_type: self.exam_type.clone(),
            exam_name: self.exam_name.clone(),
            topic: self.topic.clone(),
            time_limit_minutes: self.time_limit_minutes,
            question_count: self.questions.len(),
            questions: self.questions.iter().map(CandidateQuestion::from).collect(),
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamRecord {
    pub record_id: Uuid,
    pub exam_id: Uuid,
    pub user_id: String,
    pub exam_type: String,
    pub topic: String,
    pub user_answers: HashMap<u32, String>,
    pub score_report: ScoreReport,
    pub submitted_at: DateTime<Utc>,
}

fn exam_key(id: Uuid) -> String {
    format!("exam:{id}")
}

fn record_key(id: Uuid) -> String {
    format!("exam_record:{id}")
}

pub async fn save_exam(cache: &RedisCache, exam: &ExamSession) -> Result<(), AppError> {
    cache.set_json(&exam_key(exam.exam_id), exam, EXAM_TTL_SECS).await?;
    Ok(())
}

pub async fn load_exam(cache: &RedisCache, id: Uuid) -> Result<ExamSession, AppError> {
    cache
        .get_json(&exam_key(id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Exam {id} not found or expired")))
}

pub async fn save_record(cache: &RedisCache, record: &ExamRecord) -> Result<(), AppError> {
    cache
        .set_json(&record_key(record.record_id), record, RECORD_TTL_SECS)
        .await?;
    Ok(())
}

pub async fn load_record(cache: &RedisCache, id: Uuid) -> Result<ExamRecord, AppError> {
    cache
        .get_json(&record_key(id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Exam record {id} not found")))
}
