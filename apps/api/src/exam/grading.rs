//! Exam grading. Pure functions over stored questions and submitted answers.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::exam::models::ExamQuestion;
use crate::llm_client::parse::round2;

pub const POINTS_PER_QUESTION: u32 = 10;
const SIMILARITY_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Excellent,
    Good,
    Fair,
    Pass,
    Fail,
}

impl Grade {
    pub fn from_accuracy(accuracy: f64) -> Self {
        match accuracy {
            a if a >= 90.0 => Grade::Excellent,
            a if a >= 80.0 => Grade::Good,
            a if a >= 70.0 => Grade::Fair,
            a if a >= 60.0 => Grade::Pass,
            _ => Grade::Fail,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionResult {
    pub question_id: u32,
    pub question: String,
    pub user_answer: String,
    pub correct_answer: String,
    pub is_correct: bool,
    pub score: u32,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreReport {
    pub total_questions: usize,
    pub correct_count: usize,
    /// Percentage, two decimals.
    pub accuracy: f64,
    pub total_score: u32,
    pub max_score: u32,
    pub grade: Grade,
    pub detailed_results: Vec<QuestionResult>,
}

/// Lenient match: equal ignoring case and surrounding space, a lone option
/// letter that starts the correct answer, or near-identical character sets.
pub fn is_answer_correct(user_answer: &str, correct_answer: &str) -> bool {
    let user = user_answer.trim().to_lowercase();
    let correct = correct_answer.trim().to_lowercase();

    if user == correct {
        return true;
    }
    if user.chars().count() == 1 && correct.chars().count() > 1 && correct.starts_with(&user) {
        return true;
    }
    char_jaccard(&user, &correct) > SIMILARITY_THRESHOLD
}

/// Jaccard similarity of the two strings' character sets; 0 if either is empty.
pub fn char_jaccard(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let a: HashSet<char> = a.chars().collect();
    let b: HashSet<char> = b.chars().collect();
    let union = a.union(&b).count();
    a.intersection(&b).count() as f64 / union as f64
}

pub fn calculate_score(answers: &HashMap<u32, String>, questions: &[ExamQuestion]) -> ScoreReport {
    let detailed_results: Vec<QuestionResult> = questions
        .iter()
        .map(|q| {
            let user_answer = answers.get(&q.id).cloned().unwrap_or_default();
            let is_correct = is_answer_correct(&user_answer, &q.answer);
            QuestionResult {
                question_id: q.id,
                question: q.question.clone(),
                user_answer,
                correct_answer: q.answer.clone(),
                is_correct,
                score: if is_correct { POINTS_PER_QUESTION } else { 0 },
                explanation: q.explanation.clone(),
            }
        })
        .collect();

    let correct_count = detailed_results.iter().filter(|r| r.is_correct).count();
    let accuracy = if questions.is_empty() {
        0.0
    } else {
        round2(correct_count as f64 / questions.len() as f64 * 100.0)
    };

    ScoreReport {
        total_questions: questions.len(),
        correct_count,
        accuracy,
        total_score: detailed_results.iter().map(|r| r.score).sum(),
        max_score: questions.len() as u32 * POINTS_PER_QUESTION,
        grade: Grade::from_accuracy(accuracy),
        detailed_results,
    }
}
