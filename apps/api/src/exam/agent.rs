//! Exam agent: question generation and answer grading by the model.

use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::errors::AppError;
use crate::exam::catalog::{find_exam, QuestionType};
use crate::exam::models::ExamQuestion;
use crate::exam::parser::parse_question;
use crate::exam::prompts::{EVALUATION_PROMPT_TEMPLATE, EXAM_SYSTEM, QUESTION_PROMPT_TEMPLATE};
use crate::llm_client::parse::score_dimensions;
use crate::llm_client::prompts::{render, LANGUAGE_INSTRUCTION};
use crate::llm_client::LlmClient;

const EXAM_TEMPERATURE: f32 = 0.5;
pub const MAX_QUESTION_SET: usize = 50;
const GENERATION_PAUSE: Duration = Duration::from_millis(500);
const DEFAULT_DIMENSION_SCORE: f64 = 5.0;

#[derive(Debug, Clone, Serialize)]
pub struct ExamAnswerEvaluation {
    pub evaluation: String,
    pub accuracy: f64,
    pub completeness: f64,
    pub logic: f64,
    pub standardization: f64,
    pub overall_score: f64,
}

fn system_prompt() -> String {
    format!("{EXAM_SYSTEM} {LANGUAGE_INSTRUCTION}")
}

pub async fn generate_question(
    llm: &LlmClient,
    exam_type: &str,
    question_type: QuestionType,
    topic: &str,
    difficulty: &str,
    context: &str,
) -> Result<ExamQuestion, AppError> {
    let exam = find_exam(exam_type)?;
    if !exam.supports(question_type) {
        return Err(AppError::Validation(format!(
            "{} does not offer {}s",
            exam.name,
            question_type.label()
        )));
    }

    let context = if context.trim().is_empty() { "(none)" } else { context };
    let prompt = render(
        QUESTION_PROMPT_TEMPLATE,
        &[
            ("question_type", question_type.label()),
            ("exam_name", exam.name),
            ("topic", topic),
            ("difficulty", difficulty),
            ("context", context),
        ],
    );
    let reply = llm
        .complete(&system_prompt(), &prompt, EXAM_TEMPERATURE)
        .await
        .map_err(|e| AppError::llm("question generation failed", e))?;
    let parsed = parse_question(&reply);

    Ok(ExamQuestion {
        id: 1,
        exam_type: exam.key.to_string(),
        question_type,
        topic: topic.to_string(),
        difficulty: difficulty.to_string(),
        question: parsed.question,
        options: parsed.options,
        answer: parsed.answer,
        explanation: parsed.explanation,
        generated_at: Utc::now(),
    })
}

/// Generates up to `count` questions (capped at 50), rotating through the
/// exam's question types. Failed generations are skipped; ids run 1..n over
/// the questions that succeeded.
pub async fn generate_question_set(
    llm: &LlmClient,
    exam_type: &str,
    topic: &str,
    count: usize,
    difficulty: &str,
    context: &str,
) -> Result<Vec<ExamQuestion>, AppError> {
    let exam = find_exam(exam_type)?;
    let count = count.min(MAX_QUESTION_SET);
    let mut questions = Vec::with_capacity(count);

    for i in 0..count {
        if i > 0 {
            tokio::time::sleep(GENERATION_PAUSE).await;
        }
        let question_type = exam.question_types[i % exam.question_types.len()];
        match generate_question(llm, exam_type, question_type, topic, difficulty, context).await {
            Ok(mut question) => {
                question.id = questions.len() as u32 + 1;
                questions.push(question);
            }
            Err(AppError::LlmUnavailable) => return Err(AppError::LlmUnavailable),
            Err(e) => warn!("Skipping question {} of {} for {}: {e}", i + 1, count, exam_type),
        }
    }

    info!(
        "Generated {}/{} {} questions on '{}'",
        questions.len(),
        count,
        exam_type,
        topic
    );
    Ok(questions)
}

pub async fn evaluate_answer(
    llm: &LlmClient,
    question: &str,
    correct_answer: &str,
    user_answer: &str,
) -> Result<ExamAnswerEvaluation, AppError> {
    let prompt = render(
        EVALUATION_PROMPT_TEMPLATE,
        &[
            ("question", question),
            ("correct_answer", correct_answer),
            ("user_answer", user_answer),
        ],
    );
    let evaluation = llm
        .complete(&system_prompt(), &prompt, EXAM_TEMPERATURE)
        .await
        .map_err(|e| AppError::llm("exam answer evaluation failed", e))?;
    Ok(evaluation_from_text(evaluation))
}

fn evaluation_from_text(evaluation: String) -> ExamAnswerEvaluation {
    let (scores, overall_score) = score_dimensions(&evaluation, 4, DEFAULT_DIMENSION_SCORE);
    ExamAnswerEvaluation {
        accuracy: scores[0],
        completeness: scores[1],
        logic: scores[2],
        standardization: scores[3],
        overall_score,
        evaluation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluation_dimensions() {
        let eval = evaluation_from_text(
            "1. Accuracy: 8/10\n2. Completeness: 6/10\n3. Logic: 7分\nAssessment follows.".into(),
        );
        assert_eq!(eval.accuracy, 8.0);
        assert_eq!(eval.completeness, 6.0);
        assert_eq!(eval.logic, 7.0);
        assert_eq!(eval.standardization, DEFAULT_DIMENSION_SCORE);
        assert_eq!(eval.overall_score, 7.0);
    }
}
