//! QnA agent: answers, self-evaluation and follow-up questions over retrieved context.

use serde::Serialize;

use crate::errors::AppError;
use crate::llm_client::parse::score_dimensions;
use crate::llm_client::prompts::{render, GROUNDING_INSTRUCTION, LANGUAGE_INSTRUCTION};
use crate::llm_client::LlmClient;
use crate::qna::parser::{fallback_related_questions, parse_answer, parse_numbered_list};
use crate::qna::prompts::{
    CONVERSATION_PROMPT_TEMPLATE, EVALUATE_PROMPT_TEMPLATE, QNA_PROMPT_TEMPLATE, QNA_SYSTEM,
    RELATED_QUESTIONS_PROMPT_TEMPLATE,
};

const ANSWER_TEMPERATURE: f32 = 0.3;
const CONVERSATION_CONFIDENCE: f32 = 0.9;
const MAX_RELATED_QUESTIONS: usize = 5;
/// Score used for any dimension the evaluator did not rate.
const DEFAULT_DIMENSION_SCORE: f64 = 5.0;

#[derive(Debug, Clone, Serialize)]
pub struct QnaAnswer {
    pub answer: String,
    pub confidence: f32,
    pub sources: Vec<String>,
    pub conversation_mode: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerEvaluation {
    pub evaluation: String,
    pub accuracy: f64,
    pub completeness: f64,
    pub clarity: f64,
    pub relevance: f64,
    pub usefulness: f64,
    pub overall_score: f64,
}

fn system_prompt() -> String {
    format!("{QNA_SYSTEM} {GROUNDING_INSTRUCTION} {LANGUAGE_INSTRUCTION}")
}

/// Answers `question` from `context`. In conversation mode with prior history
/// the model's reply is returned as-is; otherwise its labelled output is parsed.
pub async fn answer_question(
    llm: &LlmClient,
    question: &str,
    context: &str,
    history: &str,
    conversation_mode: bool,
) -> Result<QnaAnswer, AppError> {
    let vars = [("question", question), ("context", context), ("history", history)];

    if conversation_mode && !history.trim().is_empty() {
        let prompt = render(CONVERSATION_PROMPT_TEMPLATE, &vars);
        let reply = llm
            .complete(&system_prompt(), &prompt, ANSWER_TEMPERATURE)
            .await
            .map_err(|e| AppError::llm("conversational answer failed", e))?;
        return Ok(QnaAnswer {
            answer: reply,
            confidence: CONVERSATION_CONFIDENCE,
            sources: vec!["conversation context".to_string()],
            conversation_mode: true,
        });
    }

    let prompt = render(QNA_PROMPT_TEMPLATE, &vars);
    let reply = llm
        .complete(&system_prompt(), &prompt, ANSWER_TEMPERATURE)
        .await
        .map_err(|e| AppError::llm("answer generation failed", e))?;
    let parsed = parse_answer(&reply);
    Ok(QnaAnswer {
        answer: parsed.answer,
        confidence: parsed.confidence,
        sources: parsed.sources,
        conversation_mode,
    })
}

pub async fn evaluate_answer_quality(
    llm: &LlmClient,
    question: &str,
    answer: &str,
    expected_answer: Option<&str>,
) -> Result<AnswerEvaluation, AppError> {
    let expected = expected_answer
        .filter(|e| !e.trim().is_empty())
        .map(|e| format!("Reference answer: {e}\n"))
        .unwrap_or_default();
    let prompt = render(
        EVALUATE_PROMPT_TEMPLATE,
        &[("question", question), ("answer", answer), ("expected", &expected)],
    );
    let evaluation = llm
        .complete(&system_prompt(), &prompt, ANSWER_TEMPERATURE)
        .await
        .map_err(|e| AppError::llm("answer evaluation failed", e))?;
    Ok(evaluation_from_text(evaluation))
}

fn evaluation_from_text(evaluation: String) -> AnswerEvaluation {
    let (scores, overall_score) = score_dimensions(&evaluation, 5, DEFAULT_DIMENSION_SCORE);
    AnswerEvaluation {
        accuracy: scores[0],
        completeness: scores[1],
        clarity: scores[2],
        relevance: scores[3],
        usefulness: scores[4],
        overall_score,
        evaluation,
    }
}

/// Follow-up questions; falls back to three generic ones when the model's
/// reply has no numbered list.
pub async fn related_questions(
    llm: &LlmClient,
    question: &str,
    context: &str,
) -> Result<Vec<String>, AppError> {
    let prompt = render(
        RELATED_QUESTIONS_PROMPT_TEMPLATE,
        &[("question", question), ("context", context)],
    );
    let reply = llm
        .complete(&system_prompt(), &prompt, ANSWER_TEMPERATURE)
        .await
        .map_err(|e| AppError::llm("related question generation failed", e))?;

    let mut questions = parse_numbered_list(&reply);
    if questions.is_empty() {
        return Ok(fallback_related_questions(question));
    }
    questions.truncate(MAX_RELATED_QUESTIONS);
    Ok(questions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluation_from_text_maps_dimensions_in_order() {
        let text = "1. Accuracy: 9/10\n2. Completeness: 7/10\n3. Clarity: 8/10\n4. Relevance: 10/10\n5. Usefulness: 6/10";
        let eval = evaluation_from_text(text.to_string());
        assert_eq!(eval.accuracy, 9.0);
        assert_eq!(eval.usefulness, 6.0);
        assert_eq!(eval.overall_score, 8.0);
    }

    #[test]
    fn test_evaluation_defaults_when_unscored() {
        let eval = evaluation_from_text("Looks fine overall.".to_string());
        assert_eq!(eval.clarity, 5.0);
        assert_eq!(eval.overall_score, 5.0);
    }
}
