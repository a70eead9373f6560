//! Interviewer agent. Every call is stateless; the conversation lives in the
//! session transcript and is replayed into each prompt.

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::interview::prompts::{
    CLOSING_PROMPT_TEMPLATE, FEEDBACK_PROMPT_TEMPLATE, OPENING_PROMPT_TEMPLATE,
    TURN_PROMPT_TEMPLATE,
};
use crate::interview::session::InterviewSession;
use crate::llm_client::parse::{first_number, strip_label};
use crate::llm_client::prompts::{render, LANGUAGE_INSTRUCTION};
use crate::llm_client::{ChatMessage, LlmClient, LlmError};

pub const MAX_TURN_SCORE: f64 = 5.0;

const SCORE_LABELS: [&str; 2] = ["score", "评分"];
const FOLLOW_UP_LABELS: [&str; 3] = ["follow-up", "follow up", "追问"];
const COMMENT_LABELS: [&str; 2] = ["comment", "评语"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnEvaluation {
    pub score: f64,
    pub follow_up: String,
    pub comment: String,
}

/// Reads the first three non-empty lines as score, follow-up question and
/// comment. Missing lines are empty; an unreadable score is 0.
pub fn parse_turn_evaluation(text: &str) -> TurnEvaluation {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

    let score = lines
        .next()
        .map(|l| strip_label(l, &SCORE_LABELS).unwrap_or(l))
        .and_then(first_number)
        .map(|s| s.clamp(0.0, MAX_TURN_SCORE))
        .unwrap_or(0.0);
    let follow_up = lines
        .next()
        .map(|l| strip_label(l, &FOLLOW_UP_LABELS).unwrap_or(l).to_string())
        .unwrap_or_default();
    let comment = lines
        .next()
        .map(|l| strip_label(l, &COMMENT_LABELS).unwrap_or(l).to_string())
        .unwrap_or_default();

    TurnEvaluation {
        score,
        follow_up,
        comment,
    }
}

fn system_prompt(session: &InterviewSession) -> String {
    format!("{} {LANGUAGE_INSTRUCTION}", session.scene.persona())
}

fn turn_prompt(session: &InterviewSession, context: &str, answer: &str) -> String {
    let context = if context.trim().is_empty() {
        "(none)"
    } else {
        context
    };
    render(
        TURN_PROMPT_TEMPLATE,
        &[
            ("history", &session.history_text()),
            ("context", context),
            ("question", session.last_question().unwrap_or_default()),
            ("answer", answer),
            ("focus", session.scene.evaluation_focus()),
        ],
    )
}

async fn ask(
    llm: &LlmClient,
    session: &InterviewSession,
    prompt: String,
    temperature: f32,
    what: &str,
) -> Result<String, AppError> {
    llm.complete(&system_prompt(session), &prompt, temperature)
        .await
        .map_err(|e| AppError::llm(what, e))
}

pub async fn opening_question(
    llm: &LlmClient,
    session: &InterviewSession,
    temperature: f32,
) -> Result<String, AppError> {
    let prompt = render(OPENING_PROMPT_TEMPLATE, &[("topic", &session.topic)]);
    ask(llm, session, prompt, temperature, "opening question failed").await
}

pub async fn evaluate_turn(
    llm: &LlmClient,
    session: &InterviewSession,
    context: &str,
    answer: &str,
    temperature: f32,
) -> Result<TurnEvaluation, AppError> {
    let reply = ask(
        llm,
        session,
        turn_prompt(session, context, answer),
        temperature,
        "answer evaluation failed",
    )
    .await?;
    Ok(parse_turn_evaluation(&reply))
}

/// Same prompt as [`evaluate_turn`], streamed. The caller accumulates the
/// fragments and parses them with [`parse_turn_evaluation`].
pub async fn stream_turn(
    llm: &LlmClient,
    session: &InterviewSession,
    context: &str,
    answer: &str,
    temperature: f32,
) -> Result<BoxStream<'static, Result<String, LlmError>>, AppError> {
    let prompt = turn_prompt(session, context, answer);
    let messages = [ChatMessage::system(system_prompt(session)), ChatMessage::user(prompt)];
    llm.stream(&messages, temperature)
        .await
        .map_err(|e| AppError::llm("streaming evaluation failed", e))
}

pub async fn closing_remarks(
    llm: &LlmClient,
    session: &InterviewSession,
    temperature: f32,
) -> Result<String, AppError> {
    let prompt = render(CLOSING_PROMPT_TEMPLATE, &[("history", &session.history_text())]);
    ask(llm, session, prompt, temperature, "closing remarks failed").await
}

pub async fn feedback(
    llm: &LlmClient,
    session: &InterviewSession,
    temperature: f32,
) -> Result<String, AppError> {
    let prompt = render(
        FEEDBACK_PROMPT_TEMPLATE,
        &[("topic", &session.topic), ("history", &session.history_text())],
    );
    ask(llm, session, prompt, temperature, "feedback generation failed").await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_labelled_evaluation() {
        let text = "Score: 4\nFollow-up: How does the borrow checker handle loops?\nComment: Solid answer.";
        let eval = parse_turn_evaluation(text);
        assert_eq!(eval.score, 4.0);
        assert_eq!(eval.follow_up, "How does the borrow checker handle loops?");
        assert_eq!(eval.comment, "Solid answer.");
    }

    #[test]
    fn test_parse_bare_lines_and_blank_gaps() {
        let text = "\n3.5\n\nWhat is a trait object?\n\nClear but brief.\nextra line";
        let eval = parse_turn_evaluation(text);
        assert_eq!(eval.score, 3.5);
        assert_eq!(eval.follow_up, "What is a trait object?");
        assert_eq!(eval.comment, "Clear but brief.");
    }

    #[test]
    fn test_score_is_clamped_and_defaults_to_zero() {
        assert_eq!(parse_turn_evaluation("Score: 9/10").score, MAX_TURN_SCORE);
        assert_eq!(parse_turn_evaluation("评分：优秀").score, 0.0);
        assert_eq!(parse_turn_evaluation("Score: -2").score, 0.0);
    }

    #[test]
    fn test_missing_lines_are_empty() {
        let eval = parse_turn_evaluation("2");
        assert_eq!(eval.score, 2.0);
        assert!(eval.follow_up.is_empty());
        assert!(eval.comment.is_empty());
        assert_eq!(parse_turn_evaluation(""), TurnEvaluation {
            score: 0.0,
            follow_up: String::new(),
            comment: String::new(),
        });
    }

    #[test]
    fn test_chinese_labels_are_stripped() {
        let eval = parse_turn_evaluation("评分：3\n追问：什么是生命周期？\n评语：回答较完整。");
        assert_eq!(eval.score, 3.0);
        assert_eq!(eval.follow_up, "什么是生命周期？");
        assert_eq!(eval.comment, "回答较完整。");
    }
}
