//! Parsers for question-answering model output.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::llm_client::parse::{first_number, strip_label};
use crate::llm_client::strip_json_fences;

pub const DEFAULT_CONFIDENCE: f32 = 0.8;

const ANSWER_LABELS: [&str; 2] = ["answer", "答案"];
const CONFIDENCE_LABELS: [&str; 2] = ["confidence", "置信度"];
const SOURCES_LABELS: [&str; 3] = ["sources", "source", "来源"];

static NUMBERED_RE: OnceLock<Regex> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedAnswer {
    pub answer: String,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    #[serde(default)]
    pub sources: Vec<String>,
}

fn default_confidence() -> f32 {
    DEFAULT_CONFIDENCE
}

/// Reads an answer from either a JSON object or `Answer:` / `Confidence:` /
/// `Sources:` labelled lines. Without an answer label the whole text is the
/// answer.
pub fn parse_answer(text: &str) -> ParsedAnswer {
    let trimmed = text.trim();
    let unfenced = strip_json_fences(trimmed);
    if unfenced.starts_with('{') && unfenced.ends_with('}') {
        if let Ok(mut parsed) = serde_json::from_str::<ParsedAnswer>(unfenced) {
            parsed.confidence = parsed.confidence.clamp(0.0, 1.0);
            return parsed;
        }
    }

    let mut answer_lines: Vec<&str> = Vec::new();
    let mut saw_answer = false;
    let mut in_answer = false;
    let mut confidence = None;
    let mut sources = Vec::new();

    for line in trimmed.lines() {
        if let Some(rest) = strip_label(line, &ANSWER_LABELS) {
            saw_answer = true;
            in_answer = true;
            if !rest.is_empty() {
                answer_lines.push(rest);
            }
        } else if let Some(rest) = strip_label(line, &CONFIDENCE_LABELS) {
            in_answer = false;
            confidence = first_number(rest).map(|c| c as f32);
        } else if let Some(rest) = strip_label(line, &SOURCES_LABELS) {
            in_answer = false;
            sources = split_sources(rest);
        } else if in_answer {
            answer_lines.push(line);
        }
    }

    let answer = if saw_answer {
        answer_lines.join("\n").trim().to_string()
    } else {
        trimmed.to_string()
    };

    ParsedAnswer {
        answer,
        confidence: confidence.unwrap_or(DEFAULT_CONFIDENCE).clamp(0.0, 1.0),
        sources,
    }
}

fn split_sources(text: &str) -> Vec<String> {
    text.split([',', '，', ';', '；'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Numbered list items (`1. ...`, `2) ...`, `3、...`), in order.
pub fn parse_numbered_list(text: &str) -> Vec<String> {
    let re = NUMBERED_RE.get_or_init(|| Regex::new(r"(?m)^\s*\d+\s*[.)、]\s*(.+?)\s*$").unwrap());
    re.captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn fallback_related_questions(question: &str) -> Vec<String> {
    vec![
        format!("What are the key details of {question}?"),
        format!("Where is {question} applied in practice?"),
        format!("How can I study {question} in more depth?"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_labelled_answer() {
        let text = "Answer: Ownership moves values.\nBorrowing lends them.\nConfidence: 0.92\nSources: rust book, chapter 4; nomicon";
        let parsed = parse_answer(text);
        assert_eq!(parsed.answer, "Ownership moves values.\nBorrowing lends them.");
        assert!((parsed.confidence - 0.92).abs() < 1e-6);
        assert_eq!(parsed.sources, vec!["rust book", "chapter 4", "nomicon"]);
    }

    #[test]
    fn test_parse_chinese_labels() {
        let text = "答案：TCP 是面向连接的协议\n置信度: 0.7\n来源：教材，讲义";
        let parsed = parse_answer(text);
        assert_eq!(parsed.answer, "TCP 是面向连接的协议");
        assert!((parsed.confidence - 0.7).abs() < 1e-6);
        assert_eq!(parsed.sources, vec!["教材", "讲义"]);
    }

    #[test]
    fn test_unlabelled_text_is_the_answer() {
        let parsed = parse_answer("  Just a plain reply.  ");
        assert_eq!(parsed.answer, "Just a plain reply.");
        assert_eq!(parsed.confidence, DEFAULT_CONFIDENCE);
        assert!(parsed.sources.is_empty());
    }

    #[test]
    fn test_confidence_is_clamped() {
        assert_eq!(parse_answer("Answer: x\nConfidence: 85").confidence, 1.0);
        assert_eq!(parse_answer("Answer: x\nConfidence: unsure").confidence, DEFAULT_CONFIDENCE);
    }

    #[test]
    fn test_json_answer_accepted() {
        let parsed = parse_answer(r#"{"answer": "42", "sources": ["guide"]}"#);
        assert_eq!(parsed.answer, "42");
        assert_eq!(parsed.confidence, DEFAULT_CONFIDENCE);
        assert_eq!(parsed.sources, vec!["guide"]);
    }

    #[test]
    fn test_fenced_json_answer_accepted() {
        let parsed = parse_answer(
            "```json\n{\"answer\": \"42\", \"confidence\": 0.9, \"sources\": [\"guide\"]}\n```",
        );
        assert_eq!(parsed.answer, "42");
        assert!((parsed.confidence - 0.9).abs() < 1e-6);
        assert_eq!(parsed.sources, vec!["guide"]);
    }

    #[test]
    fn test_invalid_json_falls_back_to_text() {
        let parsed = parse_answer("{not json}");
        assert_eq!(parsed.answer, "{not json}");
    }

    #[test]
    fn test_parse_numbered_list() {
        let text = "Here you go:\n1. What is a lifetime?\n2) Why Box?\n 3、何为借用？\nnot numbered";
        assert_eq!(
            parse_numbered_list(text),
            vec!["What is a lifetime?", "Why Box?", "何为借用？"]
        );
        assert!(parse_numbered_list("none").is_empty());
    }

    #[test]
    fn test_fallback_related_questions() {
        let qs = fallback_related_questions("Raft");
        assert_eq!(qs.len(), 3);
        assert!(qs.iter().all(|q| q.contains("Raft")));
    }
}
