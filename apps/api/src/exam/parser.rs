//! Parsers for generated exam questions.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::llm_client::parse::strip_label;
use crate::llm_client::strip_json_fences;

const QUESTION_LABELS: [&str; 2] = ["question", "题目"];
const OPTIONS_LABELS: [&str; 2] = ["options", "选项"];
const ANSWER_LABELS: [&str; 2] = ["answer", "答案"];
const EXPLANATION_LABELS: [&str; 2] = ["explanation", "解析"];

static LETTER_RE: OnceLock<Regex> = OnceLock::new();
static NUMBER_RE: OnceLock<Regex> = OnceLock::new();
static BULLET_RE: OnceLock<Regex> = OnceLock::new();

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedQuestion {
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub explanation: String,
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Preamble,
    Question,
    Options,
    Answer,
    Explanation,
}

/// Accepts a JSON object, or labelled `Question:` / `Options:` / `Answer:` /
/// `Explanation:` sections. Without a question label the whole text is the
/// question.
pub fn parse_question(text: &str) -> ParsedQuestion {
    let trimmed = strip_json_fences(text);
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        if let Ok(parsed) = serde_json::from_str::<ParsedQuestion>(trimmed) {
            return parsed;
        }
    }

    let mut section = Section::Preamble;
    let mut question = Vec::new();
    let mut options = Vec::new();
    let mut answer = Vec::new();
    let mut explanation = Vec::new();

    for line in trimmed.lines() {
        let (next, rest) = if let Some(rest) = strip_label(line, &QUESTION_LABELS) {
            (Section::Question, rest)
        } else if let Some(rest) = strip_label(line, &OPTIONS_LABELS) {
            (Section::Options, rest)
        } else if let Some(rest) = strip_label(line, &ANSWER_LABELS) {
            (Section::Answer, rest)
        } else if let Some(rest) = strip_label(line, &EXPLANATION_LABELS) {
            (Section::Explanation, rest)
        } else {
            (section, line.trim())
        };
        section = next;
        if rest.is_empty() {
            continue;
        }
        match section {
            Section::Preamble => {}
            Section::Question => question.push(rest),
            Section::Options => options.push(rest),
            Section::Answer => answer.push(rest),
            Section::Explanation => explanation.push(rest),
        }
    }

    let question = if question.is_empty() {
        trimmed.to_string()
    } else {
        question.join("\n")
    };

    ParsedQuestion {
        question,
        options: parse_options(&options.join("\n")),
        answer: answer.join("\n"),
        explanation: explanation.join("\n"),
    }
}

/// Options written as `A.`–`D.` letters, numbers or bullets, tried in that
/// order. Lettered and numbered options come back sorted by label.
pub fn parse_options(text: &str) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let letters = LETTER_RE.get_or_init(|| Regex::new(r"(?:^|\s)([A-D])\s*[.)、．]\s*").unwrap());
    let mut options = labelled_options(text, letters, |label| label.to_string());
    if options.is_empty() {
        let numbers = NUMBER_RE.get_or_init(|| Regex::new(r"(?:^|\s)(\d+)(?:[.)]\s+|、\s*)").unwrap());
        options = labelled_options(text, numbers, |label| format!("{label:0>4}"));
    }
    if options.is_empty() {
        let bullets = BULLET_RE.get_or_init(|| Regex::new(r"(?m)^\s*[-•]\s*(.+?)\s*$").unwrap());
        options = bullets
            .captures_iter(text)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .collect();
    }
    options
}

/// Splits `text` at each marker matched by `re` (capture 1 is the label) and
/// sorts the pieces by `sort_key(label)`.
fn labelled_options(text: &str, re: &Regex, sort_key: impl Fn(&str) -> String) -> Vec<String> {
    let markers: Vec<(String, usize, usize)> = re
        .captures_iter(text)
        .filter_map(|c| {
            let whole = c.get(0)?;
            let label = c.get(1)?;
            Some((sort_key(label.as_str()), whole.start(), whole.end()))
        })
        .collect();

    let mut options: Vec<(String, String)> = markers
        .iter()
        .enumerate()
        .map(|(i, (key, _, end))| {
            let stop = markers.get(i + 1).map(|m| m.1).unwrap_or(text.len());
            (key.clone(), text[*end..stop].trim().to_string())
        })
        .filter(|(_, content)| !content.is_empty())
        .collect();
    options.sort_by(|a, b| a.0.cmp(&b.0));
    options.into_iter().map(|(_, content)| content).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_labelled_question() {
        let text = "Question: Which layer does TCP belong to?\nOptions:\nA. Network\nB. Transport\nC. Session\nD. Physical\nAnswer: B\nExplanation: TCP is a transport protocol.\nIt provides reliable delivery.";
        let q = parse_question(text);
        assert_eq!(q.question, "Which layer does TCP belong to?");
        assert_eq!(q.options, vec!["Network", "Transport", "Session", "Physical"]);
        assert_eq!(q.answer, "B");
        assert_eq!(
            q.explanation,
            "TCP is a transport protocol.\nIt provides reliable delivery."
        );
    }

    #[test]
    fn test_parse_chinese_labels() {
        let text = "题目：下列哪项是项目章程的作用？\n选项：A. 授权项目 B. 制定预算 C. 招聘 D. 验收\n答案：A\n解析：章程正式授权项目。";
        let q = parse_question(text);
        assert_eq!(q.question, "下列哪项是项目章程的作用？");
        assert_eq!(q.options, vec!["授权项目", "制定预算", "招聘", "验收"]);
        assert_eq!(q.answer, "A");
        assert_eq!(q.explanation, "章程正式授权项目。");
    }

    #[test]
    fn test_unlabelled_text_is_the_question() {
        let q = parse_question("Describe the CAP theorem.");
        assert_eq!(q.question, "Describe the CAP theorem.");
        assert!(q.options.is_empty());
        assert!(q.answer.is_empty());
    }

    #[test]
    fn test_json_question_accepted() {
        let q = parse_question("```json\n{\"question\": \"2+2?\", \"options\": [\"3\", \"4\"], \"answer\": \"4\"}\n```");
        assert_eq!(q.question, "2+2?");
        assert_eq!(q.options, vec!["3", "4"]);
        assert_eq!(q.answer, "4");
        assert!(q.explanation.is_empty());
    }

    #[test]
    fn test_letter_options_sorted_by_label() {
        assert_eq!(parse_options("B) second\nA) first"), vec!["first", "second"]);
        assert_eq!(parse_options("A、甲 B、乙"), vec!["甲", "乙"]);
    }

    #[test]
    fn test_numbered_options_sorted_numerically() {
        assert_eq!(
            parse_options("10. ten\n2. two\n1. one"),
            vec!["one", "two", "ten"]
        );
    }

    #[test]
    fn test_bullet_options() {
        assert_eq!(parse_options("- red\n• green\n- blue"), vec!["red", "green", "blue"]);
        assert!(parse_options("   ").is_empty());
    }
}
