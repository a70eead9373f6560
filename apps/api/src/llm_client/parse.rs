//! Helpers for reading free-text model output: labelled lines, numbers and
//! "N/10" style scores.

use std::sync::OnceLock;

use regex::Regex;

static NUMBER_RE: OnceLock<Regex> = OnceLock::new();
static SCORE_RE: OnceLock<Regex> = OnceLock::new();

fn number_re() -> &'static Regex {
    NUMBER_RE.get_or_init(|| Regex::new(r"-?\d+(?:\.\d+)?").unwrap())
}

/// If `line` starts with one of `labels` followed by an ASCII or full-width
/// colon, returns the trimmed remainder. ASCII labels match case-insensitively;
/// leading markdown emphasis and heading marks are ignored.
pub fn strip_label<'a>(line: &'a str, labels: &[&str]) -> Option<&'a str> {
    let line = line.trim().trim_start_matches(['*', '#', ' ']);
    for label in labels {
        let Some(head) = line.get(..label.len()) else {
            continue;
        };
        if !head.eq_ignore_ascii_case(label) {
            continue;
        }
        let rest = line[label.len()..].trim_start_matches(['*', ' ']);
        if let Some(value) = rest
            .strip_prefix(':')
            .or_else(|| rest.strip_prefix('：'))
        {
            return Some(value.trim_start_matches('*').trim());
        }
    }
    None
}

/// The first decimal number in `text`.
pub fn first_number(text: &str) -> Option<f64> {
    number_re()
        .find(text)
        .and_then(|m| m.as_str().parse().ok())
}

/// Scores written as `N/10` or `N分`, in order of appearance, clamped to 0–10.
pub fn extract_scores(text: &str) -> Vec<f64> {
    let re = SCORE_RE.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)\s*(?:/\s*10\b|分)").unwrap());
    re.captures_iter(text)
        .filter_map(|c| c.get(1)?.as_str().parse::<f64>().ok())
        .map(|s| s.clamp(0.0, 10.0))
        .collect()
}

/// Takes the first `n` extracted scores, padding with `default`. The overall
/// score is the mean of the scores actually found (or `default` if none were).
pub fn score_dimensions(text: &str, n: usize, default: f64) -> (Vec<f64>, f64) {
    let found: Vec<f64> = extract_scores(text).into_iter().take(n).collect();
    let overall = if found.is_empty() {
        default
    } else {
        found.iter().sum::<f64>() / found.len() as f64
    };
    let mut scores = found;
    scores.resize(n, default);
    (scores, round2(overall))
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_label_variants() {
        assert_eq!(strip_label("Answer: 42", &["answer"]), Some("42"));
        assert_eq!(strip_label("  ANSWER :  42 ", &["answer"]), Some("42"));
        assert_eq!(strip_label("**Answer:** 42", &["answer"]), Some("42"));
        assert_eq!(strip_label("答案：四十二", &["answer", "答案"]), Some("四十二"));
        assert_eq!(strip_label("Answers are hard", &["answer"]), None);
        assert_eq!(strip_label("答", &["答案"]), None);
    }

    #[test]
    fn test_first_number() {
        assert_eq!(first_number("score 4.5 of 5"), Some(4.5));
        assert_eq!(first_number("no digits"), None);
    }

    #[test]
    fn test_extract_scores_in_order() {
        let text = "1. Accuracy: 8/10 good\n2. Completeness: 6 / 10\n3. 清晰度：9分\n4. Relevance 100/10";
        assert_eq!(extract_scores(text), vec![8.0, 6.0, 9.0, 10.0]);
    }

    #[test]
    fn test_score_dimensions_pads_and_averages_found() {
        let (scores, overall) = score_dimensions("7/10 and 8/10", 5, 5.0);
        assert_eq!(scores, vec![7.0, 8.0, 5.0, 5.0, 5.0]);
        assert_eq!(overall, 7.5);

        let (scores, overall) = score_dimensions("nothing here", 4, 5.0);
        assert_eq!(scores, vec![5.0; 4]);
        assert_eq!(overall, 5.0);
    }
}
