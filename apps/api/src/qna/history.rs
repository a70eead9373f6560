//! Multi-turn conversation memory, one Redis string per (user, knowledge base).

use uuid::Uuid;

use crate::cache::RedisCache;
use crate::errors::AppError;

/// Lines kept: ten question/answer exchanges.
pub const MAX_HISTORY_LINES: usize = 20;
pub const HISTORY_TTL_SECS: u64 = 3600;

pub fn history_key(user_id: &str, kb_id: Uuid) -> String {
    format!("conversation_history:{user_id}:{kb_id}")
}

/// Appends one exchange and keeps the most recent `MAX_HISTORY_LINES` lines.
/// Newlines inside messages are flattened so each message is one line.
pub fn append_exchange(history: &str, question: &str, answer: &str) -> String {
    let flatten = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut lines: Vec<String> = history
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(String::from)
        .collect();
    lines.push(format!("User: {}", flatten(question)));
    lines.push(format!("Assistant: {}", flatten(answer)));
    let skip = lines.len().saturating_sub(MAX_HISTORY_LINES);
    lines.split_off(skip).join("\n")
}

pub fn exchange_count(history: &str) -> usize {
    history.lines().filter(|l| !l.trim().is_empty()).count() / 2
}

pub async fn load(cache: &RedisCache, user_id: &str, kb_id: Uuid) -> Result<String, AppError> {
    Ok(cache
        .get_json::<String>(&history_key(user_id, kb_id))
        .await?
        .unwrap_or_default())
}

pub async fn save(
    cache: &RedisCache,
    user_id: &str,
    kb_id: Uuid,
    history: &str,
) -> Result<(), AppError> {
    cache
        .set_json(&history_key(user_id, kb_id), &history, HISTORY_TTL_SECS)
        .await?;
    Ok(())
}

pub async fn clear(cache: &RedisCache, user_id: &str, kb_id: Uuid) -> Result<bool, AppError> {
    Ok(cache.delete(&history_key(user_id, kb_id)).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_to_empty_history() {
        let h = append_exchange("", "What is Rust?", "A language.");
        assert_eq!(h, "User: What is Rust?\nAssistant: A language.");
        assert_eq!(exchange_count(&h), 1);
    }

    #[test]
    fn test_multiline_answer_is_flattened() {
        let h = append_exchange("", "q", "line one\nline two");
        assert_eq!(h.lines().count(), 2);
        assert!(h.ends_with("Assistant: line one line two"));
    }

    #[test]
    fn test_history_keeps_last_ten_exchanges() {
        let mut h = String::new();
        for i in 0..15 {
            h = append_exchange(&h, &format!("q{i}"), &format!("a{i}"));
        }
        assert_eq!(h.lines().count(), MAX_HISTORY_LINES);
        assert_eq!(exchange_count(&h), 10);
        assert!(h.starts_with("User: q5\n"));
        assert!(h.ends_with("Assistant: a14"));
    }

    #[test]
    fn test_history_key_format() {
        let kb = Uuid::nil();
        assert_eq!(
            history_key("alice", kb),
            format!("conversation_history:alice:{kb}")
        );
    }
}
