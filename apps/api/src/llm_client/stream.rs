//! Incremental decoder for OpenAI-compatible server-sent event streams.
//!
//! Network chunks do not respect line (or UTF-8) boundaries, so bytes are
//! buffered until a full line is available.

use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub enum StreamSignal {
    Fragment(String),
    Done,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Debug, Default)]
pub struct SseLineDecoder {
    buffer: Vec<u8>,
}

impl SseLineDecoder {
    /// Feeds raw bytes, returning signals for every completed line.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamSignal> {
        self.buffer.extend_from_slice(chunk);
        let mut signals = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(signal) = parse_line(&line) {
                signals.push(signal);
            }
        }
        signals
    }

    /// Flushes a trailing line that arrived without a newline.
    pub fn finish(&mut self) -> Vec<StreamSignal> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        let line = String::from_utf8_lossy(&self.buffer).into_owned();
        self.buffer.clear();
        parse_line(&line).into_iter().collect()
    }
}

fn parse_line(line: &str) -> Option<StreamSignal> {
    let data = line.trim().strip_prefix("data:")?.trim();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(StreamSignal::Done);
    }
    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => chunk
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta.content)
            .filter(|c| !c.is_empty())
            .map(StreamSignal::Fragment),
        Err(e) => {
            warn!("Skipping malformed stream line: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    #[test]
    fn test_decodes_fragments_and_done() {
        let mut decoder = SseLineDecoder::default();
        let input = format!("{}{}data: [DONE]\n", frame("Hel"), frame("lo"));
        let signals = decoder.push(input.as_bytes());
        assert_eq!(
            signals,
            vec![
                StreamSignal::Fragment("Hel".into()),
                StreamSignal::Fragment("lo".into()),
                StreamSignal::Done
            ]
        );
    }

    #[test]
    fn test_line_split_across_chunks() {
        let mut decoder = SseLineDecoder::default();
        let input = frame("分布式");
        let bytes = input.as_bytes();
        // Split mid-line; the payload is multi-byte UTF-8.
        let (a, b) = bytes.split_at(bytes.len() / 2 + 1);
        assert!(decoder.push(a).is_empty());
        assert_eq!(
            decoder.push(b),
            vec![StreamSignal::Fragment("分布式".into())]
        );
    }

    #[test]
    fn test_ignores_comments_and_role_only_deltas() {
        let mut decoder = SseLineDecoder::default();
        let input = ": keep-alive\ndata: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n";
        assert!(decoder.push(input.as_bytes()).is_empty());
    }

    #[test]
    fn test_malformed_line_skipped() {
        let mut decoder = SseLineDecoder::default();
        let input = format!("data: {{not json\n{}", frame("ok"));
        assert_eq!(
            decoder.push(input.as_bytes()),
            vec![StreamSignal::Fragment("ok".into())]
        );
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        let mut decoder = SseLineDecoder::default();
        assert!(decoder.push(b"data: [DONE]").is_empty());
        assert_eq!(decoder.finish(), vec![StreamSignal::Done]);
        assert!(decoder.finish().is_empty());
    }
}
