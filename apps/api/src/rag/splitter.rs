//! Text Splitter: recursive character chunking for the RAG pipeline.
//!
//! Text is split on the coarsest separator present (`"\n\n"`, `"\n"`, `" "`,
//! then individual characters). Small pieces are greedily merged back into
//! windows of at most `chunk_size` characters; consecutive windows share up to
//! `chunk_overlap` characters of trailing pieces.
//!
//! All lengths are measured in `char`s, not bytes, so CJK text is budgeted the
//! same way as ASCII.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::rag::loader::LoadedSection;

const SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

/// A chunk ready for embedding, with positional metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkDraft {
    pub content: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    /// `chunk_overlap` is clamped below `chunk_size`; `chunk_size` is at least 1.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &SEPARATORS)
    }

    /// Splits every loaded section, numbering chunks from 1 within each section.
    pub fn split_sections(&self, source: &str, sections: &[LoadedSection]) -> Vec<ChunkDraft> {
        let mut drafts = Vec::new();
        for section in sections {
            for (i, content) in self.split_text(&section.content).into_iter().enumerate() {
                drafts.push(ChunkDraft {
                    content,
                    metadata: json!({
                        "source": source,
                        "page": section.page,
                        "chunk_index": i + 1,
                    }),
                });
            }
        }
        drafts
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut separator = "";
        let mut remaining: &[&str] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = sep;
                remaining = &[];
                break;
            }
            if text.contains(sep) {
                separator = sep;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let splits: Vec<String> = if separator.is_empty() {
            text.chars().map(String::from).collect()
        } else {
            text.split(separator)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        };

        let mut chunks = Vec::new();
        let mut good: Vec<String> = Vec::new();
        for piece in splits {
            if char_len(&piece) < self.chunk_size {
                good.push(piece);
                continue;
            }
            if !good.is_empty() {
                chunks.extend(self.merge(&good, separator));
                good.clear();
            }
            if remaining.is_empty() {
                let trimmed = piece.trim();
                if !trimmed.is_empty() {
                    chunks.push(trimmed.to_string());
                }
            } else {
                chunks.extend(self.split_recursive(&piece, remaining));
            }
        }
        if !good.is_empty() {
            chunks.extend(self.merge(&good, separator));
        }
        chunks
    }

    fn merge(&self, pieces: &[String], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut docs = Vec::new();
        // (piece, char length)
        let mut window: Vec<(&str, usize)> = Vec::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            let joined_len = |window: &Vec<(&str, usize)>, total: usize| {
                total + len + if window.is_empty() { 0 } else { sep_len }
            };

            if joined_len(&window, total) > self.chunk_size && !window.is_empty() {
                push_joined(&mut docs, &window, separator);
                while total > self.chunk_overlap
                    || (joined_len(&window, total) > self.chunk_size && total > 0)
                {
                    let (_, first_len) = window.remove(0);
                    total -= first_len + if window.is_empty() { 0 } else { sep_len };
                }
            }

            total += len + if window.is_empty() { 0 } else { sep_len };
            window.push((piece.as_str(), len));
        }

        push_joined(&mut docs, &window, separator);
        docs
    }
}

fn push_joined(docs: &mut Vec<String>, window: &[(&str, usize)], separator: &str) {
    let joined = window
        .iter()
        .map(|(s, _)| *s)
        .collect::<Vec<_>>()
        .join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Packs paragraphs into pieces of at most `max_len` characters.
///
/// Paragraphs are separated by blank lines and re-joined with `"\n\n"`. A
/// paragraph longer than `max_len` is hard-split on its own.
pub fn split_long_text(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    for para in paragraphs(text) {
        let para_len = char_len(para);
        if para_len > max_len {
            flush(&mut chunks, &mut current);
            chunks.extend(TextSplitter::new(max_len, 0).split_text(para));
            continue;
        }
        if !current.is_empty() && char_len(&current) + para_len + 2 > max_len {
            flush(&mut chunks, &mut current);
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(para);
    }
    flush(&mut chunks, &mut current);
    chunks
}

fn paragraphs(text: &str) -> impl Iterator<Item = &str> {
    let mut out = Vec::new();
    let mut start = 0usize;
    let mut blank_run = false;
    let mut para_end = 0usize;
    for (idx, line) in line_spans(text) {
        if line.trim().is_empty() {
            if !blank_run {
                out.push(&text[start..para_end]);
                blank_run = true;
            }
        } else {
            if blank_run {
                start = idx;
                blank_run = false;
            }
            para_end = idx + line.len();
        }
    }
    if !blank_run {
        out.push(&text[start..para_end.max(start)]);
    }
    out.into_iter().map(str::trim).filter(|p| !p.is_empty())
}

/// Lines with their byte offsets (line text excludes the newline).
fn line_spans(text: &str) -> impl Iterator<Item = (usize, &str)> {
    let mut offset = 0usize;
    text.split('\n').map(move |line| {
        let start = offset;
        offset += line.len() + 1;
        (start, line)
    })
}

fn flush(chunks: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
    current.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strip_ws(s: &str) -> String {
        s.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let splitter = TextSplitter::new(100, 10);
        assert_eq!(splitter.split_text("Hello world."), vec!["Hello world."]);
    }

    #[test]
    fn test_empty_and_whitespace_yield_nothing() {
        let splitter = TextSplitter::new(100, 10);
        assert!(splitter.split_text("").is_empty());
        assert!(splitter.split_text(" \n\n \n").is_empty());
    }

    #[test]
    fn test_chunks_respect_size_limit() {
        let splitter = TextSplitter::new(50, 10);
        let text = "Ownership is Rust's most unique feature. ".repeat(20)
            + "\n\n"
            + &"Borrowing lets you reference data without taking ownership. ".repeat(10);
        let chunks = splitter.split_text(&text);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.chars().count() <= 50, "chunk too long: {c:?}");
        }
    }

    #[test]
    fn test_unbroken_text_falls_back_to_characters() {
        let splitter = TextSplitter::new(10, 0);
        let text = "x".repeat(35);
        let chunks = splitter.split_text(&text);
        assert_eq!(chunks.len(), 4);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_cjk_measured_in_chars() {
        let splitter = TextSplitter::new(8, 0);
        let text = "分布式系统设计原则与实践指南";
        let chunks = splitter.split_text(text);
        assert!(chunks.iter().all(|c| c.chars().count() <= 8));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_no_overlap_preserves_all_content() {
        let splitter = TextSplitter::new(30, 0);
        let text = "alpha beta gamma delta\nepsilon zeta eta theta\n\niota kappa lambda mu nu xi omicron pi";
        let chunks = splitter.split_text(text);
        assert_eq!(strip_ws(&chunks.concat()), strip_ws(text));
    }

    #[test]
    fn test_overlap_repeats_trailing_words() {
        let splitter = TextSplitter::new(20, 8);
        let chunks = splitter.split_text("one two three four five six seven eight nine ten");
        assert!(chunks.len() >= 2);
        let first_last_word = chunks[0].split_whitespace().last().unwrap();
        assert!(
            chunks[1].starts_with(first_last_word),
            "expected overlap between {:?} and {:?}",
            chunks[0],
            chunks[1]
        );
    }

    #[test]
    fn test_overlap_clamped_below_size() {
        let splitter = TextSplitter::new(5, 50);
        let chunks = splitter.split_text("aa bb cc dd ee ff");
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.chars().count() <= 5));
    }

    #[test]
    fn test_split_sections_numbers_chunks_per_section() {
        let splitter = TextSplitter::new(12, 0);
        let sections = vec![
            LoadedSection {
                page: Some(1),
                content: "first page text here".into(),
            },
            LoadedSection {
                page: Some(2),
                content: "second".into(),
            },
        ];
        let drafts = splitter.split_sections("notes.pdf", &sections);
        assert_eq!(drafts[0].metadata["chunk_index"], 1);
        assert_eq!(drafts[0].metadata["page"], 1);
        let last = drafts.last().unwrap();
        assert_eq!(last.metadata["page"], 2);
        assert_eq!(last.metadata["chunk_index"], 1);
        assert_eq!(last.metadata["source"], "notes.pdf");
    }

    #[test]
    fn test_split_long_text_packs_paragraphs() {
        let text = "para one\n\npara two\n\n\npara three";
        let chunks = split_long_text(text, 20);
        assert_eq!(chunks, vec!["para one\n\npara two", "para three"]);
    }

    #[test]
    fn test_split_long_text_hard_splits_oversized_paragraph() {
        let long = "word ".repeat(30);
        let text = format!("intro\n\n{long}\n\noutro");
        let chunks = split_long_text(&text, 25);
        assert_eq!(chunks.first().map(String::as_str), Some("intro"));
        assert_eq!(chunks.last().map(String::as_str), Some("outro"));
        assert!(chunks.iter().all(|c| c.chars().count() <= 25));
    }

    #[test]
    fn test_split_long_text_never_emits_empty_pieces() {
        let chunks = split_long_text("abcdefghij\n\nk", 10);
        assert!(chunks.iter().all(|c| !c.is_empty()));
        assert_eq!(chunks, vec!["abcdefghij", "k"]);
    }
}
