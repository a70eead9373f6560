//! Ranking: pure scoring of stored chunks against a query vector.
//!
//! Results are sorted by descending score with a stable sort, so ties keep
//! candidate order (chunk id ascending when loaded from the store).

use crate::models::knowledge::{ChunkRow, ScoredChunk};
use crate::rag::embedding::cosine_similarity;
use crate::rag::splitter::split_long_text;

const VECTOR_WEIGHT: f32 = 0.7;
const KEYWORD_WEIGHT: f32 = 0.3;

pub fn rank_by_similarity(query: &[f32], candidates: Vec<ChunkRow>, top_k: usize) -> Vec<ScoredChunk> {
    rank_with(candidates, top_k, |chunk| cosine_similarity(query, &chunk.embedding))
}

/// `0.7 * cosine + 0.3 * keyword_hit`; an empty keyword falls back to pure
/// vector scoring.
pub fn rank_hybrid(
    query: &[f32],
    keyword: &str,
    candidates: Vec<ChunkRow>,
    top_k: usize,
) -> Vec<ScoredChunk> {
    let keyword = keyword.trim().to_lowercase();
    if keyword.is_empty() {
        return rank_by_similarity(query, candidates, top_k);
    }
    rank_with(candidates, top_k, |chunk| {
        let hit = if chunk.content.to_lowercase().contains(&keyword) {
            1.0
        } else {
            0.0
        };
        VECTOR_WEIGHT * cosine_similarity(query, &chunk.embedding) + KEYWORD_WEIGHT * hit
    })
}

fn rank_with<F>(candidates: Vec<ChunkRow>, top_k: usize, score: F) -> Vec<ScoredChunk>
where
    F: Fn(&ChunkRow) -> f32,
{
    if top_k == 0 {
        return Vec::new();
    }
    let mut scored: Vec<ScoredChunk> = candidates
        .into_iter()
        .map(|chunk| {
            let s = score(&chunk);
            ScoredChunk {
                id: chunk.id,
                document_id: chunk.document_id,
                content: chunk.content,
                metadata: chunk.metadata,
                score: s,
            }
        })
        .collect();
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(top_k);
    scored
}

/// Joins chunk contents with newlines, keeping the result within `max_chars`.
/// The chunk that would overflow contributes only its leading paragraphs.
pub fn build_context(chunks: &[ScoredChunk], max_chars: usize) -> String {
    let mut context = String::new();
    let mut used = 0usize;

    for chunk in chunks {
        let sep = usize::from(!context.is_empty());
        let len = chunk.content.chars().count();
        if used + sep + len <= max_chars {
            if sep == 1 {
                context.push('\n');
            }
            context.push_str(&chunk.content);
            used += sep + len;
            continue;
        }

        let room = max_chars.saturating_sub(used + sep);
        if room > 0 {
            if let Some(head) = split_long_text(&chunk.content, room).into_iter().next() {
                if sep == 1 {
                    context.push('\n');
                }
                context.push_str(&head);
            }
        }
        break;
    }
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn chunk(id: i64, content: &str, embedding: Vec<f32>) -> ChunkRow {
        ChunkRow {
            id,
            document_id: Uuid::nil(),
            content: content.to_string(),
            metadata: json!({}),
            embedding,
        }
    }

    fn scored(content: &str) -> ScoredChunk {
        ScoredChunk {
            id: 0,
            document_id: Uuid::nil(),
            content: content.to_string(),
            metadata: json!({}),
            score: 1.0,
        }
    }

    #[test]
    fn test_rank_by_similarity_orders_descending() {
        let candidates = vec![
            chunk(1, "far", vec![0.0, 1.0]),
            chunk(2, "near", vec![1.0, 0.1]),
            chunk(3, "exact", vec![1.0, 0.0]),
        ];
        let ranked = rank_by_similarity(&[1.0, 0.0], candidates, 2);
        let ids: Vec<i64> = ranked.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![3, 2]);
        assert!(ranked[0].score >= ranked[1].score);
    }

    #[test]
    fn test_ties_keep_candidate_order() {
        let candidates = vec![
            chunk(1, "a", vec![1.0, 0.0]),
            chunk(2, "b", vec![1.0, 0.0]),
            chunk(3, "c", vec![1.0, 0.0]),
        ];
        let ids: Vec<i64> = rank_by_similarity(&[1.0, 0.0], candidates, 3)
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_zero_top_k_is_empty() {
        let candidates = vec![chunk(1, "a", vec![1.0])];
        assert!(rank_by_similarity(&[1.0], candidates, 0).is_empty());
    }

    #[test]
    fn test_hybrid_keyword_boosts_match() {
        let candidates = vec![
            chunk(1, "generic text", vec![1.0, 0.0]),
            chunk(2, "About TCP handshakes", vec![0.8, 0.6]),
        ];
        let ranked = rank_hybrid(&[1.0, 0.0], "tcp", candidates, 2);
        assert_eq!(ranked[0].id, 2);
        assert!((ranked[0].score - (0.7 * 0.8 + 0.3)).abs() < 1e-5);
        assert!((ranked[1].score - 0.7).abs() < 1e-5);
    }

    #[test]
    fn test_hybrid_empty_keyword_is_pure_vector() {
        let candidates = vec![chunk(1, "x", vec![1.0, 0.0])];
        let ranked = rank_hybrid(&[1.0, 0.0], "  ", candidates, 1);
        assert!((ranked[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_build_context_joins_within_limit() {
        let chunks = vec![scored("first"), scored("second")];
        assert_eq!(build_context(&chunks, 100), "first\nsecond");
    }

    #[test]
    fn test_build_context_truncates_overflowing_chunk() {
        let chunks = vec![scored("aaaa"), scored("bb\n\ncccccccccc")];
        let ctx = build_context(&chunks, 10);
        assert_eq!(ctx, "aaaa\nbb");
        assert!(ctx.chars().count() <= 10);
    }

    #[test]
    fn test_build_context_empty() {
        assert_eq!(build_context(&[], 100), "");
    }
}
