//! Stage 3: semantic retrieval: depth-dependent
//! candidate windows, identifier-style lexical expansion, optional
//! HyDE expansion, and reciprocal-rank fusion across result lists.

use crate::embeddings::embed_with_chunking;
use crate::error::{Error, Result};
use crate::providers::{EmbeddingProvider, LlmProvider};
use crate::query::Depth;

/// RRF's rank-damping constant.
pub const RRF_K: f64 = 60.0;

pub struct CandidateWindow {
    pub non_meta: usize,
    pub meta: usize,
    pub rerank: usize,
}

pub fn candidate_window(depth: Depth) -> CandidateWindow {
    match depth {
        Depth::L0 => CandidateWindow { non_meta: 0, meta: 0, rerank: 0 },
        Depth::L1 => CandidateWindow { non_meta: 12, meta: 16, rerank: 0 },
        Depth::L2 => CandidateWindow { non_meta: 16, meta: 20, rerank: 10 },
        Depth::L3 => CandidateWindow { non_meta: 20, meta: 24, rerank: 14 },
    }
}

const IDENTIFIER_SYNONYMS: &[&[&str]] = &[&["permissions", "access", "authorization", "role"]];

/// Up to 3 lexical variants of `intent` by synonym expansion, for
/// identifier-style intents.
pub fn identifier_lexical_variants(intent: &str) -> Vec<String> {
    let lowered = intent.to_lowercase();
    let mut variants = Vec::new();
    for group in IDENTIFIER_SYNONYMS {
        let matched = group.iter().find(|word| lowered.contains(**word));
        if let Some(matched) = matched {
            for synonym in group.iter().filter(|s| *s != matched) {
                variants.push(lowered.replacen(matched, synonym, 1));
                if variants.len() >= 3 {
                    return variants;
                }
            }
        }
    }
    variants
}

/// Strips code fences and trims HyDE output to at most 1200 characters.
pub fn normalize_hyde_output(raw: &str) -> String {
    let stripped = raw.trim().trim_start_matches("```").trim_end_matches("```");
    let stripped = stripped.strip_prefix("rust\n").or_else(|| stripped.strip_prefix("```")).unwrap_or(stripped);
    stripped.chars().take(1200).collect()
}

/// Reciprocal-rank fusion across any number of ranked lists:
/// `score(id) = Σ 1/(k + rank_i(id))`.
pub fn reciprocal_rank_fusion(lists: &[Vec<String>], k: f64) -> Vec<(String, f64)> {
    use std::collections::HashMap;
    let mut scores: HashMap<String, f64> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for list in lists {
        for (rank, id) in list.iter().enumerate() {
            let entry = scores.entry(id.clone()).or_insert_with(|| {
                order.push(id.clone());
                0.0
            });
            *entry += 1.0 / (k + rank as f64 + 1.0);
        }
    }
    let mut fused: Vec<(String, f64)> = order.into_iter().map(|id| (id.clone(), scores[&id])).collect();
    fused.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
    fused
}

/// Nearest-neighbor search over a brute-force in-memory candidate set,
/// scored by cosine similarity, returning up to `window` IDs ranked
/// descending. `candidates` is `(id, vector)`.
pub fn nearest_neighbors(query_vector: &[f32], candidates: &[(String, Vec<f32>)], window: usize) -> Vec<String> {
    let mut scored: Vec<(String, f32)> = candidates
        .iter()
        .map(|(id, vector)| (id.clone(), cosine_similarity(query_vector, vector)))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
    scored.into_iter().take(window).map(|(id, _)| id).collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Runs direct embedding retrieval, optional HyDE expansion, and fuses
/// the resulting ranked lists with RRF. `is_meta` selects the window
/// column; `window_override` lets callers pass a precomputed window
/// (e.g. from `candidate_window`).
pub async fn semantic_retrieval(
    embedding_provider: &dyn EmbeddingProvider,
    llm_provider: Option<&dyn LlmProvider>,
    candidates: &[(String, Vec<f32>)],
    intent: &str,
    depth: Depth,
    is_meta: bool,
    hyde_enabled: bool,
) -> Result<Vec<(String, f64)>> {
    let window_spec = candidate_window(depth);
    let window = if is_meta { window_spec.meta } else { window_spec.non_meta };
    if window == 0 {
        return Ok(Vec::new());
    }

    let mut lists = Vec::new();
    let direct_vector = embed_with_chunking(embedding_provider, intent, crate::embeddings::DEFAULT_CHUNK_CHARS, crate::embeddings::DEFAULT_CHUNK_OVERLAP).await?;
    lists.push(nearest_neighbors(&direct_vector, candidates, window));

    for variant in identifier_lexical_variants(intent) {
        let variant_vector = embed_with_chunking(embedding_provider, &variant, crate::embeddings::DEFAULT_CHUNK_CHARS, crate::embeddings::DEFAULT_CHUNK_OVERLAP).await?;
        lists.push(nearest_neighbors(&variant_vector, candidates, window));
    }

    if hyde_enabled {
        let provider = llm_provider.ok_or_else(|| Error::ProviderUnavailable("HyDE requested without an LLM provider".into()))?;
        let hypothetical = provider.complete(&format!("Write a short hypothetical code snippet answering: {}", intent)).await?;
        let normalized = normalize_hyde_output(&hypothetical);
        let hyde_vector = embed_with_chunking(embedding_provider, &normalized, crate::embeddings::DEFAULT_CHUNK_CHARS, crate::embeddings::DEFAULT_CHUNK_OVERLAP).await?;
        lists.push(nearest_neighbors(&hyde_vector, candidates, window));
    }

    Ok(reciprocal_rank_fusion(&lists, RRF_K))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{HashEmbeddingProvider, MockLlmProvider};

    #[test]
    fn candidate_window_widens_with_depth() {
        assert_eq!(candidate_window(Depth::L0).non_meta, 0);
        assert_eq!(candidate_window(Depth::L2).rerank, 10);
        assert!(candidate_window(Depth::L3).non_meta > candidate_window(Depth::L1).non_meta);
    }

    #[test]
    fn identical_rankings_preserve_order_under_rrf() {
        let list = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let fused = reciprocal_rank_fusion(&[list.clone(), list.clone()], RRF_K);
        let order: Vec<&str> = fused.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn rrf_rewards_items_ranked_highly_across_multiple_lists() {
        let list_a = vec!["a".to_string(), "b".to_string()];
        let list_b = vec!["b".to_string(), "a".to_string()];
        let fused = reciprocal_rank_fusion(&[list_a, list_b], RRF_K);
        assert_eq!(fused[0].1, fused[1].1, "symmetric ranks should tie");
    }

    #[test]
    fn hyde_output_strips_fences_and_truncates_to_1200_chars() {
        let raw = format!("```rust\n{}\n```", "x".repeat(2000));
        let normalized = normalize_hyde_output(&raw);
        assert!(normalized.chars().count() <= 1200);
        assert!(!normalized.contains("```"));
    }

    #[test]
    fn permission_intent_expands_to_synonym_variants() {
        let variants = identifier_lexical_variants("where does the app handle user permissions");
        assert!(variants.iter().any(|v| v.contains("access")));
        assert!(variants.len() <= 3);
    }

    #[tokio::test]
    async fn semantic_retrieval_without_hyde_fuses_direct_and_variant_lists() {
        let embeddings = HashEmbeddingProvider::new(16);
        let candidates: Vec<(String, Vec<f32>)> = vec![
            ("a".to_string(), vec![1.0; 16]),
            ("b".to_string(), vec![0.0; 16]),
        ];
        let fused = semantic_retrieval(&embeddings, None, &candidates, "check permissions", Depth::L1, false, false)
            .await
            .unwrap();
        assert!(!fused.is_empty());
    }

    #[tokio::test]
    async fn semantic_retrieval_at_l0_returns_no_candidates() {
        let embeddings = HashEmbeddingProvider::new(16);
        let candidates: Vec<(String, Vec<f32>)> = vec![("a".to_string(), vec![1.0; 16])];
        let fused = semantic_retrieval(&embeddings, None, &candidates, "check permissions", Depth::L0, false, false)
            .await
            .unwrap();
        assert!(fused.is_empty());
    }

    #[tokio::test]
    async fn hyde_without_llm_provider_surfaces_provider_unavailable() {
        let embeddings = HashEmbeddingProvider::new(16);
        let candidates: Vec<(String, Vec<f32>)> = vec![("a".to_string(), vec![1.0; 16])];
        let result = semantic_retrieval(&embeddings, None, &candidates, "check permissions", Depth::L2, false, true).await;
        assert!(matches!(result, Err(Error::ProviderUnavailable(_))));
    }

    #[tokio::test]
    async fn hyde_with_llm_provider_adds_a_third_fused_list() {
        let embeddings = HashEmbeddingProvider::new(16);
        let llm = MockLlmProvider::new();
        let candidates: Vec<(String, Vec<f32>)> = vec![("a".to_string(), vec![1.0; 16])];
        let fused = semantic_retrieval(&embeddings, Some(&llm), &candidates, "check permissions", Depth::L2, false, true)
            .await
            .unwrap();
        assert!(!fused.is_empty());
    }
}
