//! Stage 8: reranking. An LLM cross-encoder rerank over
//! the top rerank window, rejecting to original order on a length/ID
//! mismatch, with an optional MMR diversification pass.

use crate::error::Result;
use crate::providers::LlmProvider;
use crate::stage_tracker::{IssueSeverity, StageIssue};
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct RerankTelemetry {
    pub rerank_window: usize,
    pub rerank_input_count: usize,
    pub rerank_applied_count: usize,
    pub rerank_skip_reason: Option<String>,
}

/// Parses a rerank completion expected to be a JSON array of IDs.
/// Returns `None` (reject) on malformed JSON, a length mismatch, or an
/// ID not present in the input set.
fn parse_rerank_order(raw: &str, original_ids: &[String]) -> Option<Vec<String>> {
    let parsed: Vec<String> = serde_json::from_str(raw).ok()?;
    if parsed.len() != original_ids.len() {
        return None;
    }
    let original_set: HashSet<&String> = original_ids.iter().collect();
    if !parsed.iter().all(|id| original_set.contains(id)) {
        return None;
    }
    let parsed_set: HashSet<&String> = parsed.iter().collect();
    if parsed_set.len() != parsed.len() {
        return None;
    }
    Some(parsed)
}

/// Maximal Marginal Relevance diversification over the reranked window.
/// `similarity` scores pairwise redundancy in `[0,1]`; higher means more
/// redundant. `lambda` trades relevance (1.0) for diversity (0.0).
pub fn mmr_diversify(ids: &[String], relevance: &[f64], similarity: &dyn Fn(&str, &str) -> f64, lambda: f64) -> Vec<String> {
    if ids.is_empty() {
        return Vec::new();
    }
    let mut remaining: Vec<usize> = (0..ids.len()).collect();
    let mut selected = Vec::with_capacity(ids.len());

    let first = remaining.remove(0);
    selected.push(first);

    while !remaining.is_empty() {
        let mut best_index = 0;
        let mut best_score = f64::MIN;
        for (position, &candidate) in remaining.iter().enumerate() {
            let max_similarity = selected.iter().map(|&s| similarity(&ids[candidate], &ids[s])).fold(0.0_f64, f64::max);
            let score = lambda * relevance[candidate] - (1.0 - lambda) * max_similarity;
            if score > best_score {
                best_score = score;
                best_index = position;
            }
        }
        selected.push(remaining.remove(best_index));
    }

    selected.into_iter().map(|index| ids[index].clone()).collect()
}

/// Reranks the top `window` of `ranked_ids` with an LLM cross-encoder
/// call, preserving the tail (everything beyond `window`) in its
/// original order. Falls back to the original order on any parse
/// failure, recording a `Partial` issue rather than failing the stage.
pub async fn rerank(
    llm: &dyn LlmProvider,
    intent: &str,
    ranked_ids: Vec<String>,
    window: usize,
) -> Result<(Vec<String>, RerankTelemetry, Vec<StageIssue>)> {
    let mut telemetry = RerankTelemetry { rerank_window: window, rerank_input_count: ranked_ids.len(), ..Default::default() };

    if window == 0 {
        telemetry.rerank_skip_reason = Some("depth_profile_disabled".to_string());
        return Ok((ranked_ids, telemetry, Vec::new()));
    }
    if ranked_ids.len() <= 1 {
        telemetry.rerank_skip_reason = Some("nothing to reorder".to_string());
        return Ok((ranked_ids, telemetry, Vec::new()));
    }

    let head: Vec<String> = ranked_ids.iter().take(window).cloned().collect();
    let tail: Vec<String> = ranked_ids.iter().skip(window).cloned().collect();

    let prompt = format!(
        "Given the query \"{}\", return a JSON array reordering these candidate IDs from most to least relevant: {}",
        intent,
        serde_json::to_string(&head).unwrap_or_default()
    );

    let completion = llm.complete(&prompt).await;
    let mut issues = Vec::new();

    let reordered_head = match completion {
        Ok(raw) => match parse_rerank_order(&raw, &head) {
            Some(order) => {
                telemetry.rerank_applied_count = order.len();
                order
            }
            None => {
                issues.push(StageIssue { severity: IssueSeverity::Minor, message: "rerank output rejected: length or ID mismatch".to_string() });
                telemetry.rerank_skip_reason = Some("rerank output malformed".to_string());
                head
            }
        },
        Err(err) => {
            issues.push(StageIssue { severity: IssueSeverity::Minor, message: format!("rerank provider unavailable: {}", err) });
            telemetry.rerank_skip_reason = Some("rerank provider unavailable".to_string());
            head
        }
    };

    let mut result = reordered_head;
    result.extend(tail);
    Ok((result, telemetry, issues))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockLlmProvider;

    #[test]
    fn mmr_prefers_diverse_candidates_over_pure_relevance() {
        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let relevance = vec![1.0, 0.9, 0.85];
        let similarity = |x: &str, y: &str| if (x == "a" && y == "b") || (x == "b" && y == "a") { 1.0 } else { 0.0 };
        let order = mmr_diversify(&ids, &relevance, &similarity, 0.3);
        assert_eq!(order[0], "a");
        assert_eq!(order[1], "c", "b is redundant with a under low lambda");
    }

    #[tokio::test]
    async fn accepts_a_well_formed_reorder_and_preserves_the_tail() {
        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string(), "d".to_string()];
        let llm = MockLlmProvider::new().with_response("intent", r#"["b","a"]"#);
        let (reordered, telemetry, issues) = rerank(&llm, "intent text", ids, 2).await.unwrap();
        assert_eq!(reordered, vec!["b".to_string(), "a".to_string(), "c".to_string(), "d".to_string()]);
        assert_eq!(telemetry.rerank_applied_count, 2);
        assert!(issues.is_empty());
    }

    #[tokio::test]
    async fn rejects_a_length_mismatched_reorder_and_falls_back_to_original_order() {
        let ids = vec!["a".to_string(), "b".to_string()];
        let llm = MockLlmProvider::new().with_response("intent", r#"["a"]"#);
        let (reordered, telemetry, issues) = rerank(&llm, "intent text", ids.clone(), 2).await.unwrap();
        assert_eq!(reordered, ids);
        assert!(!issues.is_empty());
        assert!(telemetry.rerank_skip_reason.is_some());
    }

    #[tokio::test]
    async fn provider_failure_falls_back_to_original_order_without_erroring() {
        let ids = vec!["a".to_string(), "b".to_string()];
        let llm = MockLlmProvider::new().failing("intent");
        let (reordered, _telemetry, issues) = rerank(&llm, "intent text", ids.clone(), 2).await.unwrap();
        assert_eq!(reordered, ids);
        assert!(!issues.is_empty());
    }

    #[tokio::test]
    async fn zero_window_skips_reranking_entirely() {
        let ids = vec!["a".to_string(), "b".to_string()];
        let llm = MockLlmProvider::new();
        let (reordered, telemetry, _issues) = rerank(&llm, "intent text", ids.clone(), 0).await.unwrap();
        assert_eq!(reordered, ids);
        assert_eq!(telemetry.rerank_applied_count, 0);
    }
}
