//! Stage 12: post-processing. Deduplicates packs by
//! `packId` preserving first-occurrence order, attaches a ranking
//! summary to each pack's explanation when candidate scores exist, and
//! hands the final pack set to the Response Assembler.

use crate::model::ContextPack;
use std::collections::HashSet;

/// Deduplicates by `pack_id`, keeping the first occurrence's position
/// and contents.
pub fn dedupe_preserve_order(packs: Vec<ContextPack>) -> Vec<ContextPack> {
    let mut seen = HashSet::new();
    packs.into_iter().filter(|pack| seen.insert(pack.pack_id.clone())).collect()
}

/// One line per pack summarizing where it ranked and which signal
/// carried the most weight, for append to the pack's key facts.
pub fn ranking_summary_line(rank: usize, entity_id: &str, top_signal: Option<(&str, f64)>) -> String {
    match top_signal {
        Some((dimension, value)) => format!("Ranked #{} for {} (top signal: {} = {:.2})", rank + 1, entity_id, dimension, value),
        None => format!("Ranked #{} for {}", rank + 1, entity_id),
    }
}

/// Attaches a ranking summary line to each pack's `key_facts` when a
/// candidate score is available for its `target_id`, in the given rank
/// order. Packs with no matching candidate are left untouched.
pub fn attach_ranking_summaries(mut packs: Vec<ContextPack>, ranked_scores: &[(String, Vec<(String, f64)>)]) -> Vec<ContextPack> {
    for (rank, (entity_id, signals)) in ranked_scores.iter().enumerate() {
        if let Some(pack) = packs.iter_mut().find(|p| &p.target_id == entity_id) {
            let top_signal = signals.iter().max_by(|a, b| a.1.partial_cmp(&b.1).unwrap()).map(|(k, v)| (k.as_str(), *v));
            pack.key_facts.push(ranking_summary_line(rank, entity_id, top_signal));
        }
    }
    packs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Outcome, PackType};
    use chrono::Utc;

    fn pack(id: &str, target: &str) -> ContextPack {
        ContextPack {
            pack_id: id.into(),
            pack_type: PackType::FunctionContext,
            target_id: target.into(),
            summary: "s".into(),
            key_facts: vec![],
            code_snippets: vec![],
            related_files: vec![],
            confidence: 0.5,
            created_at: Utc::now(),
            access_count: 0,
            last_outcome: Outcome::Unknown,
            success_count: 0,
            failure_count: 0,
            version: "1".into(),
            invalidation_triggers: vec![],
        }
    }

    #[test]
    fn dedupe_keeps_the_first_occurrence_and_drops_later_duplicates() {
        let packs = vec![pack("p1", "a"), pack("p2", "b"), pack("p1", "a")];
        let deduped = dedupe_preserve_order(packs);
        let ids: Vec<&str> = deduped.iter().map(|p| p.pack_id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2"]);
    }

    #[test]
    fn ranking_summary_attaches_the_strongest_signal_dimension() {
        let packs = vec![pack("p1", "fn1")];
        let scores = vec![("fn1".to_string(), vec![("semanticSimilarity".to_string(), 0.9), ("cochange".to_string(), 0.2)])];
        let annotated = attach_ranking_summaries(packs, &scores);
        assert!(annotated[0].key_facts[0].contains("semanticSimilarity"));
    }

    #[test]
    fn packs_without_a_matching_candidate_score_are_left_untouched() {
        let packs = vec![pack("p1", "fn1")];
        let annotated = attach_ranking_summaries(packs, &[]);
        assert!(annotated[0].key_facts.is_empty());
    }
}
