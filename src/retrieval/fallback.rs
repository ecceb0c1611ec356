//! Stage 7: fallback. Materializes a heuristic pack set
//! from token overlap with the intent when scored candidates are thin
//! or all-zero, skipping packs whose target lies inside the
//! workspace's internal state directory.

use crate::model::ContextPack;
use crate::query::Depth;

pub const LOW_CANDIDATE_THRESHOLD: usize = 3;

fn split_identifier_segments(text: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch == '_' || ch == '-' || ch == '/' || ch == '.' {
            if !current.is_empty() {
                segments.push(std::mem::take(&mut current));
            }
            continue;
        }
        if ch.is_uppercase() && !current.is_empty() {
            segments.push(std::mem::take(&mut current));
        }
        current.push(ch.to_ascii_lowercase());
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

fn token_overlap(intent_tokens: &[String], pack: &ContextPack) -> usize {
    let haystack = format!("{} {} {}", pack.summary, pack.key_facts.join(" "), pack.related_files.join(" "));
    let haystack_segments: std::collections::HashSet<String> = split_identifier_segments(&haystack).into_iter().collect();
    intent_tokens.iter().filter(|token| haystack_segments.contains(*token)).count()
}

/// Whether `pack` should be skipped as filler because its target lies
/// entirely within the workspace's internal state directory.
fn is_internal_state_target(pack: &ContextPack) -> bool {
    pack.target_id.starts_with(".librarian/") || pack.related_files.iter().all(|f| f.starts_with(".librarian/"))
        && !pack.related_files.is_empty()
}

/// Caps materialization: stricter for caller probes like "which
/// functions call X" at L0.
pub fn materialization_cap(depth: Depth, intent: &str) -> usize {
    let is_caller_probe = intent.to_lowercase().contains("which functions call");
    match (depth, is_caller_probe) {
        (Depth::L0, true) => 3,
        (Depth::L0, false) => 5,
        (Depth::L1, _) => 8,
        (Depth::L2, _) => 12,
        (Depth::L3, _) => 16,
    }
}

pub fn should_trigger_fallback(scored_count: usize, confidences: &[f64]) -> bool {
    scored_count < LOW_CANDIDATE_THRESHOLD || (!confidences.is_empty() && confidences.iter().all(|c| *c == 0.0))
}

/// Materializes the top-N packs by token overlap, tiebreaking by
/// success count, capped per `materialization_cap`.
pub fn materialize_fallback(packs: Vec<ContextPack>, intent: &str, depth: Depth) -> Vec<ContextPack> {
    let intent_tokens = split_identifier_segments(intent);
    let cap = materialization_cap(depth, intent);

    let mut ranked: Vec<(usize, u64, ContextPack)> = packs
        .into_iter()
        .filter(|p| !is_internal_state_target(p))
        .map(|p| (token_overlap(&intent_tokens, &p), p.success_count, p))
        .collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
    ranked.into_iter().take(cap).map(|(_, _, p)| p).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Outcome, PackType};
    use chrono::Utc;

    fn pack(id: &str, summary: &str, success_count: u64, related: Vec<&str>) -> ContextPack {
        ContextPack {
            pack_id: id.into(),
            pack_type: PackType::FunctionContext,
            target_id: "fn1".into(),
            summary: summary.into(),
            key_facts: vec![],
            code_snippets: vec![],
            related_files: related.into_iter().map(String::from).collect(),
            confidence: 0.5,
            created_at: Utc::now(),
            access_count: 0,
            last_outcome: Outcome::Unknown,
            success_count,
            failure_count: 0,
            version: "1".into(),
            invalidation_triggers: vec![],
        }
    }

    #[test]
    fn triggers_on_low_candidate_count() {
        assert!(should_trigger_fallback(1, &[0.5]));
        assert!(!should_trigger_fallback(5, &[0.5]));
    }

    #[test]
    fn triggers_when_all_confidences_are_zero() {
        assert!(should_trigger_fallback(5, &[0.0, 0.0]));
    }

    #[test]
    fn materialization_respects_camel_case_and_snake_case_segments() {
        let packs = vec![
            pack("p1", "handles userPermissions checks", 0, vec![]),
            pack("p2", "unrelated content", 10, vec![]),
        ];
        let materialized = materialize_fallback(packs, "check user_permissions flow", Depth::L1);
        assert_eq!(materialized[0].pack_id, "p1");
    }

    #[test]
    fn skips_packs_targeting_only_the_internal_state_directory() {
        let packs = vec![pack("p1", "bootstrap state", 5, vec![".librarian/state.json"])];
        let materialized = materialize_fallback(packs, "bootstrap state", Depth::L1);
        assert!(materialized.is_empty());
    }

    #[test]
    fn caller_probe_at_l0_has_a_stricter_cap() {
        assert_eq!(materialization_cap(Depth::L0, "which functions call foo"), 3);
        assert_eq!(materialization_cap(Depth::L0, "explain foo"), 5);
    }
}
