//! Stage 2: direct packs. Packs whose `relatedFiles`
//! include a mentioned file, plus packs seeded from prior query access
//! logs sharing the same normalized intent.

use crate::cache::normalize::normalize_intent;
use crate::error::Result;
use crate::model::ContextPack;
use crate::store::KnowledgeStore;
use std::collections::HashSet;

pub fn direct_packs(store: &dyn KnowledgeStore, intent: &str, target_files: &[String]) -> Result<Vec<ContextPack>> {
    let mut seen = HashSet::new();
    let mut packs = Vec::new();

    for file in target_files {
        for pack in store.packs_for_related_file(file)? {
            if seen.insert(pack.pack_id.clone()) {
                packs.push(pack);
            }
        }
    }

    let normalized = normalize_intent(intent);
    let access_logs = store.get_query_access_logs(200)?;
    for log in access_logs {
        if normalize_intent(&log.normalized_intent) == normalized {
            for pack_id in &log.returned_pack_ids {
                if seen.contains(pack_id) {
                    continue;
                }
                if let Some(pack) = store.get_pack(pack_id)? {
                    seen.insert(pack.pack_id.clone());
                    packs.push(pack);
                }
            }
        }
    }

    Ok(packs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Outcome, PackType};
    use crate::store::memory::InMemoryKnowledgeStore;
    use crate::store::QueryAccessLog;
    use chrono::Utc;

    fn pack(id: &str, related: Vec<&str>) -> ContextPack {
        ContextPack {
            pack_id: id.into(),
            pack_type: PackType::FunctionContext,
            target_id: "fn1".into(),
            summary: "s".into(),
            key_facts: vec![],
            code_snippets: vec![],
            related_files: related.into_iter().map(String::from).collect(),
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
    fn finds_packs_whose_related_files_match_target() {
        let store = InMemoryKnowledgeStore::new();
        store.upsert_pack(pack("p1", vec!["src/lib.rs"])).unwrap();
        store.upsert_pack(pack("p2", vec!["src/other.rs"])).unwrap();
        let found = direct_packs(&store, "explain lib.rs", &["src/lib.rs".to_string()]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pack_id, "p1");
    }

    #[test]
    fn seeds_from_prior_access_logs_with_matching_normalized_intent() {
        let store = InMemoryKnowledgeStore::new();
        store.upsert_pack(pack("p1", vec![])).unwrap();
        store
            .append_query_access_log(QueryAccessLog {
                query_hash: "h1".into(),
                normalized_intent: "how does auth work".into(),
                returned_pack_ids: vec!["p1".into()],
                at: Utc::now(),
            })
            .unwrap();
        let found = direct_packs(&store, "explain the auth method", &[]).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pack_id, "p1");
    }

    #[test]
    fn does_not_duplicate_a_pack_found_both_ways() {
        let store = InMemoryKnowledgeStore::new();
        store.upsert_pack(pack("p1", vec!["src/lib.rs"])).unwrap();
        store
            .append_query_access_log(QueryAccessLog {
                query_hash: "h1".into(),
                normalized_intent: "explain lib".into(),
                returned_pack_ids: vec!["p1".into()],
                at: Utc::now(),
            })
            .unwrap();
        let found = direct_packs(&store, "explain lib", &["src/lib.rs".to_string()]).unwrap();
        assert_eq!(found.len(), 1);
    }
}
