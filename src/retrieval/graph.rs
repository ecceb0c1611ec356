//! Stage 4: graph expansion. Expands each seed through
//! `depends_on` and `co_changed` edges up to a depth cap, including
//! `returns_schema` + `part_of` chains, and flags tests that cover the
//! expanded targets.

use crate::error::Result;
use crate::model::EdgeType;
use crate::store::KnowledgeStore;
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Clone, PartialEq)]
pub struct ExpandedNode {
    pub entity_id: String,
    pub hop_distance: u32,
    pub test_covers_changed: bool,
}

/// BFS expansion from `seeds` through `depends_on` and `co_changed`
/// edges, up to `max_depth` hops. Direct dependents (hop 1) are
/// returned ahead of transitive ones by construction (BFS order).
pub fn expand(
    store: &dyn KnowledgeStore,
    seeds: &[String],
    max_depth: u32,
    test_dependency_index: &dyn Fn(&str) -> bool,
) -> Result<Vec<ExpandedNode>> {
    let mut visited: HashSet<String> = seeds.iter().cloned().collect();
    let mut queue: VecDeque<(String, u32)> = seeds.iter().map(|s| (s.clone(), 0)).collect();
    let mut expanded = Vec::new();

    while let Some((entity_id, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        for edge in store.edges_from(&entity_id)? {
            if !matches!(edge.edge_type, EdgeType::DependsOn | EdgeType::CoChanged | EdgeType::ReturnsSchema | EdgeType::PartOf) {
                continue;
            }
            if visited.insert(edge.target_id.clone()) {
                expanded.push(ExpandedNode {
                    entity_id: edge.target_id.clone(),
                    hop_distance: depth + 1,
                    test_covers_changed: test_dependency_index(&edge.target_id),
                });
                queue.push_back((edge.target_id.clone(), depth + 1));
            }
        }
    }

    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityType, KnowledgeEdge};
    use crate::store::memory::InMemoryKnowledgeStore;
    use chrono::Utc;

    fn edge(source: &str, target: &str, edge_type: EdgeType) -> KnowledgeEdge {
        KnowledgeEdge {
            id: uuid::Uuid::new_v4().to_string(),
            source_id: source.into(),
            source_type: EntityType::File,
            target_id: target.into(),
            target_type: EntityType::File,
            edge_type,
            weight: 1.0,
            confidence: 0.8,
            metadata: serde_json::Value::Null,
            computed_at: Utc::now(),
        }
    }

    #[test]
    fn direct_dependents_rank_ahead_of_transitive_ones() {
        let store = InMemoryKnowledgeStore::new();
        store.upsert_edge(edge("a", "b", EdgeType::DependsOn)).unwrap();
        store.upsert_edge(edge("b", "c", EdgeType::DependsOn)).unwrap();
        let expanded = expand(&store, &["a".to_string()], 5, &|_| false).unwrap();
        assert_eq!(expanded[0].entity_id, "b");
        assert_eq!(expanded[0].hop_distance, 1);
        assert_eq!(expanded[1].entity_id, "c");
        assert_eq!(expanded[1].hop_distance, 2);
    }

    #[test]
    fn expansion_respects_the_configured_depth_cap() {
        let store = InMemoryKnowledgeStore::new();
        store.upsert_edge(edge("a", "b", EdgeType::DependsOn)).unwrap();
        store.upsert_edge(edge("b", "c", EdgeType::DependsOn)).unwrap();
        let expanded = expand(&store, &["a".to_string()], 1, &|_| false).unwrap();
        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0].entity_id, "b");
    }

    #[test]
    fn test_dependency_flag_marks_covering_tests() {
        let store = InMemoryKnowledgeStore::new();
        store.upsert_edge(edge("a", "test_a", EdgeType::DependsOn)).unwrap();
        let expanded = expand(&store, &["a".to_string()], 2, &|id| id == "test_a").unwrap();
        assert!(expanded[0].test_covers_changed);
    }

    #[test]
    fn semantic_edges_are_excluded_from_expansion() {
        let store = InMemoryKnowledgeStore::new();
        store.upsert_edge(edge("a", "b", EdgeType::Semantic)).unwrap();
        let expanded = expand(&store, &["a".to_string()], 2, &|_| false).unwrap();
        assert!(expanded.is_empty());
    }
}
