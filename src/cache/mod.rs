//! The two-tier Query Cache: an in-process memoized map
//! backed by the Knowledge Store's persistent `query_cache` table.

pub mod normalize;

use crate::error::Result;
use crate::model::VersionDescriptor;
use crate::query::{Filter, QueryEnvelope};
use crate::store::{KnowledgeStore, PruneBounds, QueryCacheRow};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;

pub const DEFAULT_TTL_MINUTES: i64 = 30;
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// The normalized tuple that feeds the cache key hash.
#[derive(Debug, Clone, Serialize)]
struct CacheKeyInput<'a> {
    version_fingerprint: &'a str,
    llm_requirement: &'a str,
    hyde_expansion: bool,
    intent_tokens: Vec<String>,
    affected_files: Vec<&'a str>,
    filter: Filter,
    depth: &'a str,
    structural_class: bool,
}

/// Builds the stable cache key for `query` against `version`.
/// `retrieval_kind` distinguishes direct vs HyDE retrieval so paraphrase
/// collapse cannot corrupt per-retrieval-kind learning.
pub fn build_cache_key(query: &QueryEnvelope, version: &VersionDescriptor, retrieval_kind: &str) -> String {
    let mut affected_files: Vec<&str> = query.affected_files.iter().map(|s| s.as_str()).collect();
    affected_files.sort_unstable();

    let llm_requirement = match query.llm_requirement {
        crate::query::LlmRequirement::Disabled => "disabled",
        crate::query::LlmRequirement::Optional => "optional",
        crate::query::LlmRequirement::Required => "required",
    };
    let depth = match query.depth {
        crate::query::Depth::L0 => "L0",
        crate::query::Depth::L1 => "L1",
        crate::query::Depth::L2 => "L2",
        crate::query::Depth::L3 => "L3",
    };

    let input = CacheKeyInput {
        version_fingerprint: &version.cache_fingerprint(),
        llm_requirement,
        hyde_expansion: query.hyde_expansion,
        intent_tokens: normalize::normalize_intent(&query.intent),
        affected_files,
        filter: query.filter.normalized(),
        depth,
        structural_class: normalize::is_structural_class(&query.intent),
    };

    let canonical = serde_json::to_string(&input).expect("cache key input always serializes");
    let mut hasher = Sha256::new();
    hasher.update(retrieval_kind.as_bytes());
    hasher.update(b":");
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheEntry<T> {
    pub value: T,
    #[serde(default = "Utc::now")]
    pub created_at: chrono::DateTime<Utc>,
}

struct MemoSlot {
    row: QueryCacheRow,
}

pub struct QueryCache<'a> {
    store: &'a dyn KnowledgeStore,
    memoized: Mutex<HashMap<String, MemoSlot>>,
    pub ttl: Duration,
    pub max_entries: usize,
    pub max_memoized: usize,
}

pub enum CacheLookup {
    Hit { response: String, created_at: chrono::DateTime<Utc> },
    Miss,
}

impl<'a> QueryCache<'a> {
    pub fn new(store: &'a dyn KnowledgeStore) -> Self {
        QueryCache {
            store,
            memoized: Mutex::new(HashMap::new()),
            ttl: Duration::minutes(DEFAULT_TTL_MINUTES),
            max_entries: DEFAULT_MAX_ENTRIES,
            max_memoized: 256,
        }
    }

    fn is_stale(&self, created_at: chrono::DateTime<Utc>) -> bool {
        Utc::now() - created_at > self.ttl
    }

    /// `memoized -> persistent -> miss`. A stale persistent hit is
    /// returned as a miss and the row is pruned.
    pub fn get(&self, key: &str) -> Result<CacheLookup> {
        if let Some(slot) = self.memoized.lock().unwrap().get(key) {
            if !self.is_stale(slot.row.created_at) {
                return Ok(CacheLookup::Hit { response: slot.row.response.clone(), created_at: slot.row.created_at });
            }
        }

        let Some(row) = self.store.get_query_cache_entry(key)? else {
            return Ok(CacheLookup::Miss);
        };
        if self.is_stale(row.created_at) {
            self.store.prune_query_cache(PruneBounds { max_entries: self.max_entries, max_age_ms: 0 })?;
            return Ok(CacheLookup::Miss);
        }

        self.memoized.lock().unwrap().insert(key.to_string(), MemoSlot { row: row.clone() });
        Ok(CacheLookup::Hit { response: row.response, created_at: row.created_at })
    }

    /// Upserts both tiers. The persistent tier is pruned to
    /// `max_entries` oldest-by-`created_at` after every upsert.
    pub fn put(&self, key: &str, query_params: &str, response: &str) -> Result<()> {
        let now = Utc::now();
        let row = QueryCacheRow {
            query_hash: key.to_string(),
            query_params: query_params.to_string(),
            response: response.to_string(),
            created_at: now,
            last_accessed: now,
            access_count: 1,
        };
        self.store.upsert_query_cache_entry(row.clone())?;
        self.store.prune_query_cache(PruneBounds { max_entries: self.max_entries, max_age_ms: self.ttl.num_milliseconds() })?;

        let mut memoized = self.memoized.lock().unwrap();
        if memoized.len() >= self.max_memoized && !memoized.contains_key(key) {
            if let Some(oldest_key) = memoized
                .iter()
                .min_by_key(|(_, slot)| slot.row.created_at)
                .map(|(k, _)| k.clone())
            {
                memoized.remove(&oldest_key);
            }
        }
        memoized.insert(key.to_string(), MemoSlot { row });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QualityTier;
    use crate::store::memory::InMemoryKnowledgeStore;

    fn version() -> VersionDescriptor {
        VersionDescriptor {
            major: 1,
            minor: 0,
            patch: 3,
            indexed_at: Utc::now(),
            quality_tier: QualityTier::Full,
            indexer_version: "idx-1".into(),
            features: vec![],
        }
    }

    fn base_query(intent: &str) -> QueryEnvelope {
        QueryEnvelope {
            intent: intent.into(),
            depth: crate::query::Depth::L1,
            intent_type: None,
            uc_requirements: None,
            affected_files: vec![],
            working_file: None,
            scope: None,
            filter: Filter::default(),
            llm_requirement: crate::query::LlmRequirement::Optional,
            embedding_requirement: crate::query::EmbeddingRequirement::Optional,
            hyde_expansion: false,
            diversify: false,
            diversity_lambda: None,
            disable_cache: false,
            disable_method_guidance: false,
            force_summary_synthesis: false,
            show_llm_errors: false,
            timeout_ms: None,
        }
    }

    #[test]
    fn paraphrased_queries_produce_the_same_cache_key() {
        let version = version();
        let a = build_cache_key(&base_query("How does authentication work?"), &version, "direct");
        let b = build_cache_key(&base_query("Explain the auth method."), &version, "direct");
        assert_eq!(a, b);
    }

    #[test]
    fn direct_and_hyde_retrieval_kinds_diverge_for_the_same_query() {
        let version = version();
        let query = base_query("explain the auth flow");
        let direct = build_cache_key(&query, &version, "direct");
        let hyde = build_cache_key(&query, &version, "hyde");
        assert_ne!(direct, hyde);
    }

    #[test]
    fn memoized_hit_then_persistent_hit_then_miss() {
        let store = InMemoryKnowledgeStore::new();
        let cache = QueryCache::new(&store);
        let key = "k1";
        assert!(matches!(cache.get(key).unwrap(), CacheLookup::Miss));
        cache.put(key, "{}", "{\"packs\":[]}").unwrap();
        assert!(matches!(cache.get(key).unwrap(), CacheLookup::Hit { .. }));
    }

    #[test]
    fn stale_entry_is_returned_as_a_miss() {
        let store = InMemoryKnowledgeStore::new();
        let mut cache = QueryCache::new(&store);
        cache.ttl = Duration::milliseconds(-1);
        cache.put("k1", "{}", "{}").unwrap();
        assert!(matches!(cache.get("k1").unwrap(), CacheLookup::Miss));
    }
}
