//! The Knowledge Store: a transactional interface over
//! functions, modules, files, context packs, knowledge edges, ingestion
//! items, embeddings, state blobs, and the query cache's persistent
//! tier. Two implementations are provided: `sqlite::SqliteKnowledgeStore`
//! for production use and `memory::InMemoryKnowledgeStore` for tests
//! that shouldn't touch the filesystem.

pub mod memory;
pub mod sqlite;

use crate::error::Result;
use crate::model::{
    ContextPack, FileRecord, FunctionRecord, IngestionItem, KnowledgeEdge, ModuleRecord,
    RetrievalLogRecord, StoreMetadata, StoreStats,
};
use chrono::{DateTime, Utc};

/// A single query-cache row as the store persists it.
#[derive(Debug, Clone)]
pub struct QueryCacheRow {
    pub query_hash: String,
    pub query_params: String,
    pub response: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u64,
}

/// Bounds for `pruneQueryCache`.
#[derive(Debug, Clone, Copy)]
pub struct PruneBounds {
    pub max_entries: usize,
    pub max_age_ms: i64,
}

/// One access-log row, used by `direct_packs` to seed targets
/// from prior queries with the same normalized intent.
#[derive(Debug, Clone)]
pub struct QueryAccessLog {
    pub query_hash: String,
    pub normalized_intent: String,
    pub returned_pack_ids: Vec<String>,
    pub at: DateTime<Utc>,
}

/// A co-change edge pair as stored separately from the general knowledge
/// graph table.
#[derive(Debug, Clone)]
pub struct CochangeEdge {
    pub path_a: String,
    pub path_b: String,
    pub weight: f64,
}

/// The transactional interface every retrieval/cache/feedback component
/// depends on. Implementations must serialize concurrent writers.
pub trait KnowledgeStore: Send + Sync {
    // -- functions --
    fn upsert_function(&self, record: FunctionRecord) -> Result<()>;
    fn get_function(&self, id: &str) -> Result<Option<FunctionRecord>>;
    fn list_functions(&self) -> Result<Vec<FunctionRecord>>;
    fn delete_function(&self, id: &str) -> Result<()>;

    // -- modules --
    fn upsert_module(&self, record: ModuleRecord) -> Result<()>;
    fn get_module(&self, id: &str) -> Result<Option<ModuleRecord>>;
    fn list_modules(&self) -> Result<Vec<ModuleRecord>>;
    fn delete_module(&self, id: &str) -> Result<()>;

    // -- files --
    fn upsert_file(&self, record: FileRecord) -> Result<()>;
    fn get_file(&self, id: &str) -> Result<Option<FileRecord>>;
    fn list_files(&self) -> Result<Vec<FileRecord>>;
    fn delete_file(&self, id: &str) -> Result<()>;

    // -- context packs --
    fn upsert_pack(&self, pack: ContextPack) -> Result<()>;
    fn get_pack(&self, pack_id: &str) -> Result<Option<ContextPack>>;
    fn list_packs(&self) -> Result<Vec<ContextPack>>;
    fn packs_for_related_file(&self, file_path: &str) -> Result<Vec<ContextPack>>;
    fn delete_pack(&self, pack_id: &str) -> Result<()>;

    // -- knowledge graph edges --
    fn upsert_edge(&self, edge: KnowledgeEdge) -> Result<()>;
    fn list_edges(&self) -> Result<Vec<KnowledgeEdge>>;
    fn edges_from(&self, source_id: &str) -> Result<Vec<KnowledgeEdge>>;
    fn delete_edge(&self, id: &str) -> Result<()>;

    // -- co-change edges --
    fn get_cochange_edges(&self, path: &str) -> Result<Vec<CochangeEdge>>;
    fn store_cochange_edges(&self, edges: Vec<CochangeEdge>) -> Result<()>;

    // -- ingestion items --
    fn upsert_ingestion_item(&self, item: IngestionItem) -> Result<()>;
    fn get_ingestion_item(&self, id: &str) -> Result<Option<IngestionItem>>;
    fn list_ingestion_items(&self) -> Result<Vec<IngestionItem>>;
    fn delete_ingestion_item(&self, id: &str) -> Result<()>;

    // -- embeddings --
    fn get_embedding(&self, key: &str) -> Result<Option<Vec<f32>>>;
    fn upsert_embedding(&self, key: &str, vector: Vec<f32>) -> Result<()>;
    fn list_embedding_keys(&self) -> Result<Vec<String>>;

    // -- query cache (persistent tier) --
    fn get_query_cache_entry(&self, hash: &str) -> Result<Option<QueryCacheRow>>;
    fn upsert_query_cache_entry(&self, entry: QueryCacheRow) -> Result<()>;
    fn prune_query_cache(&self, bounds: PruneBounds) -> Result<u64>;

    // -- state blobs --
    fn get_state(&self, key: &str) -> Result<Option<String>>;
    fn set_state(&self, key: &str, json_blob: &str) -> Result<()>;

    // -- access logs and retrieval confidence log --
    fn get_query_access_logs(&self, limit: usize) -> Result<Vec<QueryAccessLog>>;
    fn append_query_access_log(&self, log: QueryAccessLog) -> Result<()>;
    fn append_retrieval_confidence_log(&self, record: RetrievalLogRecord) -> Result<()>;

    // -- metadata / stats --
    fn get_metadata(&self) -> Result<StoreMetadata>;
    fn get_stats(&self) -> Result<StoreStats>;
    fn get_index_coordination_version(&self) -> Result<Option<String>>;

    // -- checksums (watch invalidation) --
    fn set_file_checksum(&self, path: &str, checksum: &str) -> Result<()>;
    fn get_file_checksum(&self, path: &str) -> Result<Option<String>>;

    /// Runs `f` inside a single transaction. Concurrent writers serialize
    /// through this primitive.
    fn transaction(&self, f: &mut dyn FnMut() -> Result<()>) -> Result<()>;
}
