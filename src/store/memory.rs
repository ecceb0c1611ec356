//! In-memory `KnowledgeStore`, generalizing a single in-memory
//! constructor for one engine into a full in-memory implementation of
//! the trait, so pipeline and unit tests can run without touching the
//! filesystem at all.

use super::{CochangeEdge, KnowledgeStore, PruneBounds, QueryAccessLog, QueryCacheRow};
use crate::error::Result;
use crate::model::{
    ContextPack, FileRecord, FunctionRecord, IngestionItem, KnowledgeEdge, ModuleRecord,
    RetrievalLogRecord, StoreMetadata, StoreStats,
};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct Tables {
    functions: HashMap<String, FunctionRecord>,
    modules: HashMap<String, ModuleRecord>,
    files: HashMap<String, FileRecord>,
    packs: HashMap<String, ContextPack>,
    edges: HashMap<String, KnowledgeEdge>,
    ingestion_items: HashMap<String, IngestionItem>,
    embeddings: HashMap<String, Vec<f32>>,
    query_cache: HashMap<String, QueryCacheRow>,
    state: HashMap<String, String>,
    access_logs: Vec<QueryAccessLog>,
    retrieval_log: Vec<RetrievalLogRecord>,
    cochange: HashMap<(String, String), f64>,
    checksums: HashMap<String, String>,
    metadata: StoreMetadata,
}

/// Thread-safe, process-local store. A single mutex stands in for a
/// connection handle: one writer at a time, transactions are just
/// "hold the lock longer".
pub struct InMemoryKnowledgeStore {
    tables: Mutex<Tables>,
}

impl Default for InMemoryKnowledgeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryKnowledgeStore {
    pub fn new() -> Self {
        InMemoryKnowledgeStore { tables: Mutex::new(Tables::default()) }
    }

    /// Test-only introspection: the store's `KnowledgeStore` trait has
    /// no getter for the retrieval confidence log since real callers
    /// only ever append to it.
    #[cfg(test)]
    pub fn list_retrieval_confidence_log_for_test(&self) -> Vec<RetrievalLogRecord> {
        self.tables.lock().unwrap().retrieval_log.clone()
    }
}

fn edge_identity_key(edge: &KnowledgeEdge) -> (String, String, String) {
    (
        edge.source_id.clone(),
        edge.target_id.clone(),
        format!("{:?}", edge.edge_type),
    )
}

impl KnowledgeStore for InMemoryKnowledgeStore {
    fn upsert_function(&self, record: FunctionRecord) -> Result<()> {
        self.tables.lock().unwrap().functions.insert(record.id.clone(), record);
        Ok(())
    }

    fn get_function(&self, id: &str) -> Result<Option<FunctionRecord>> {
        Ok(self.tables.lock().unwrap().functions.get(id).cloned())
    }

    fn list_functions(&self) -> Result<Vec<FunctionRecord>> {
        Ok(self.tables.lock().unwrap().functions.values().cloned().collect())
    }

    fn delete_function(&self, id: &str) -> Result<()> {
        self.tables.lock().unwrap().functions.remove(id);
        Ok(())
    }

    fn upsert_module(&self, record: ModuleRecord) -> Result<()> {
        self.tables.lock().unwrap().modules.insert(record.id.clone(), record);
        Ok(())
    }

    fn get_module(&self, id: &str) -> Result<Option<ModuleRecord>> {
        Ok(self.tables.lock().unwrap().modules.get(id).cloned())
    }

    fn list_modules(&self) -> Result<Vec<ModuleRecord>> {
        Ok(self.tables.lock().unwrap().modules.values().cloned().collect())
    }

    fn delete_module(&self, id: &str) -> Result<()> {
        self.tables.lock().unwrap().modules.remove(id);
        Ok(())
    }

    fn upsert_file(&self, record: FileRecord) -> Result<()> {
        self.tables.lock().unwrap().files.insert(record.id.clone(), record);
        Ok(())
    }

    fn get_file(&self, id: &str) -> Result<Option<FileRecord>> {
        Ok(self.tables.lock().unwrap().files.get(id).cloned())
    }

    fn list_files(&self) -> Result<Vec<FileRecord>> {
        Ok(self.tables.lock().unwrap().files.values().cloned().collect())
    }

    fn delete_file(&self, id: &str) -> Result<()> {
        self.tables.lock().unwrap().files.remove(id);
        Ok(())
    }

    fn upsert_pack(&self, mut pack: ContextPack) -> Result<()> {
        pack.confidence = ContextPack::clamp_confidence(pack.confidence);
        self.tables.lock().unwrap().packs.insert(pack.pack_id.clone(), pack);
        Ok(())
    }

    fn get_pack(&self, pack_id: &str) -> Result<Option<ContextPack>> {
        Ok(self.tables.lock().unwrap().packs.get(pack_id).cloned())
    }

    fn list_packs(&self) -> Result<Vec<ContextPack>> {
        Ok(self.tables.lock().unwrap().packs.values().cloned().collect())
    }

    fn packs_for_related_file(&self, file_path: &str) -> Result<Vec<ContextPack>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .packs
            .values()
            .filter(|p| p.related_files.iter().any(|f| f == file_path))
            .cloned()
            .collect())
    }

    fn delete_pack(&self, pack_id: &str) -> Result<()> {
        self.tables.lock().unwrap().packs.remove(pack_id);
        Ok(())
    }

    fn upsert_edge(&self, edge: KnowledgeEdge) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        // Replace prior weight for the same (source, target, type) .
        let identity = edge_identity_key(&edge);
        let existing_id = tables
            .edges
            .values()
            .find(|e| edge_identity_key(e) == identity)
            .map(|e| e.id.clone());
        if let Some(old_id) = existing_id {
            tables.edges.remove(&old_id);
        }
        tables.edges.insert(edge.id.clone(), edge);
        Ok(())
    }

    fn list_edges(&self) -> Result<Vec<KnowledgeEdge>> {
        Ok(self.tables.lock().unwrap().edges.values().cloned().collect())
    }

    fn edges_from(&self, source_id: &str) -> Result<Vec<KnowledgeEdge>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .edges
            .values()
            .filter(|e| e.source_id == source_id)
            .cloned()
            .collect())
    }

    fn delete_edge(&self, id: &str) -> Result<()> {
        self.tables.lock().unwrap().edges.remove(id);
        Ok(())
    }

    fn get_cochange_edges(&self, path: &str) -> Result<Vec<CochangeEdge>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .cochange
            .iter()
            .filter(|((a, b), _)| a == path || b == path)
            .map(|((a, b), w)| CochangeEdge { path_a: a.clone(), path_b: b.clone(), weight: *w })
            .collect())
    }

    fn store_cochange_edges(&self, edges: Vec<CochangeEdge>) -> Result<()> {
        let mut tables = self.tables.lock().unwrap();
        for e in edges {
            // Stored symmetrically: both directions are first-class keys.
            tables.cochange.insert((e.path_a.clone(), e.path_b.clone()), e.weight);
            tables.cochange.insert((e.path_b.clone(), e.path_a.clone()), e.weight);
        }
        Ok(())
    }

    fn upsert_ingestion_item(&self, item: IngestionItem) -> Result<()> {
        self.tables.lock().unwrap().ingestion_items.insert(item.id.clone(), item);
        Ok(())
    }

    fn get_ingestion_item(&self, id: &str) -> Result<Option<IngestionItem>> {
        Ok(self.tables.lock().unwrap().ingestion_items.get(id).cloned())
    }

    fn list_ingestion_items(&self) -> Result<Vec<IngestionItem>> {
        Ok(self.tables.lock().unwrap().ingestion_items.values().cloned().collect())
    }

    fn delete_ingestion_item(&self, id: &str) -> Result<()> {
        self.tables.lock().unwrap().ingestion_items.remove(id);
        Ok(())
    }

    fn get_embedding(&self, key: &str) -> Result<Option<Vec<f32>>> {
        Ok(self.tables.lock().unwrap().embeddings.get(key).cloned())
    }

    fn upsert_embedding(&self, key: &str, vector: Vec<f32>) -> Result<()> {
        self.tables.lock().unwrap().embeddings.insert(key.to_string(), vector);
        Ok(())
    }

    fn list_embedding_keys(&self) -> Result<Vec<String>> {
        Ok(self.tables.lock().unwrap().embeddings.keys().cloned().collect())
    }

    fn get_query_cache_entry(&self, hash: &str) -> Result<Option<QueryCacheRow>> {
        Ok(self.tables.lock().unwrap().query_cache.get(hash).cloned())
    }

    fn upsert_query_cache_entry(&self, entry: QueryCacheRow) -> Result<()> {
        self.tables.lock().unwrap().query_cache.insert(entry.query_hash.clone(), entry);
        Ok(())
    }

    fn prune_query_cache(&self, bounds: PruneBounds) -> Result<u64> {
        let mut tables = self.tables.lock().unwrap();
        let now = chrono::Utc::now();
        let mut pruned = 0u64;

        let stale: Vec<String> = tables
            .query_cache
            .values()
            .filter(|e| (now - e.created_at).num_milliseconds() > bounds.max_age_ms)
            .map(|e| e.query_hash.clone())
            .collect();
        for hash in stale {
            tables.query_cache.remove(&hash);
            pruned += 1;
        }

        if tables.query_cache.len() > bounds.max_entries {
            let mut by_age: Vec<(String, chrono::DateTime<chrono::Utc>)> = tables
                .query_cache
                .values()
                .map(|e| (e.query_hash.clone(), e.created_at))
                .collect();
            by_age.sort_by_key(|(_, created_at)| *created_at);
            let overflow = tables.query_cache.len() - bounds.max_entries;
            for (hash, _) in by_age.into_iter().take(overflow) {
                tables.query_cache.remove(&hash);
                pruned += 1;
            }
        }
        Ok(pruned)
    }

    fn get_state(&self, key: &str) -> Result<Option<String>> {
        Ok(self.tables.lock().unwrap().state.get(key).cloned())
    }

    fn set_state(&self, key: &str, json_blob: &str) -> Result<()> {
        self.tables.lock().unwrap().state.insert(key.to_string(), json_blob.to_string());
        Ok(())
    }

    fn get_query_access_logs(&self, limit: usize) -> Result<Vec<QueryAccessLog>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.access_logs.iter().rev().take(limit).cloned().collect())
    }

    fn append_query_access_log(&self, log: QueryAccessLog) -> Result<()> {
        self.tables.lock().unwrap().access_logs.push(log);
        Ok(())
    }

    fn append_retrieval_confidence_log(&self, record: RetrievalLogRecord) -> Result<()> {
        self.tables.lock().unwrap().retrieval_log.push(record);
        Ok(())
    }

    fn get_metadata(&self) -> Result<StoreMetadata> {
        Ok(self.tables.lock().unwrap().metadata.clone())
    }

    fn get_stats(&self) -> Result<StoreStats> {
        let tables = self.tables.lock().unwrap();
        Ok(StoreStats {
            functions: tables.functions.len() as u64,
            modules: tables.modules.len() as u64,
            files: tables.files.len() as u64,
            packs: tables.packs.len() as u64,
            edges: tables.edges.len() as u64,
            cache_entries: tables.query_cache.len() as u64,
        })
    }

    fn get_index_coordination_version(&self) -> Result<Option<String>> {
        self.get_state("index_coordination_version")
    }

    fn set_file_checksum(&self, path: &str, checksum: &str) -> Result<()> {
        self.tables.lock().unwrap().checksums.insert(path.to_string(), checksum.to_string());
        Ok(())
    }

    fn get_file_checksum(&self, path: &str) -> Result<Option<String>> {
        Ok(self.tables.lock().unwrap().checksums.get(path).cloned())
    }

    fn transaction(&self, f: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        // A single process-wide mutex already serializes every table
        // mutation, so the "transaction" is simply running the closure;
        // there is nothing to roll back on the in-memory backend.
        f()
    }
}
