//! SQLite-backed `KnowledgeStore`: JSON-blob rows behind indexed key
//! columns, `Arc<Mutex<Connection>>` for thread safety, WAL mode, and
//! embeddings stored as JSON arrays. Backs `librarian.sqlite` under
//! `<workspace>/.librarian/`.

use super::{CochangeEdge, KnowledgeStore, PruneBounds, QueryAccessLog, QueryCacheRow};
use crate::error::{Error, Result};
use crate::model::{
    ContextPack, FileRecord, FunctionRecord, IngestionItem, KnowledgeEdge, ModuleRecord,
    RetrievalLogRecord, StoreMetadata, StoreStats,
};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub struct SqliteKnowledgeStore {
    conn: Arc<Mutex<Connection>>,
    #[allow(dead_code)]
    db_path: PathBuf,
}

fn to_millis(dt: &DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
}

impl SqliteKnowledgeStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&db_path)?;
        conn.query_row("PRAGMA journal_mode=WAL", [], |_| Ok(())).ok();
        let store = SqliteKnowledgeStore { conn: Arc::new(Mutex::new(conn)), db_path };
        store.initialize_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = SqliteKnowledgeStore { conn: Arc::new(Mutex::new(conn)), db_path: PathBuf::new() };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS functions (id TEXT PRIMARY KEY, json TEXT NOT NULL);
            CREATE TABLE IF NOT EXISTS modules (id TEXT PRIMARY KEY, json TEXT NOT NULL);
            CREATE TABLE IF NOT EXISTS files (id TEXT PRIMARY KEY, json TEXT NOT NULL);
            CREATE TABLE IF NOT EXISTS packs (
                pack_id TEXT PRIMARY KEY,
                json TEXT NOT NULL,
                confidence REAL NOT NULL
            );
            CREATE TABLE IF NOT EXISTS pack_related_files (
                pack_id TEXT NOT NULL,
                file_path TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_pack_related_files ON pack_related_files(file_path);
            CREATE TABLE IF NOT EXISTS edges (
                id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL,
                target_id TEXT NOT NULL,
                edge_type TEXT NOT NULL,
                json TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_id);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_edges_identity
                ON edges(source_id, target_id, edge_type);
            CREATE TABLE IF NOT EXISTS cochange (
                path_a TEXT NOT NULL,
                path_b TEXT NOT NULL,
                weight REAL NOT NULL,
                PRIMARY KEY (path_a, path_b)
            );
            CREATE TABLE IF NOT EXISTS ingestion_items (id TEXT PRIMARY KEY, json TEXT NOT NULL);
            CREATE TABLE IF NOT EXISTS embeddings (key TEXT PRIMARY KEY, vector TEXT NOT NULL);
            CREATE TABLE IF NOT EXISTS query_cache (
                query_hash TEXT PRIMARY KEY,
                query_params TEXT NOT NULL,
                response TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                last_accessed INTEGER NOT NULL,
                access_count INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_query_cache_created_at ON query_cache(created_at);
            CREATE TABLE IF NOT EXISTS state (key TEXT PRIMARY KEY, json_blob TEXT NOT NULL);
            CREATE TABLE IF NOT EXISTS query_access_log (
                query_hash TEXT NOT NULL,
                normalized_intent TEXT NOT NULL,
                returned_pack_ids TEXT NOT NULL,
                at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS retrieval_confidence_log (json TEXT NOT NULL);
            CREATE TABLE IF NOT EXISTS file_checksums (path TEXT PRIMARY KEY, checksum TEXT NOT NULL);
            ",
        )?;
        Ok(())
    }

    fn edge_type_key(edge_type: crate::model::EdgeType) -> &'static str {
        match edge_type {
            crate::model::EdgeType::CoChanged => "co_changed",
            crate::model::EdgeType::PartOf => "part_of",
            crate::model::EdgeType::ReturnsSchema => "returns_schema",
            crate::model::EdgeType::DependsOn => "depends_on",
            crate::model::EdgeType::Semantic => "semantic",
        }
    }
}

macro_rules! json_table_crud {
    ($upsert:ident, $get:ident, $list:ident, $delete:ident, $table:literal, $id_col:literal, $ty:ty, $id_expr:expr) => {
        fn $upsert(&self, record: $ty) -> Result<()> {
            let conn = self.conn.lock().unwrap();
            let id = $id_expr(&record);
            let json = serde_json::to_string(&record)?;
            conn.execute(
                concat!(
                    "INSERT INTO ", $table, " (", $id_col, ", json) VALUES (?1, ?2) ",
                    "ON CONFLICT(", $id_col, ") DO UPDATE SET json = excluded.json"
                ),
                params![id, json],
            )?;
            Ok(())
        }

        fn $get(&self, id: &str) -> Result<Option<$ty>> {
            let conn = self.conn.lock().unwrap();
            let json: Option<String> = conn
                .query_row(
                    concat!("SELECT json FROM ", $table, " WHERE ", $id_col, " = ?1"),
                    params![id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(match json {
                Some(j) => Some(serde_json::from_str(&j)?),
                None => None,
            })
        }

        fn $list(&self) -> Result<Vec<$ty>> {
            let conn = self.conn.lock().unwrap();
            let mut stmt = conn.prepare(concat!("SELECT json FROM ", $table))?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            let mut out = Vec::new();
            for row in rows {
                out.push(serde_json::from_str(&row?)?);
            }
            Ok(out)
        }

        fn $delete(&self, id: &str) -> Result<()> {
            let conn = self.conn.lock().unwrap();
            conn.execute(concat!("DELETE FROM ", $table, " WHERE ", $id_col, " = ?1"), params![id])?;
            Ok(())
        }
    };
}

impl KnowledgeStore for SqliteKnowledgeStore {
    json_table_crud!(
        upsert_function, get_function, list_functions, delete_function,
        "functions", "id", FunctionRecord, |r: &FunctionRecord| r.id.clone()
    );
    json_table_crud!(
        upsert_module, get_module, list_modules, delete_module,
        "modules", "id", ModuleRecord, |r: &ModuleRecord| r.id.clone()
    );
    json_table_crud!(
        upsert_file, get_file, list_files, delete_file,
        "files", "id", FileRecord, |r: &FileRecord| r.id.clone()
    );
    json_table_crud!(
        upsert_ingestion_item, get_ingestion_item, list_ingestion_items, delete_ingestion_item,
        "ingestion_items", "id", IngestionItem, |r: &IngestionItem| r.id.clone()
    );

    fn upsert_pack(&self, mut pack: ContextPack) -> Result<()> {
        pack.confidence = ContextPack::clamp_confidence(pack.confidence);
        let conn = self.conn.lock().unwrap();
        let json = serde_json::to_string(&pack)?;
        conn.execute(
            "INSERT INTO packs (pack_id, json, confidence) VALUES (?1, ?2, ?3)
             ON CONFLICT(pack_id) DO UPDATE SET json = excluded.json, confidence = excluded.confidence",
            params![pack.pack_id, json, pack.confidence],
        )?;
        conn.execute("DELETE FROM pack_related_files WHERE pack_id = ?1", params![pack.pack_id])?;
        for file in &pack.related_files {
            conn.execute(
                "INSERT INTO pack_related_files (pack_id, file_path) VALUES (?1, ?2)",
                params![pack.pack_id, file],
            )?;
        }
        Ok(())
    }

    fn get_pack(&self, pack_id: &str) -> Result<Option<ContextPack>> {
        let conn = self.conn.lock().unwrap();
        let json: Option<String> = conn
            .query_row("SELECT json FROM packs WHERE pack_id = ?1", params![pack_id], |row| row.get(0))
            .optional()?;
        Ok(match json {
            Some(j) => Some(serde_json::from_str(&j)?),
            None => None,
        })
    }

    fn list_packs(&self) -> Result<Vec<ContextPack>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT json FROM packs")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }

    fn packs_for_related_file(&self, file_path: &str) -> Result<Vec<ContextPack>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT p.json FROM packs p
             JOIN pack_related_files r ON r.pack_id = p.pack_id
             WHERE r.file_path = ?1",
        )?;
        let rows = stmt.query_map(params![file_path], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }

    fn delete_pack(&self, pack_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM packs WHERE pack_id = ?1", params![pack_id])?;
        conn.execute("DELETE FROM pack_related_files WHERE pack_id = ?1", params![pack_id])?;
        Ok(())
    }

    fn upsert_edge(&self, edge: KnowledgeEdge) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let json = serde_json::to_string(&edge)?;
        let edge_type = Self::edge_type_key(edge.edge_type);
        // Replaces prior weight for the same (source, target, type) ,
        // enforced by the unique index on that triple.
        conn.execute(
            "INSERT INTO edges (id, source_id, target_id, edge_type, json)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(source_id, target_id, edge_type)
             DO UPDATE SET json = excluded.json, id = excluded.id",
            params![edge.id, edge.source_id, edge.target_id, edge_type, json],
        )?;
        Ok(())
    }

    fn list_edges(&self) -> Result<Vec<KnowledgeEdge>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT json FROM edges")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }

    fn edges_from(&self, source_id: &str) -> Result<Vec<KnowledgeEdge>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT json FROM edges WHERE source_id = ?1")?;
        let rows = stmt.query_map(params![source_id], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(serde_json::from_str(&row?)?);
        }
        Ok(out)
    }

    fn delete_edge(&self, id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM edges WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn get_cochange_edges(&self, path: &str) -> Result<Vec<CochangeEdge>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT path_a, path_b, weight FROM cochange WHERE path_a = ?1 OR path_b = ?1")?;
        let rows = stmt.query_map(params![path], |row| {
            Ok(CochangeEdge { path_a: row.get(0)?, path_b: row.get(1)?, weight: row.get(2)? })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn store_cochange_edges(&self, edges: Vec<CochangeEdge>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        for e in edges {
            for (a, b) in [(e.path_a.clone(), e.path_b.clone()), (e.path_b.clone(), e.path_a.clone())] {
                conn.execute(
                    "INSERT INTO cochange (path_a, path_b, weight) VALUES (?1, ?2, ?3)
                     ON CONFLICT(path_a, path_b) DO UPDATE SET weight = excluded.weight",
                    params![a, b, e.weight],
                )?;
            }
        }
        Ok(())
    }

    fn get_embedding(&self, key: &str) -> Result<Option<Vec<f32>>> {
        let conn = self.conn.lock().unwrap();
        let raw: Option<String> = conn
            .query_row("SELECT vector FROM embeddings WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(match raw {
            Some(r) => Some(serde_json::from_str(&r)?),
            None => None,
        })
    }

    fn upsert_embedding(&self, key: &str, vector: Vec<f32>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let raw = serde_json::to_string(&vector)?;
        conn.execute(
            "INSERT INTO embeddings (key, vector) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET vector = excluded.vector",
            params![key, raw],
        )?;
        Ok(())
    }

    fn list_embedding_keys(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT key FROM embeddings")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn get_query_cache_entry(&self, hash: &str) -> Result<Option<QueryCacheRow>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT query_hash, query_params, response, created_at, last_accessed, access_count
             FROM query_cache WHERE query_hash = ?1",
            params![hash],
            |row| {
                Ok(QueryCacheRow {
                    query_hash: row.get(0)?,
                    query_params: row.get(1)?,
                    response: row.get(2)?,
                    created_at: from_millis(row.get(3)?),
                    last_accessed: from_millis(row.get(4)?),
                    access_count: row.get::<_, i64>(5)? as u64,
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    fn upsert_query_cache_entry(&self, entry: QueryCacheRow) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO query_cache (query_hash, query_params, response, created_at, last_accessed, access_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(query_hash) DO UPDATE SET
               query_params = excluded.query_params,
               response = excluded.response,
               last_accessed = excluded.last_accessed,
               access_count = excluded.access_count",
            params![
                entry.query_hash,
                entry.query_params,
                entry.response,
                to_millis(&entry.created_at),
                to_millis(&entry.last_accessed),
                entry.access_count as i64,
            ],
        )?;
        Ok(())
    }

    fn prune_query_cache(&self, bounds: PruneBounds) -> Result<u64> {
        let conn = self.conn.lock().unwrap();
        let cutoff = to_millis(&Utc::now()) - bounds.max_age_ms;
        let mut pruned = conn.execute("DELETE FROM query_cache WHERE created_at < ?1", params![cutoff])? as u64;

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM query_cache", [], |row| row.get(0))?;
        if count as usize > bounds.max_entries {
            let overflow = count as usize - bounds.max_entries;
            pruned += conn.execute(
                "DELETE FROM query_cache WHERE query_hash IN (
                    SELECT query_hash FROM query_cache ORDER BY created_at ASC LIMIT ?1
                 )",
                params![overflow as i64],
            )? as u64;
        }
        Ok(pruned)
    }

    fn get_state(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT json_blob FROM state WHERE key = ?1", params![key], |row| row.get(0))
            .optional()
            .map_err(Error::from)
    }

    fn set_state(&self, key: &str, json_blob: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO state (key, json_blob) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET json_blob = excluded.json_blob",
            params![key, json_blob],
        )?;
        Ok(())
    }

    fn get_query_access_logs(&self, limit: usize) -> Result<Vec<QueryAccessLog>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT query_hash, normalized_intent, returned_pack_ids, at
             FROM query_access_log ORDER BY at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            let pack_ids_raw: String = row.get(2)?;
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, pack_ids_raw, row.get::<_, i64>(3)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (query_hash, normalized_intent, pack_ids_raw, at) = row?;
            out.push(QueryAccessLog {
                query_hash,
                normalized_intent,
                returned_pack_ids: serde_json::from_str(&pack_ids_raw)?,
                at: from_millis(at),
            });
        }
        Ok(out)
    }

    fn append_query_access_log(&self, log: QueryAccessLog) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO query_access_log (query_hash, normalized_intent, returned_pack_ids, at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                log.query_hash,
                log.normalized_intent,
                serde_json::to_string(&log.returned_pack_ids)?,
                to_millis(&log.at)
            ],
        )?;
        Ok(())
    }

    fn append_retrieval_confidence_log(&self, record: RetrievalLogRecord) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO retrieval_confidence_log (json) VALUES (?1)",
            params![serde_json::to_string(&record)?],
        )?;
        Ok(())
    }

    fn get_metadata(&self) -> Result<StoreMetadata> {
        let workspace = self.get_state("workspace")?;
        let last_indexing = self
            .get_state("last_indexing")?
            .and_then(|raw| raw.parse::<i64>().ok())
            .map(from_millis);
        Ok(StoreMetadata { workspace, last_indexing })
    }

    fn get_stats(&self) -> Result<StoreStats> {
        let conn = self.conn.lock().unwrap();
        let count = |table: &str| -> rusqlite::Result<i64> {
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))
        };
        Ok(StoreStats {
            functions: count("functions")? as u64,
            modules: count("modules")? as u64,
            files: count("files")? as u64,
            packs: count("packs")? as u64,
            edges: count("edges")? as u64,
            cache_entries: count("query_cache")? as u64,
        })
    }

    fn get_index_coordination_version(&self) -> Result<Option<String>> {
        self.get_state("index_coordination_version")
    }

    fn set_file_checksum(&self, path: &str, checksum: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO file_checksums (path, checksum) VALUES (?1, ?2)
             ON CONFLICT(path) DO UPDATE SET checksum = excluded.checksum",
            params![path, checksum],
        )?;
        Ok(())
    }

    fn get_file_checksum(&self, path: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT checksum FROM file_checksums WHERE path = ?1", params![path], |row| row.get(0))
            .optional()
            .map_err(Error::from)
    }

    fn transaction(&self, f: &mut dyn FnMut() -> Result<()>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("BEGIN")?;
        drop(conn);
        match f() {
            Ok(()) => {
                self.conn.lock().unwrap().execute_batch("COMMIT")?;
                Ok(())
            }
            Err(err) => {
                self.conn.lock().unwrap().execute_batch("ROLLBACK").ok();
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EdgeType, EntityType};
    use chrono::Utc;

    fn store() -> SqliteKnowledgeStore {
        SqliteKnowledgeStore::open_in_memory().unwrap()
    }

    #[test]
    fn function_round_trips_through_json_column() {
        let db = store();
        let record = FunctionRecord {
            id: "f1".into(),
            file_path: "src/lib.rs".into(),
            name: "run".into(),
            signature: "fn run()".into(),
            purpose: "entry point".into(),
            start_line: 1,
            end_line: 10,
            confidence: 0.8,
            access_count: 0,
            last_accessed: None,
            validation_count: 0,
            outcome_history: Default::default(),
        };
        db.upsert_function(record.clone()).unwrap();
        let fetched = db.get_function("f1").unwrap().unwrap();
        assert_eq!(fetched.name, record.name);
    }

    #[test]
    fn edge_upsert_replaces_prior_weight_via_unique_index() {
        let db = store();
        let make = |weight: f64| KnowledgeEdge {
            id: uuid::Uuid::new_v4().to_string(),
            source_id: "a".into(),
            source_type: EntityType::File,
            target_id: "b".into(),
            target_type: EntityType::File,
            edge_type: EdgeType::DependsOn,
            weight,
            confidence: 0.5,
            metadata: serde_json::Value::Null,
            computed_at: Utc::now(),
        };
        db.upsert_edge(make(0.3)).unwrap();
        db.upsert_edge(make(0.9)).unwrap();
        let edges = db.list_edges().unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].weight, 0.9);
    }

    #[test]
    fn pack_related_files_index_drives_lookup() {
        let db = store();
        let pack = ContextPack {
            pack_id: "p1".into(),
            pack_type: crate::model::PackType::FunctionContext,
            target_id: "f1".into(),
            summary: "s".into(),
            key_facts: vec![],
            code_snippets: vec![],
            related_files: vec!["src/lib.rs".into()],
            confidence: 0.5,
            created_at: Utc::now(),
            access_count: 0,
            last_outcome: crate::model::Outcome::Unknown,
            success_count: 0,
            failure_count: 0,
            version: "1".into(),
            invalidation_triggers: vec![],
        };
        db.upsert_pack(pack).unwrap();
        let found = db.packs_for_related_file("src/lib.rs").unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn query_cache_prune_respects_max_age_and_max_entries() {
        let db = store();
        for i in 0..5 {
            db.upsert_query_cache_entry(QueryCacheRow {
                query_hash: format!("h{i}"),
                query_params: "{}".into(),
                response: "{}".into(),
                created_at: Utc::now() - chrono::Duration::seconds(i),
                last_accessed: Utc::now(),
                access_count: 1,
            })
            .unwrap();
        }
        let pruned = db.prune_query_cache(PruneBounds { max_entries: 2, max_age_ms: 10 * 3600 * 1000 }).unwrap();
        assert_eq!(pruned, 3);
        assert_eq!(db.get_stats().unwrap().cache_entries, 2);
    }

    #[test]
    fn transaction_rolls_back_state_write_on_closure_error() {
        let db = store();
        let result = db.transaction(&mut || {
            db.set_state("k", "v")?;
            Err(Error::StorageFatal("boom".into()))
        });
        assert!(result.is_err());
    }
}
