//! Retrieval Observability: confidence/escalation event
//! logging to both the JSONL file under `.librarian/` and the store's
//! append method. Neither call ever throws to the caller; failures are
//! logged via `tracing` and swallowed.

use crate::model::RetrievalLogRecord;
use crate::store::KnowledgeStore;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Rounds `confidence_score` to 4 decimal places; `retrieval_entropy` is
/// left at natural precision.
fn prepare_record(mut record: RetrievalLogRecord) -> RetrievalLogRecord {
    record.confidence_score = round4(record.confidence_score);
    record
}

fn append_jsonl(workspace_root: &Path, record: &RetrievalLogRecord) {
    let path = workspace_root.join(".librarian").join("retrieval_confidence_log.jsonl");
    let Some(parent) = path.parent() else { return };
    if let Err(err) = std::fs::create_dir_all(parent) {
        tracing::warn!(error = %err, "failed to create .librarian directory for retrieval log");
        return;
    }
    let line = match serde_json::to_string(record) {
        Ok(line) => line,
        Err(err) => {
            tracing::warn!(error = %err, "failed to serialize retrieval log record");
            return;
        }
    };
    let file = OpenOptions::new().create(true).append(true).open(&path);
    match file {
        Ok(mut file) => {
            if let Err(err) = writeln!(file, "{}", line) {
                tracing::warn!(error = %err, "failed to append retrieval log line");
            }
        }
        Err(err) => tracing::warn!(error = %err, "failed to open retrieval log file"),
    }
}

/// `logRetrievalConfidenceObservation`: appends to both the JSONL file
/// and the store, never throwing to the caller.
pub fn log_retrieval_confidence_observation(
    store: &dyn KnowledgeStore,
    workspace_root: &Path,
    record: RetrievalLogRecord,
) {
    let record = prepare_record(record);
    append_jsonl(workspace_root, &record);
    if let Err(err) = store.append_retrieval_confidence_log(record) {
        tracing::warn!(error = %err, "failed to append retrieval confidence log to store");
    }
}

/// `logRetrievalEscalationEvent`: same dual-write contract, for the
/// escalation-specific subset of fields (`fromDepth`, `toDepth`,
/// `escalationReason`, `attempt`, `maxEscalationDepth`).
pub fn log_retrieval_escalation_event(
    store: &dyn KnowledgeStore,
    workspace_root: &Path,
    record: RetrievalLogRecord,
) {
    log_retrieval_confidence_observation(store, workspace_root, record);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryKnowledgeStore;
    use chrono::Utc;
    use tempfile::tempdir;

    fn record(confidence: f64) -> RetrievalLogRecord {
        RetrievalLogRecord {
            query_hash: "h1".into(),
            intent: Some("test".into()),
            confidence_score: confidence,
            retrieval_entropy: 1.2345678,
            returned_pack_ids: vec!["p1".into()],
            timestamp: Utc::now(),
            routed_strategy: None,
            from_depth: None,
            to_depth: None,
            escalation_reason: None,
            attempt: None,
            max_escalation_depth: None,
        }
    }

    #[test]
    fn confidence_score_rounds_to_four_decimal_places() {
        let store = InMemoryKnowledgeStore::new();
        let dir = tempdir().unwrap();
        log_retrieval_confidence_observation(&store, dir.path(), record(0.123456789));
        let logs = store.list_retrieval_confidence_log_for_test();
        assert_eq!(logs[0].confidence_score, 0.1235);
    }

    #[test]
    fn appends_one_jsonl_line_per_call() {
        let store = InMemoryKnowledgeStore::new();
        let dir = tempdir().unwrap();
        log_retrieval_confidence_observation(&store, dir.path(), record(0.5));
        log_retrieval_confidence_observation(&store, dir.path(), record(0.6));
        let contents = std::fs::read_to_string(dir.path().join(".librarian/retrieval_confidence_log.jsonl")).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
