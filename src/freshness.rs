//! The Freshness Gate: decides whether a query may be
//! served, must trigger a bootstrap, or may proceed with staleness
//! disclosures attached. Reconciles watch state, the git cursor, and
//! the cross-artifact consistency marker; the checks run in declared
//! order and the first match wins.

use crate::error::Result;
use crate::store::KnowledgeStore;
use crate::watch::{
    ArtifactBackupState, BootstrapConsistencyState, BootstrapStatus, Cursor, GitCursorProbe,
    GitRelation, WatchState,
};
use chrono::{DateTime, Duration, Utc};
use std::path::Path;

/// Default freshness window for an `fs`-cursor reconcile timestamp
/// before it is considered stale.
pub const DEFAULT_FRESHNESS_WINDOW_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq)]
pub struct FreshnessVerdict {
    pub required: bool,
    pub reason: String,
    pub disclosures: Vec<String>,
    /// Set when a stale artifact backup was found and recovered during
    /// this call.
    pub backup_recovery: Option<BackupRecovery>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BackupRecovery {
    pub had_backup: bool,
    pub restored: bool,
}

impl FreshnessVerdict {
    fn required(reason: impl Into<String>) -> Self {
        FreshnessVerdict { required: true, reason: reason.into(), disclosures: Vec::new(), backup_recovery: None }
    }

    fn not_required(reason: impl Into<String>) -> Self {
        FreshnessVerdict { required: false, reason: reason.into(), disclosures: Vec::new(), backup_recovery: None }
    }
}

/// Restores (or discards) a stale artifact backup. A real implementation
/// moves files on disk; tests supply a no-op or recording fake.
pub trait ArtifactRecovery: Send + Sync {
    fn restore(&self, backup: &ArtifactBackupState) -> Result<()>;
    fn discard(&self, backup: &ArtifactBackupState) -> Result<()>;
}

pub struct FreshnessGate<'a> {
    pub store: &'a dyn KnowledgeStore,
    pub git_probe: &'a dyn GitCursorProbe,
    pub recovery: &'a dyn ArtifactRecovery,
    pub freshness_window: Duration,
    pub restore_artifacts: bool,
}

impl<'a> FreshnessGate<'a> {
    pub fn new(
        store: &'a dyn KnowledgeStore,
        git_probe: &'a dyn GitCursorProbe,
        recovery: &'a dyn ArtifactRecovery,
    ) -> Self {
        FreshnessGate {
            store,
            git_probe,
            recovery,
            freshness_window: Duration::seconds(DEFAULT_FRESHNESS_WINDOW_SECS),
            restore_artifacts: true,
        }
    }

    /// `isBootstrapRequired`: ordered checks, first match wins.
    pub fn is_bootstrap_required(&self, _workspace: &Path) -> Result<FreshnessVerdict> {
        let consistency_raw = self.store.get_state("bootstrap_consistency")?;
        let consistency: Option<BootstrapConsistencyState> = match &consistency_raw {
            Some(raw) => Some(serde_json::from_str(raw)?),
            None => None,
        };

        // 1. no prior bootstrap report, or version mismatch.
        let Some(consistency) = consistency else {
            return Ok(FreshnessVerdict::required("no prior bootstrap report found"));
        };
        let coordination_version = self.store.get_index_coordination_version()?;
        if coordination_version.is_none() {
            return Ok(FreshnessVerdict::required("index coordination version is missing or outdated"));
        }

        // 2. consistency marker in progress.
        if consistency.status == BootstrapStatus::InProgress {
            return Ok(FreshnessVerdict::required("bootstrap consistency marker reports in_progress"));
        }

        // 3. complete but an artifact is missing on disk.
        if consistency.status == BootstrapStatus::Complete {
            let missing = consistency.artifacts.missing();
            if let Some(first) = missing.first() {
                return Ok(FreshnessVerdict::required(format!("missing artifact: {}", first.path)));
            }
        }

        // 4. stale artifact backup recovery, always runs once then falls through.
        let mut backup_recovery = None;
        if let Some(backup_raw) = self.store.get_state("artifact_backup")? {
            let backup: ArtifactBackupState = serde_json::from_str(&backup_raw)?;
            if backup.is_stale_against(&consistency.generation_id) {
                let restored = if self.restore_artifacts {
                    self.recovery.restore(&backup)?;
                    true
                } else {
                    self.recovery.discard(&backup)?;
                    false
                };
                self.store.set_state("artifact_backup", "null")?;
                backup_recovery = Some(BackupRecovery { had_backup: true, restored });
            }
        }

        // 5. watch state inspection.
        let watch_raw = self.store.get_state("watch_state")?;
        let Some(watch_raw) = watch_raw else {
            let mut verdict = FreshnessVerdict::not_required("Librarian data is up-to-date");
            verdict.disclosures.push("watch_state_missing".to_string());
            verdict.backup_recovery = backup_recovery;
            return Ok(verdict);
        };
        let watch: WatchState = serde_json::from_str(&watch_raw)?;

        if watch.needs_catchup {
            let mut verdict = FreshnessVerdict::required("catch-up is required");
            verdict.backup_recovery = backup_recovery;
            return Ok(verdict);
        }

        let mut verdict = match &watch.cursor {
            Cursor::Git { last_indexed_commit_sha } => {
                self.reconcile_git_cursor(last_indexed_commit_sha.as_deref(), &watch)?
            }
            Cursor::Fs { last_reconcile_completed_at } => {
                self.reconcile_fs_cursor(*last_reconcile_completed_at, &watch)
            }
        };
        verdict.backup_recovery = backup_recovery;
        Ok(verdict)
    }

    fn reconcile_git_cursor(&self, indexed: Option<&str>, watch: &WatchState) -> Result<FreshnessVerdict> {
        let Some(indexed) = indexed else {
            return Ok(FreshnessVerdict::required("no indexed commit recorded"));
        };
        let head = self.git_probe.current_head()?;
        if indexed == head {
            return Ok(FreshnessVerdict::not_required("Librarian data is up-to-date"));
        }
        match self.git_probe.relation(indexed, &head)? {
            GitRelation::Equal => Ok(FreshnessVerdict::not_required("Librarian data is up-to-date")),
            GitRelation::IndexedAncestor => {
                self.mark_needs_catchup(watch)?;
                Ok(FreshnessVerdict::required(format!(
                    "Index is stale relative to git HEAD: indexed commit {} vs HEAD {}. Run `librarian bootstrap`",
                    indexed, head
                )))
            }
            GitRelation::HeadAncestor => Ok(FreshnessVerdict::required(
                "HEAD moved backward of the indexed commit. Run `librarian bootstrap --force`",
            )),
            GitRelation::Diverged => Ok(FreshnessVerdict::required(
                "indexed commit and HEAD have diverged. Run `librarian bootstrap --force`",
            )),
        }
    }

    fn mark_needs_catchup(&self, watch: &WatchState) -> Result<()> {
        let mut next = watch.clone();
        next.needs_catchup = true;
        self.store.set_state("watch_state", &serde_json::to_string(&next)?)
    }

    fn reconcile_fs_cursor(
        &self,
        last_reconcile_completed_at: Option<DateTime<Utc>>,
        watch: &WatchState,
    ) -> FreshnessVerdict {
        let mut verdict = FreshnessVerdict::not_required("Librarian data is up-to-date");
        let stale = last_reconcile_completed_at
            .map(|at| Utc::now() - at > self.freshness_window)
            .unwrap_or(true);
        if stale {
            verdict.disclosures.push("watch_reconcile_stale".to_string());
        }
        if stale && watch.is_suspected_dead() {
            verdict.disclosures.push("unverified_by_trace(watch_suspected_dead)".to_string());
        }
        verdict
    }
}

/// Artifact recovery that records calls without touching the filesystem,
/// for use in components that only need the Gate's control flow.
#[derive(Default)]
pub struct NoopArtifactRecovery;

impl ArtifactRecovery for NoopArtifactRecovery {
    fn restore(&self, _backup: &ArtifactBackupState) -> Result<()> {
        Ok(())
    }

    fn discard(&self, _backup: &ArtifactBackupState) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryKnowledgeStore;
    use crate::watch::{ArtifactBackupState, ArtifactEvidence, BootstrapArtifacts};

    struct FixedGitProbe {
        head: String,
        relation: GitRelation,
    }

    impl GitCursorProbe for FixedGitProbe {
        fn current_head(&self) -> Result<String> {
            Ok(self.head.clone())
        }
        fn relation(&self, _indexed: &str, _head: &str) -> Result<GitRelation> {
            Ok(self.relation)
        }
    }

    fn evidence(path: &str, exists: bool) -> ArtifactEvidence {
        ArtifactEvidence { path: path.into(), exists, size_bytes: None, mtime_ms: None }
    }

    fn complete_consistency(generation_id: &str) -> BootstrapConsistencyState {
        BootstrapConsistencyState {
            kind: BootstrapConsistencyState::KIND.into(),
            schema_version: 1,
            workspace: "/ws".into(),
            generation_id: generation_id.into(),
            status: BootstrapStatus::Complete,
            started_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: Some(Utc::now()),
            artifacts: BootstrapArtifacts {
                librarian: evidence("librarian.sqlite", true),
                knowledge: evidence("knowledge.db", true),
                evidence: evidence("evidence_ledger.db", true),
            },
        }
    }

    #[test]
    fn missing_bootstrap_report_requires_bootstrap() {
        let store = InMemoryKnowledgeStore::new();
        let probe = FixedGitProbe { head: "abc".into(), relation: GitRelation::Equal };
        let recovery = NoopArtifactRecovery;
        let gate = FreshnessGate::new(&store, &probe, &recovery);
        let verdict = gate.is_bootstrap_required(Path::new("/ws")).unwrap();
        assert!(verdict.required);
    }

    #[test]
    fn complete_marker_with_missing_artifact_requires_bootstrap() {
        let store = InMemoryKnowledgeStore::new();
        store.set_state("index_coordination_version", "v1").unwrap();
        let mut consistency = complete_consistency("gen-1");
        consistency.artifacts.knowledge = evidence("knowledge.db", false);
        store.set_state("bootstrap_consistency", &serde_json::to_string(&consistency).unwrap()).unwrap();
        let probe = FixedGitProbe { head: "abc".into(), relation: GitRelation::Equal };
        let recovery = NoopArtifactRecovery;
        let gate = FreshnessGate::new(&store, &probe, &recovery);
        let verdict = gate.is_bootstrap_required(Path::new("/ws")).unwrap();
        assert!(verdict.required);
        assert!(verdict.reason.contains("knowledge.db"));
    }

    #[test]
    fn git_cursor_equal_to_head_is_not_required() {
        let store = InMemoryKnowledgeStore::new();
        store.set_state("index_coordination_version", "v1").unwrap();
        store
            .set_state("bootstrap_consistency", &serde_json::to_string(&complete_consistency("gen-1")).unwrap())
            .unwrap();
        let watch = WatchState {
            schema_version: 1,
            workspace_root: "/ws".into(),
            watch_last_heartbeat_at: Some(Utc::now()),
            suspected_dead: Some(false),
            needs_catchup: false,
            storage_attached: Some(true),
            cursor: Cursor::Git { last_indexed_commit_sha: Some("abc".into()) },
        };
        store.set_state("watch_state", &serde_json::to_string(&watch).unwrap()).unwrap();
        let probe = FixedGitProbe { head: "abc".into(), relation: GitRelation::Equal };
        let recovery = NoopArtifactRecovery;
        let gate = FreshnessGate::new(&store, &probe, &recovery);
        let verdict = gate.is_bootstrap_required(Path::new("/ws")).unwrap();
        assert!(!verdict.required);
    }

    #[test]
    fn git_cursor_indexed_ancestor_requires_bootstrap_and_marks_catchup() {
        let store = InMemoryKnowledgeStore::new();
        store.set_state("index_coordination_version", "v1").unwrap();
        store
            .set_state("bootstrap_consistency", &serde_json::to_string(&complete_consistency("gen-1")).unwrap())
            .unwrap();
        let watch = WatchState {
            schema_version: 1,
            workspace_root: "/ws".into(),
            watch_last_heartbeat_at: Some(Utc::now()),
            suspected_dead: Some(false),
            needs_catchup: false,
            storage_attached: Some(true),
            cursor: Cursor::Git { last_indexed_commit_sha: Some("abc".into()) },
        };
        store.set_state("watch_state", &serde_json::to_string(&watch).unwrap()).unwrap();
        let probe = FixedGitProbe { head: "def".into(), relation: GitRelation::IndexedAncestor };
        let recovery = NoopArtifactRecovery;
        let gate = FreshnessGate::new(&store, &probe, &recovery);
        let verdict = gate.is_bootstrap_required(Path::new("/ws")).unwrap();
        assert!(verdict.required);
        let raw = store.get_state("watch_state").unwrap().unwrap();
        let next: WatchState = serde_json::from_str(&raw).unwrap();
        assert!(next.needs_catchup);
    }

    #[test]
    fn stale_fs_reconcile_emits_disclosure_without_requiring_bootstrap() {
        let store = InMemoryKnowledgeStore::new();
        store.set_state("index_coordination_version", "v1").unwrap();
        store
            .set_state("bootstrap_consistency", &serde_json::to_string(&complete_consistency("gen-1")).unwrap())
            .unwrap();
        let watch = WatchState {
            schema_version: 1,
            workspace_root: "/ws".into(),
            watch_last_heartbeat_at: Some(Utc::now() - Duration::seconds(600)),
            suspected_dead: Some(true),
            needs_catchup: false,
            storage_attached: Some(true),
            cursor: Cursor::Fs { last_reconcile_completed_at: Some(Utc::now() - Duration::seconds(600)) },
        };
        store.set_state("watch_state", &serde_json::to_string(&watch).unwrap()).unwrap();
        let probe = FixedGitProbe { head: "abc".into(), relation: GitRelation::Equal };
        let recovery = NoopArtifactRecovery;
        let gate = FreshnessGate::new(&store, &probe, &recovery);
        let verdict = gate.is_bootstrap_required(Path::new("/ws")).unwrap();
        assert!(!verdict.required);
        assert!(verdict.disclosures.contains(&"watch_reconcile_stale".to_string()));
        assert!(verdict.disclosures.iter().any(|d| d.contains("watch_suspected_dead")));
    }

    #[test]
    fn stale_backup_is_restored_exactly_once() {
        let store = InMemoryKnowledgeStore::new();
        store.set_state("index_coordination_version", "v1").unwrap();
        store
            .set_state("bootstrap_consistency", &serde_json::to_string(&complete_consistency("gen-2")).unwrap())
            .unwrap();
        let backup = ArtifactBackupState {
            kind: ArtifactBackupState::KIND.into(),
            workspace: "/ws".into(),
            generation_id: "gen-1".into(),
            created_at: Utc::now(),
            files: vec![],
        };
        store.set_state("artifact_backup", &serde_json::to_string(&backup).unwrap()).unwrap();
        let watch = WatchState {
            schema_version: 1,
            workspace_root: "/ws".into(),
            watch_last_heartbeat_at: Some(Utc::now()),
            suspected_dead: Some(false),
            needs_catchup: false,
            storage_attached: Some(true),
            cursor: Cursor::Git { last_indexed_commit_sha: Some("abc".into()) },
        };
        store.set_state("watch_state", &serde_json::to_string(&watch).unwrap()).unwrap();
        let probe = FixedGitProbe { head: "abc".into(), relation: GitRelation::Equal };
        let recovery = NoopArtifactRecovery;
        let gate = FreshnessGate::new(&store, &probe, &recovery);
        let verdict = gate.is_bootstrap_required(Path::new("/ws")).unwrap();
        assert_eq!(verdict.backup_recovery, Some(BackupRecovery { had_backup: true, restored: true }));
        assert_eq!(store.get_state("artifact_backup").unwrap(), Some("null".to_string()));
    }
}
