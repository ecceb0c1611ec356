//! Watch state, bootstrap consistency marker, and artifact backup state.
//! The filesystem watcher and the bootstrap pass that write
//! these are external collaborators; this module only models the
//! shapes the Freshness Gate reconciles against and the
//! `update_watch_state` read-modify-write contract callers use to mutate
//! them safely.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Cursor {
    #[serde(rename = "git")]
    Git {
        #[serde(skip_serializing_if = "Option::is_none")]
        last_indexed_commit_sha: Option<String>,
    },
    #[serde(rename = "fs")]
    Fs {
        #[serde(skip_serializing_if = "Option::is_none")]
        last_reconcile_completed_at: Option<DateTime<Utc>>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchState {
    pub schema_version: u32,
    pub workspace_root: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watch_last_heartbeat_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspected_dead: Option<bool>,
    pub needs_catchup: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_attached: Option<bool>,
    pub cursor: Cursor,
}

impl WatchState {
    pub fn is_suspected_dead(&self) -> bool {
        self.suspected_dead.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapStatus {
    InProgress,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactEvidence {
    pub path: String,
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtime_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapArtifacts {
    pub librarian: ArtifactEvidence,
    pub knowledge: ArtifactEvidence,
    pub evidence: ArtifactEvidence,
}

impl BootstrapArtifacts {
    /// The artifacts declared missing on disk, in declaration order, used
    /// by the Freshness Gate to name the first missing artifact.
    pub fn missing(&self) -> Vec<&ArtifactEvidence> {
        [&self.librarian, &self.knowledge, &self.evidence]
            .into_iter()
            .filter(|a| !a.exists)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConsistencyState {
    pub kind: String,
    pub schema_version: u32,
    pub workspace: String,
    pub generation_id: String,
    pub status: BootstrapStatus,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub artifacts: BootstrapArtifacts,
}

impl BootstrapConsistencyState {
    pub const KIND: &'static str = "BootstrapConsistencyState.v1";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackedUpFile {
    pub original_path: String,
    pub backup_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactBackupState {
    pub kind: String,
    pub workspace: String,
    pub generation_id: String,
    pub created_at: DateTime<Utc>,
    pub files: Vec<BackedUpFile>,
}

impl ArtifactBackupState {
    pub const KIND: &'static str = "BootstrapArtifactBackupState.v1";

    /// Whether this backup was left over by a generation other than the
    /// one currently recorded in the consistency marker.
    pub fn is_stale_against(&self, current_generation_id: &str) -> bool {
        self.generation_id != current_generation_id
    }
}

/// The relation of the indexed commit to HEAD, as git would report it
/// for git-cursor reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitRelation {
    Equal,
    /// HEAD moved forward of the indexed commit (fast-forward).
    IndexedAncestor,
    /// HEAD moved backward of the indexed commit.
    HeadAncestor,
    /// Neither is an ancestor of the other (rebase/rewrite).
    Diverged,
}

/// Abstraction over the git cursor probe the Freshness Gate depends on.
/// A real implementation shells out to `git merge-base`; tests supply a
/// fixed relation.
pub trait GitCursorProbe: Send + Sync {
    fn current_head(&self) -> crate::error::Result<String>;
    fn relation(&self, indexed: &str, head: &str) -> crate::error::Result<GitRelation>;
}

/// `updateWatchState(storage, updater)`: a read-modify-write contract so
/// a failed update never leaves partial writes. The closure receives the current state (or `None` if absent)
/// and returns the next state to persist.
pub fn update_watch_state<F>(
    current: Option<WatchState>,
    updater: F,
) -> crate::error::Result<WatchState>
where
    F: FnOnce(Option<WatchState>) -> crate::error::Result<WatchState>,
{
    updater(current)
}
