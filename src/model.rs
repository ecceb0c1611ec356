//! Persistent data model: version descriptor, knowledge graph
//! records, context packs, and the small set of identifiers threaded
//! through every component.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Index quality tier. `Full` indexes carry embeddings and graph edges;
/// `Mvp` indexes may be lexical-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Mvp,
    Full,
}

/// Identifies the index build that produced the records a query reads.
/// A change in `major`, `minor`, `quality_tier`, or `indexer_version`
/// invalidates every cached query and forces re-bootstrap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionDescriptor {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub indexed_at: DateTime<Utc>,
    pub quality_tier: QualityTier,
    pub indexer_version: String,
    pub features: Vec<String>,
}

impl VersionDescriptor {
    /// The subset of fields that affect retrieval and therefore
    /// participate in the cache key: `major.minor.qualityTier.indexerVersion`.
    pub fn cache_fingerprint(&self) -> String {
        let tier = match self.quality_tier {
            QualityTier::Mvp => "mvp",
            QualityTier::Full => "full",
        };
        format!("{}.{}.{}.{}", self.major, self.minor, tier, self.indexer_version)
    }

    /// Whether moving from `old` to `self` must invalidate all cached
    /// queries and force re-bootstrap.
    pub fn invalidates(&self, old: &VersionDescriptor) -> bool {
        self.major != old.major
            || self.minor != old.minor
            || self.quality_tier != old.quality_tier
            || self.indexer_version != old.indexer_version
    }
}

/// Accumulated success/failure counters behind a function's confidence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutcomeHistory {
    pub successes: u64,
    pub failures: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionRecord {
    pub id: String,
    pub file_path: String,
    pub name: String,
    pub signature: String,
    pub purpose: String,
    pub start_line: u32,
    pub end_line: u32,
    pub confidence: f64,
    pub access_count: u64,
    pub last_accessed: Option<DateTime<Utc>>,
    pub validation_count: u64,
    pub outcome_history: OutcomeHistory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleRecord {
    pub id: String,
    pub path: String,
    pub purpose: String,
    pub exports: Vec<String>,
    pub dependencies: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub path: String,
    pub relative_path: String,
    pub name: String,
    pub extension: String,
    pub category: String,
    pub purpose: String,
    pub role: String,
    pub summary: String,
    pub key_exports: Vec<String>,
    pub line_count: u32,
    pub function_count: u32,
    pub import_count: u32,
    pub imports: Vec<String>,
    pub imported_by: Vec<String>,
    pub directory: String,
    pub complexity: f64,
    pub has_tests: bool,
    pub checksum: String,
    pub confidence: f64,
    pub last_indexed: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

/// The entity kinds a knowledge graph edge or a context pack's target can
/// reference. A closed tagged variant rather than a string discriminant,
/// so post-processing can match exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Function,
    Module,
    File,
    Pack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    CoChanged,
    PartOf,
    ReturnsSchema,
    DependsOn,
    Semantic,
}

/// A directional knowledge graph edge. Co-change edges are
/// symmetric by convention but stored both directions explicitly so
/// lookups stay O(1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEdge {
    pub id: String,
    pub source_id: String,
    pub source_type: EntityType,
    pub target_id: String,
    pub target_type: EntityType,
    pub edge_type: EdgeType,
    pub weight: f64,
    pub confidence: f64,
    pub metadata: serde_json::Value,
    pub computed_at: DateTime<Utc>,
}

/// The closed set of context pack kinds a template producer may emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackType {
    FunctionContext,
    ModuleContext,
    DocContext,
    CallFlow,
    ChangeImpact,
    PatternContext,
    ProjectUnderstanding,
    RelatedFunction,
    TestContext,
}

impl PackType {
    /// The `packType -> evidenceEntityType` mapping used by
    /// post-processing. `None` means the pack type carries no single
    /// backing entity (e.g. a synthesized test narrative).
    pub fn evidence_entity_type(self) -> Option<EntityType> {
        match self {
            PackType::FunctionContext => Some(EntityType::Function),
            PackType::ModuleContext => Some(EntityType::Module),
            PackType::DocContext => Some(EntityType::Module),
            PackType::CallFlow => Some(EntityType::Function),
            PackType::ChangeImpact => Some(EntityType::File),
            PackType::PatternContext => Some(EntityType::Pack),
            PackType::ProjectUnderstanding => None,
            PackType::RelatedFunction => Some(EntityType::Function),
            PackType::TestContext => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeSnippet {
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub language: String,
    pub content: String,
}

/// The atomic retrieval unit. `confidence` is clamped to
/// `[0.1, 0.95]` on every write that follows the initial creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextPack {
    pub pack_id: String,
    pub pack_type: PackType,
    pub target_id: String,
    pub summary: String,
    pub key_facts: Vec<String>,
    pub code_snippets: Vec<CodeSnippet>,
    pub related_files: Vec<String>,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    pub access_count: u64,
    pub last_outcome: Outcome,
    pub success_count: u64,
    pub failure_count: u64,
    pub version: String,
    pub invalidation_triggers: Vec<String>,
}

pub const MIN_PACK_CONFIDENCE: f64 = 0.1;
pub const MAX_PACK_CONFIDENCE: f64 = 0.95;

impl ContextPack {
    /// Clamp confidence into the pack invariant range. Every feedback
    /// update and every deserialization path must route through this so
    /// the `0.1 <= confidence <= 0.95` invariant always holds.
    pub fn clamp_confidence(value: f64) -> f64 {
        value.clamp(MIN_PACK_CONFIDENCE, MAX_PACK_CONFIDENCE)
    }
}

/// A persistent (not code-affecting) ingestion item, e.g. file ownership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnershipPayload {
    pub path: String,
    pub primary_owner: Option<String>,
    pub contributors: Vec<String>,
    pub last_touched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionItem {
    pub id: String,
    pub payload: serde_json::Value,
}

impl IngestionItem {
    pub fn ownership(path: &str, payload: OwnershipPayload) -> Self {
        IngestionItem {
            id: format!("ownership:{}", path),
            payload: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        }
    }
}

/// Binding persisted so a process restart can still resolve feedback
/// submitted against a token issued before the restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackTokenBinding {
    pub feedback_token: String,
    pub pack_ids: Vec<String>,
}

/// One line of the append-only retrieval confidence/escalation log.
/// Field names are snake_case on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalLogRecord {
    pub query_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    pub confidence_score: f64,
    pub retrieval_entropy: f64,
    pub returned_pack_ids: Vec<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routed_strategy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_depth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_depth: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalation_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_escalation_depth: Option<u32>,
}

/// Aggregate counts exposed by `KnowledgeStore::get_stats`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreStats {
    pub functions: u64,
    pub modules: u64,
    pub files: u64,
    pub packs: u64,
    pub edges: u64,
    pub cache_entries: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreMetadata {
    pub workspace: Option<String>,
    pub last_indexing: Option<DateTime<Utc>>,
}

/// Helper used throughout the retrieval engine: a bag of per-entity
/// signal values keyed by dimension name.
pub type SignalMap = HashMap<String, f64>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_invalidates_on_major_minor_tier_or_indexer_change() {
        let base = VersionDescriptor {
            major: 1,
            minor: 0,
            patch: 0,
            indexed_at: Utc::now(),
            quality_tier: QualityTier::Full,
            indexer_version: "v1".into(),
            features: vec![],
        };
        let mut other = base.clone();
        other.patch = 7;
        assert!(!other.invalidates(&base), "patch alone must not invalidate");

        other.minor = 1;
        assert!(other.invalidates(&base));

        let mut tier_change = base.clone();
        tier_change.quality_tier = QualityTier::Mvp;
        assert!(tier_change.invalidates(&base));
    }

    #[test]
    fn pack_confidence_always_clamps_into_bounds() {
        assert_eq!(ContextPack::clamp_confidence(-5.0), MIN_PACK_CONFIDENCE);
        assert_eq!(ContextPack::clamp_confidence(5.0), MAX_PACK_CONFIDENCE);
        assert_eq!(ContextPack::clamp_confidence(0.5), 0.5);
    }

    #[test]
    fn evidence_entity_type_mapping_covers_each_pack_type() {
        assert_eq!(
            PackType::FunctionContext.evidence_entity_type(),
            Some(EntityType::Function)
        );
        assert_eq!(PackType::ModuleContext.evidence_entity_type(), Some(EntityType::Module));
        assert_eq!(PackType::DocContext.evidence_entity_type(), Some(EntityType::Module));
        assert_eq!(PackType::TestContext.evidence_entity_type(), None);
    }
}
