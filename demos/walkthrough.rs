//! End-to-end walkthrough: seed a bootstrapped in-memory store with one
//! context pack, run a query through the full pipeline, resolve the
//! feedback token, and submit relevance feedback against it.
//!
//! Run with: `cargo run --example walkthrough`

use chrono::Utc;
use librarian_retrieval::model::{ContextPack, Outcome, PackType, QualityTier, VersionDescriptor};
use librarian_retrieval::providers::HashEmbeddingProvider;
use librarian_retrieval::query::{Depth, EmbeddingRequirement, Filter, FeedbackSubmission, LlmRequirement, QueryEnvelope, RelevanceRating};
use librarian_retrieval::store::memory::InMemoryKnowledgeStore;
use librarian_retrieval::{feedback, freshness::NoopArtifactRecovery, response::ResponseAssembler, watch, KnowledgeStore, QueryPipeline};

struct AlwaysEqualProbe;

impl watch::GitCursorProbe for AlwaysEqualProbe {
    fn current_head(&self) -> librarian_retrieval::Result<String> {
        Ok("abc123".to_string())
    }

    fn relation(&self, _indexed: &str, _head: &str) -> librarian_retrieval::Result<watch::GitRelation> {
        Ok(watch::GitRelation::Equal)
    }
}

fn seed_bootstrap(store: &InMemoryKnowledgeStore) {
    store.set_state("index_coordination_version", "v1").unwrap();
    let consistency = watch::BootstrapConsistencyState {
        kind: watch::BootstrapConsistencyState::KIND.into(),
        schema_version: 1,
        workspace: "/ws".into(),
        generation_id: "gen-1".into(),
        status: watch::BootstrapStatus::Complete,
        started_at: Utc::now(),
        updated_at: Utc::now(),
        completed_at: Some(Utc::now()),
        artifacts: watch::BootstrapArtifacts {
            librarian: watch::ArtifactEvidence { path: "librarian.sqlite".into(), exists: true, size_bytes: None, mtime_ms: None },
            knowledge: watch::ArtifactEvidence { path: "knowledge.db".into(), exists: true, size_bytes: None, mtime_ms: None },
            evidence: watch::ArtifactEvidence { path: "evidence_ledger.db".into(), exists: true, size_bytes: None, mtime_ms: None },
        },
    };
    store.set_state("bootstrap_consistency", &serde_json::to_string(&consistency).unwrap()).unwrap();
    let watch_state = watch::WatchState {
        schema_version: 1,
        workspace_root: "/ws".into(),
        watch_last_heartbeat_at: Some(Utc::now()),
        suspected_dead: Some(false),
        needs_catchup: false,
        storage_attached: Some(true),
        cursor: watch::Cursor::Git { last_indexed_commit_sha: Some("abc123".into()) },
    };
    store.set_state("watch_state", &serde_json::to_string(&watch_state).unwrap()).unwrap();
}

#[tokio::main]
async fn main() {
    let store = InMemoryKnowledgeStore::new();
    seed_bootstrap(&store);

    store
        .upsert_pack(ContextPack {
            pack_id: "pack-auth-1".into(),
            pack_type: PackType::FunctionContext,
            target_id: "fn:authenticate".into(),
            summary: "authenticate() validates the bearer token and loads the session.".into(),
            key_facts: vec!["rejects expired tokens".into(), "logs failed attempts".into()],
            code_snippets: vec![],
            related_files: vec!["src/auth.rs".into()],
            confidence: 0.55,
            created_at: Utc::now(),
            access_count: 0,
            last_outcome: Outcome::Unknown,
            success_count: 0,
            failure_count: 0,
            version: "1".into(),
            invalidation_triggers: vec![],
        })
        .unwrap();

    let embeddings = HashEmbeddingProvider::new(32);
    let probe = AlwaysEqualProbe;
    let recovery = NoopArtifactRecovery;
    let pipeline = QueryPipeline::new(&store, &embeddings, None, &probe, &recovery, "/ws");

    let query = QueryEnvelope {
        intent: "how does authentication work".into(),
        depth: Depth::L1,
        intent_type: None,
        uc_requirements: None,
        affected_files: vec!["src/auth.rs".into()],
        working_file: None,
        scope: None,
        filter: Filter::default(),
        llm_requirement: LlmRequirement::Optional,
        embedding_requirement: EmbeddingRequirement::Disabled,
        hyde_expansion: false,
        diversify: false,
        diversity_lambda: None,
        disable_cache: false,
        disable_method_guidance: true,
        force_summary_synthesis: true,
        show_llm_errors: false,
        timeout_ms: None,
    };
    let version = VersionDescriptor {
        major: 1,
        minor: 0,
        patch: 0,
        indexed_at: Utc::now(),
        quality_tier: QualityTier::Full,
        indexer_version: "v1".into(),
        features: vec![],
    };

    let response = pipeline.run(&query, &version, None).await.expect("query should be served");
    println!("total confidence: {:.4}", response.total_confidence);
    println!("retrieval status: {:?}", response.retrieval_status);
    println!("packs returned: {}", response.packs.len());
    println!("feedback token: {}", response.feedback_token);

    let resolved_pack_ids = ResponseAssembler::resolve_feedback_token(&store, &response.feedback_token)
        .unwrap()
        .expect("feedback token should resolve");
    println!("token resolves to packs: {:?}", resolved_pack_ids);

    let submission = FeedbackSubmission {
        query_id: response.trace_id.clone(),
        relevance_ratings: vec![RelevanceRating {
            pack_id: "pack-auth-1".into(),
            relevant: true,
            usefulness: Some(0.9),
        }],
        timestamp: Utc::now(),
    };
    let result = feedback::apply_feedback(&store, &submission).unwrap();
    println!("feedback applied: {} adjustment(s), {} gap(s) logged", result.adjustments_applied, result.gaps_logged);

    let updated = store.get_pack("pack-auth-1").unwrap().expect("pack still present");
    println!("pack confidence after feedback: {:.4}", updated.confidence);

    let replay = feedback::apply_feedback(&store, &submission).unwrap();
    println!("replaying the same submission applies {} more adjustment(s)", replay.adjustments_applied);
}
