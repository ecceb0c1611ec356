//! Response Assembler: the final envelope, with
//! geometric-mean total confidence and feedback-token persistence so a
//! process restart can still resolve feedback against packs.

use crate::error::Result;
use crate::escalation::RetrievalStatus;
use crate::model::{ContextPack, FeedbackTokenBinding};
use crate::planner::ConstructionPlan;
use crate::query::QueryEnvelope;
use crate::stage_tracker::StageReport;
use crate::store::KnowledgeStore;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisMode {
    Llm,
    Heuristic,
    Cache,
}

/// Floor applied under the geometric mean so a single near-zero
/// confidence pack cannot collapse the aggregate to zero.
pub const CONFIDENCE_FLOOR: f64 = 0.05;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub query: String,
    pub packs: Vec<ContextPack>,
    pub disclosures: Vec<String>,
    pub trace_id: String,
    pub construction_plan: ConstructionPlan,
    pub total_confidence: f64,
    pub cache_hit: bool,
    pub latency_ms: u64,
    pub version: String,
    pub drill_down_hints: Vec<String>,
    pub coverage_gaps: Vec<String>,
    pub synthesis_mode: SynthesisMode,
    pub retrieval_entropy: f64,
    pub retrieval_status: RetrievalStatus,
    pub retrieval_insufficient: bool,
    pub suggested_clarifying_questions: Vec<String>,
    pub verification_plan: Option<serde_json::Value>,
    pub adequacy: Option<serde_json::Value>,
    pub feedback_token: String,
    pub stage_reports: Vec<StageReport>,
}

/// Geometric mean of pack confidences with a floor, used when the
/// caller hasn't explicitly set `totalConfidence`.
pub fn geometric_mean_confidence(confidences: &[f64]) -> f64 {
    if confidences.is_empty() {
        return CONFIDENCE_FLOOR;
    }
    let product: f64 = confidences.iter().map(|c| c.max(CONFIDENCE_FLOOR)).product();
    product.powf(1.0 / confidences.len() as f64)
}

pub struct ResponseAssembler;

impl ResponseAssembler {
    #[allow(clippy::too_many_arguments)]
    pub fn assemble(
        store: &dyn KnowledgeStore,
        query: &QueryEnvelope,
        packs: Vec<ContextPack>,
        disclosures: Vec<String>,
        construction_plan: ConstructionPlan,
        cache_hit: bool,
        latency_ms: u64,
        version: String,
        synthesis_mode: SynthesisMode,
        retrieval_entropy: f64,
        stage_reports: Vec<StageReport>,
    ) -> Result<ResponseEnvelope> {
        let total_confidence = geometric_mean_confidence(&packs.iter().map(|p| p.confidence).collect::<Vec<_>>());
        let retrieval_status = crate::escalation::retrieval_status(total_confidence, packs.len());
        let retrieval_insufficient = retrieval_status == RetrievalStatus::Insufficient;

        let trace_id = uuid::Uuid::new_v4().to_string();
        let feedback_token = uuid::Uuid::new_v4().to_string();
        let binding = FeedbackTokenBinding {
            feedback_token: feedback_token.clone(),
            pack_ids: packs.iter().map(|p| p.pack_id.clone()).collect(),
        };
        store.set_state(&format!("feedback_token:{}", feedback_token), &serde_json::to_string(&binding)?)?;

        let suggested_clarifying_questions = if retrieval_insufficient {
            vec!["Which file or module should this focus on?".to_string()]
        } else {
            Vec::new()
        };

        Ok(ResponseEnvelope {
            query: query.intent.clone(),
            packs,
            disclosures,
            trace_id,
            construction_plan,
            total_confidence,
            cache_hit,
            latency_ms,
            version,
            drill_down_hints: Vec::new(),
            coverage_gaps: Vec::new(),
            synthesis_mode,
            retrieval_entropy,
            retrieval_status,
            retrieval_insufficient,
            suggested_clarifying_questions,
            verification_plan: None,
            adequacy: None,
            feedback_token,
            stage_reports,
        })
    }

    /// Resolves the pack IDs bound to a feedback token, surviving a
    /// process restart since the binding lives in the store.
    pub fn resolve_feedback_token(store: &dyn KnowledgeStore, feedback_token: &str) -> Result<Option<Vec<String>>> {
        let raw = store.get_state(&format!("feedback_token:{}", feedback_token))?;
        Ok(match raw {
            Some(raw) => Some(serde_json::from_str::<FeedbackTokenBinding>(&raw)?.pack_ids),
            None => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Outcome, PackType};
    use crate::planner::{ConstructionPlanner, PlanSource};
    use crate::query::{Depth, EmbeddingRequirement, Filter, LlmRequirement};
    use crate::store::memory::InMemoryKnowledgeStore;
    use chrono::Utc;

    fn sample_query() -> QueryEnvelope {
        QueryEnvelope {
            intent: "verify the auth flow".into(),
            depth: Depth::L1,
            intent_type: None,
            uc_requirements: None,
            affected_files: vec![],
            working_file: None,
            scope: None,
            filter: Filter::default(),
            llm_requirement: LlmRequirement::Optional,
            embedding_requirement: EmbeddingRequirement::Optional,
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

    fn sample_pack(id: &str, confidence: f64) -> ContextPack {
        ContextPack {
            pack_id: id.into(),
            pack_type: PackType::FunctionContext,
            target_id: "fn1".into(),
            summary: "s".into(),
            key_facts: vec![],
            code_snippets: vec![],
            related_files: vec![],
            confidence,
            created_at: Utc::now(),
            access_count: 0,
            last_outcome: Outcome::Unknown,
            success_count: 0,
            failure_count: 0,
            version: "1".into(),
            invalidation_triggers: vec![],
        }
    }

    #[test]
    fn geometric_mean_of_empty_confidences_is_the_floor() {
        assert_eq!(geometric_mean_confidence(&[]), CONFIDENCE_FLOOR);
    }

    #[test]
    fn geometric_mean_is_pulled_up_by_the_floor_on_near_zero_values() {
        let mean = geometric_mean_confidence(&[0.0, 0.8]);
        assert!(mean > 0.0);
        assert!(mean < 0.8);
    }

    #[test]
    fn assembled_envelope_persists_a_resolvable_feedback_token() {
        let store = InMemoryKnowledgeStore::new();
        let query = sample_query();
        let plan = ConstructionPlanner::plan(&query, None);
        let envelope = ResponseAssembler::assemble(
            &store,
            &query,
            vec![sample_pack("p1", 0.6)],
            vec![],
            plan,
            false,
            12,
            "1.0.0".into(),
            SynthesisMode::Heuristic,
            1.0,
            vec![],
        )
        .unwrap();

        let resolved = ResponseAssembler::resolve_feedback_token(&store, &envelope.feedback_token).unwrap();
        assert_eq!(resolved, Some(vec!["p1".to_string()]));
    }

    #[test]
    fn insufficient_retrieval_status_suggests_a_clarifying_question() {
        let store = InMemoryKnowledgeStore::new();
        let query = sample_query();
        let plan = ConstructionPlanner::plan(&query, None);
        assert_eq!(plan.source, PlanSource::Intent);
        let envelope = ResponseAssembler::assemble(
            &store, &query, vec![], vec![], plan, false, 5, "1.0.0".into(), SynthesisMode::Heuristic, 1.0, vec![],
        )
        .unwrap();
        assert!(envelope.retrieval_insufficient);
        assert!(!envelope.suggested_clarifying_questions.is_empty());
    }
}
