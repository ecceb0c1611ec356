//! The Retrieval Engine: the twelve-stage pipeline plus
//! the `QueryPipeline` orchestrator that wires the Freshness Gate,
//! Construction Planner, Query Cache, the stages themselves, the
//! Escalation Controller, and the Response Assembler together.

pub mod adequacy;
pub mod defeater;
pub mod direct;
pub mod fallback;
pub mod graph;
pub mod guidance;
pub mod postprocess;
pub mod rerank;
pub mod semantic;
pub mod signals;
pub mod synthesis;
pub mod vector_bias;

use crate::cache::{build_cache_key, CacheLookup, QueryCache};
use crate::error::{Error, Result};
use crate::escalation::{decide_escalation, retrieval_entropy, EscalationInput};
use crate::model::{ContextPack, EntityType, VersionDescriptor};
use crate::planner::ConstructionPlanner;
use crate::providers::{EmbeddingProvider, LlmProvider};
use crate::query::{Depth, LlmRequirement, QueryEnvelope};
use crate::response::{ResponseAssembler, ResponseEnvelope, SynthesisMode};
use crate::stage_tracker::StageTracker;
use crate::store::KnowledgeStore;
use crate::watch::GitCursorProbe;
use signals::{CandidateObservation, ScoredCandidate};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use self::defeater::{CodeChangeEvaluator, CoverageGapEvaluator, DefeaterEvaluator, StalenessEvaluator};
use crate::freshness::{ArtifactRecovery, FreshnessGate};

/// The collaborators a single query run needs beyond the store itself.
pub struct QueryPipeline<'a> {
    pub store: &'a dyn KnowledgeStore,
    pub embeddings: &'a dyn EmbeddingProvider,
    pub llm: Option<&'a dyn LlmProvider>,
    pub git_probe: &'a dyn GitCursorProbe,
    pub recovery: &'a dyn ArtifactRecovery,
    pub workspace_root: PathBuf,
}

fn depth_hops(depth: Depth) -> u32 {
    depth.as_index() as u32
}

impl<'a> QueryPipeline<'a> {
    pub fn new(
        store: &'a dyn KnowledgeStore,
        embeddings: &'a dyn EmbeddingProvider,
        llm: Option<&'a dyn LlmProvider>,
        git_probe: &'a dyn GitCursorProbe,
        recovery: &'a dyn ArtifactRecovery,
        workspace_root: impl AsRef<Path>,
    ) -> Self {
        QueryPipeline { store, embeddings, llm, git_probe, recovery, workspace_root: workspace_root.as_ref().to_path_buf() }
    }

    /// Runs the full query lifecycle: freshness check, construction
    /// planning, cache lookup, the retrieval stages (escalating up to
    /// `resolve_max_depth`'s bound), and response assembly.
    pub async fn run(&self, query: &QueryEnvelope, version: &VersionDescriptor, max_depth_override: Option<u8>) -> Result<ResponseEnvelope> {
        let gate = FreshnessGate::new(self.store, self.git_probe, self.recovery);
        let verdict = gate.is_bootstrap_required(&self.workspace_root)?;
        if verdict.required {
            return Err(Error::BootstrapRequired(verdict.reason));
        }

        // Disclosures that belong to this call regardless of whether the
        // retrieval stages themselves run or a cached result is hydrated.
        let mut call_disclosures = verdict.disclosures.clone();
        if self.llm.is_none() {
            call_disclosures.push("replay_unavailable".to_string());
        }

        let plan = ConstructionPlanner::plan(query, None);
        call_disclosures.extend(plan.disclosures.clone());

        let retrieval_kind = if query.hyde_expansion { "hyde" } else { "direct" };
        let cache = QueryCache::new(self.store);
        let cache_key = build_cache_key(query, version, retrieval_kind);

        if !query.disable_cache {
            if let CacheLookup::Hit { response, .. } = cache.get(&cache_key)? {
                let cached: ResponseEnvelope = serde_json::from_str(&response)?;
                let mut disclosures = call_disclosures.clone();
                for disclosure in cached.disclosures {
                    if disclosure.starts_with("llm_error:") && !query.show_llm_errors {
                        continue;
                    }
                    if !disclosures.contains(&disclosure) {
                        disclosures.push(disclosure);
                    }
                }
                return ResponseAssembler::assemble(
                    self.store,
                    query,
                    cached.packs,
                    disclosures,
                    plan,
                    true,
                    0,
                    version.cache_fingerprint(),
                    SynthesisMode::Cache,
                    cached.retrieval_entropy,
                    cached.stage_reports,
                );
            }
        }

        let retrieval_config = crate::config::RetrievalConfig::load(&self.workspace_root);
        let max_depth = crate::escalation::resolve_max_depth(max_depth_override, retrieval_config.max_escalation_depth.map(|v| v.min(8) as u8));
        let mut depth = query.depth;
        let mut attempts = 0u32;
        let mut last_run = self.execute_at_depth(query, depth).await?;

        loop {
            let confidences: Vec<f64> = last_run.packs.iter().map(|p| p.confidence).collect();
            let entropy = retrieval_entropy(&confidences);
            let total_confidence = crate::response::geometric_mean_confidence(&confidences);
            let decision = decide_escalation(EscalationInput {
                depth,
                total_confidence,
                entropy,
                attempts,
                max_depth,
                pack_count: last_run.packs.len(),
            });

            if !decision.escalate || attempts >= 3 {
                break;
            }
            attempts += 1;
            depth = decision.next_depth;
            last_run = self.execute_at_depth(query, depth).await?;
        }

        let confidences: Vec<f64> = last_run.packs.iter().map(|p| p.confidence).collect();
        let entropy = retrieval_entropy(&confidences);

        for disclosure in last_run.disclosures {
            if !call_disclosures.contains(&disclosure) {
                call_disclosures.push(disclosure);
            }
        }

        let envelope = ResponseAssembler::assemble(
            self.store,
            query,
            last_run.packs,
            call_disclosures,
            plan,
            false,
            0,
            version.cache_fingerprint(),
            last_run.synthesis_mode,
            entropy,
            last_run.stage_reports,
        )?;

        if !query.disable_cache {
            let serialized = serde_json::to_string(&envelope)?;
            cache.put(&cache_key, &query.intent, &serialized)?;
        }

        self.store.append_query_access_log(crate::store::QueryAccessLog {
            query_hash: cache_key,
            normalized_intent: crate::cache::normalize::normalize_intent(&query.intent).join(" "),
            returned_pack_ids: envelope.packs.iter().map(|p| p.pack_id.clone()).collect(),
            at: chrono::Utc::now(),
        })?;

        Ok(envelope)
    }

    async fn execute_at_depth(&self, query: &QueryEnvelope, depth: Depth) -> Result<StageRun> {
        let mut tracker = StageTracker::new();
        let mut disclosures = Vec::new();

        let report = adequacy::scan(&query.intent, &query.affected_files);
        tracker.run_stage("adequacy_scan", 1, report.target_files.len(), 0, None, Vec::new(), None);
        if report.coverage_gap {
            disclosures.push("adequacy_coverage_gap".to_string());
        }

        let direct = direct::direct_packs(self.store, &query.intent, &report.target_files)?;
        tracker.run_stage("direct_packs", report.target_files.len(), direct.len(), 0, None, Vec::new(), None);

        let window = semantic::candidate_window(depth);
        let is_meta = report.classes.contains(&adequacy::QueryClass::Meta);
        let mut semantic_fused: Vec<(String, f64)> = Vec::new();
        if query.embedding_requirement != crate::query::EmbeddingRequirement::Disabled {
            let embedding_keys = self.store.list_embedding_keys()?;
            let mut candidates = Vec::new();
            for key in &embedding_keys {
                if let Some(vector) = self.store.get_embedding(key)? {
                    candidates.push((key.clone(), vector));
                }
            }
            if !candidates.is_empty() {
                match semantic::semantic_retrieval(self.embeddings, self.llm, &candidates, &query.intent, depth, is_meta, query.hyde_expansion).await {
                    Ok(fused) => semantic_fused = fused,
                    Err(err) => disclosures.push(err.disclosure_tag()),
                }
            }
        }
        tracker.run_stage(
            "semantic_retrieval",
            semantic_fused.len(),
            semantic_fused.len(),
            0,
            Some(serde_json::json!({"window": window.non_meta.max(window.meta)})),
            Vec::new(),
            None,
        );

        let mut seeds: Vec<String> = direct.iter().map(|p| p.target_id.clone()).collect();
        seeds.extend(semantic_fused.iter().map(|(id, _)| id.clone()));
        let expanded = graph::expand(self.store, &seeds, depth_hops(depth), &|id| id.contains("test"))?;
        tracker.run_stage("graph_expansion", seeds.len(), expanded.len(), 0, None, Vec::new(), None);

        let mut observations = Vec::new();
        for pack in &direct {
            let mut signals = HashMap::new();
            signals.insert("directMatch".to_string(), 1.0);
            observations.push(CandidateObservation { entity_type: EntityType::Pack, entity_id: pack.pack_id.clone(), signals });
        }
        for (id, score) in &semantic_fused {
            let mut signals = HashMap::new();
            signals.insert("semanticSimilarity".to_string(), *score);
            observations.push(CandidateObservation { entity_type: EntityType::Pack, entity_id: id.clone(), signals });
        }
        for node in &expanded {
            let mut signals = HashMap::new();
            signals.insert("graphProximity".to_string(), 1.0 / (1.0 + node.hop_distance as f64));
            observations.push(CandidateObservation { entity_type: EntityType::Function, entity_id: node.entity_id.clone(), signals });
        }
        let merged = signals::merge(observations);
        tracker.run_stage("multi_signal_scoring", observations_len_hint(&direct, &semantic_fused, &expanded), merged.len(), 0, None, Vec::new(), None);

        let profile = vector_bias::derive_bias_profile(&report.classes);
        let mut biased: Vec<ScoredCandidate> = merged;
        vector_bias::apply_bias(&mut biased, profile, &[]);
        tracker.run_stage("multi_vector_scoring", biased.len(), biased.len(), 0, None, Vec::new(), None);

        let mut packs = direct;
        let confidences: Vec<f64> = packs.iter().map(|p| p.confidence).collect();
        let before = packs.len();
        if fallback::should_trigger_fallback(packs.len(), &confidences) {
            let existing: std::collections::HashSet<String> = packs.iter().map(|p| p.pack_id.clone()).collect();
            let materialized = fallback::materialize_fallback(self.store.list_packs()?, &query.intent, depth);
            packs.extend(materialized.into_iter().filter(|p| !existing.contains(&p.pack_id)));
        }
        tracker.run_stage("fallback", before, packs.len(), 0, None, Vec::new(), None);

        let rerank_window = window.rerank;
        let (mut packs, rerank_telemetry, rerank_issues) = match self.llm {
            Some(llm) if rerank_window > 0 && query.llm_requirement != LlmRequirement::Disabled => {
                let ids: Vec<String> = packs.iter().map(|p| p.pack_id.clone()).collect();
                let (reordered, telemetry, issues) = rerank::rerank(llm, &query.intent, ids, rerank_window).await?;
                let by_id: HashMap<String, ContextPack> = packs.into_iter().map(|p| (p.pack_id.clone(), p)).collect();
                let reranked: Vec<ContextPack> = reordered.into_iter().filter_map(|id| by_id.get(&id).cloned()).collect();
                (reranked, telemetry, issues)
            }
            Some(_) => {
                let reason = if rerank_window == 0 { "depth_profile_disabled" } else { "llm_requirement_disabled" };
                let telemetry = rerank::RerankTelemetry {
                    rerank_window,
                    rerank_input_count: packs.len(),
                    rerank_applied_count: 0,
                    rerank_skip_reason: Some(reason.to_string()),
                };
                (packs, telemetry, Vec::new())
            }
            None => {
                let telemetry = rerank::RerankTelemetry {
                    rerank_window,
                    rerank_input_count: packs.len(),
                    rerank_applied_count: 0,
                    rerank_skip_reason: Some("no_llm_provider".to_string()),
                };
                (packs, telemetry, Vec::new())
            }
        };

        if query.diversify && packs.len() > 1 {
            let by_id: HashMap<String, ContextPack> = packs.iter().map(|p| (p.pack_id.clone(), p.clone())).collect();
            let ids: Vec<String> = packs.iter().map(|p| p.pack_id.clone()).collect();
            let relevance: Vec<f64> = packs.iter().map(|p| p.confidence).collect();
            let similarity = |a: &str, b: &str| pack_content_similarity(&by_id, a, b);
            let diversified = rerank::mmr_diversify(&ids, &relevance, &similarity, query.diversity_lambda());
            packs = diversified.into_iter().filter_map(|id| by_id.get(&id).cloned()).collect();
        }

        tracker.run_stage(
            "reranking",
            rerank_telemetry.rerank_input_count,
            packs.len(),
            0,
            Some(serde_json::json!({
                "rerankWindow": rerank_telemetry.rerank_window,
                "rerankInputCount": rerank_telemetry.rerank_input_count,
                "rerankAppliedCount": rerank_telemetry.rerank_applied_count,
                "rerankSkipReason": rerank_telemetry.rerank_skip_reason,
            })),
            rerank_issues,
            None,
        );

        let checksum_lookup = |path: &str| self.store.get_file_checksum(path).ok().flatten();
        let evaluators: Vec<Box<dyn DefeaterEvaluator + '_>> = vec![
            Box::new(StalenessEvaluator { now: chrono::Utc::now(), max_age: chrono::Duration::days(30) }),
            Box::new(CodeChangeEvaluator { current_checksum: &checksum_lookup }),
            Box::new(CoverageGapEvaluator),
        ];
        let before = packs.len();
        let (packs_after_defeat, defeater_issues) = defeater::run_defeaters(packs, &evaluators);
        packs = packs_after_defeat;
        tracker.run_stage("defeater_check", before, packs.len(), 0, None, defeater_issues, None);

        let (guidance, guidance_issues) = guidance::guide(self.llm, &query.intent, query.disable_method_guidance).await;
        tracker.run_stage(
            "method_guidance",
            1,
            if guidance.skipped { 0 } else { 1 },
            0,
            Some(serde_json::json!({"hint": guidance.hint})),
            guidance_issues,
            None,
        );

        let (synthesis_outcome, synthesis_issues) =
            synthesis::synthesize(self.llm, &packs, &query.intent, query.force_summary_synthesis, query.show_llm_errors).await;
        tracker.run_stage("synthesis", packs.len(), 1, 0, None, synthesis_issues, None);
        if let Some(err) = &synthesis_outcome.llm_error {
            disclosures.push(format!("llm_error: {}", err));
        }

        let before = packs.len();
        packs = postprocess::dedupe_preserve_order(packs);
        tracker.run_stage("post_processing", before, packs.len(), before.saturating_sub(packs.len()), None, Vec::new(), None);

        tracker.finalize_missing();

        Ok(StageRun { packs, disclosures, synthesis_mode: synthesis_outcome.mode, stage_reports: tracker.reports() })
    }
}

fn observations_len_hint(direct: &[ContextPack], semantic: &[(String, f64)], expanded: &[graph::ExpandedNode]) -> usize {
    direct.len() + semantic.len() + expanded.len()
}

/// Jaccard similarity over each pack's summary/key-fact tokens, used as
/// the MMR redundancy signal when two packs are about to be compared.
/// Packs sharing a related file are boosted toward maximal redundancy
/// since they are very likely to restate the same context.
fn pack_content_similarity(by_id: &HashMap<String, ContextPack>, a: &str, b: &str) -> f64 {
    let (Some(pack_a), Some(pack_b)) = (by_id.get(a), by_id.get(b)) else {
        return 0.0;
    };
    if pack_a.related_files.iter().any(|f| pack_b.related_files.contains(f)) {
        return 1.0;
    }

    let tokenize = |pack: &ContextPack| {
        let joined = format!("{} {}", pack.summary, pack.key_facts.join(" "));
        crate::cache::normalize::normalize_intent(&joined).into_iter().collect::<std::collections::HashSet<_>>()
    };
    let tokens_a = tokenize(pack_a);
    let tokens_b = tokenize(pack_b);
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }
    let intersection = tokens_a.intersection(&tokens_b).count() as f64;
    let union = tokens_a.union(&tokens_b).count() as f64;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

struct StageRun {
    packs: Vec<ContextPack>,
    disclosures: Vec<String>,
    synthesis_mode: SynthesisMode,
    stage_reports: Vec<crate::stage_tracker::StageReport>,
}
