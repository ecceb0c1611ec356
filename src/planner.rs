//! The Construction Planner: resolves a query to a
//! template-selection plan, either from explicit use-case hints or
//! from intent keyword matching, falling back to uncertainty
//! reduction when neither yields a match.

use crate::query::QueryEnvelope;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Orientation,
    Agentic,
    Impact,
    Security,
    Compliance,
    Performance,
    Reliability,
    Observability,
    Architecture,
    Edge,
    Release,
    Product,
    Data,
    Behavior,
}

fn domain_templates(domain: Domain) -> &'static [&'static str] {
    match domain {
        Domain::Orientation => &["T1"],
        Domain::Impact => &["T2", "T4", "T5"],
        Domain::Security => &["T4", "T7"],
        Domain::Agentic => &["T3", "T4", "T11"],
        Domain::Compliance => &["T10", "T4"],
        Domain::Performance => &["T2", "T5"],
        Domain::Reliability => &["T4", "T9"],
        Domain::Observability => &["T9"],
        Domain::Architecture => &["T1", "T8"],
        Domain::Edge => &["T4"],
        Domain::Release => &["T6"],
        Domain::Product => &["T1"],
        Domain::Data => &["T7"],
        Domain::Behavior => &["T3"],
    }
}

fn uc_id_to_domain(uc_id: &str) -> Option<Domain> {
    match uc_id {
        id if id.starts_with("ORIENT") => Some(Domain::Orientation),
        id if id.starts_with("AGENT") => Some(Domain::Agentic),
        id if id.starts_with("IMPACT") => Some(Domain::Impact),
        id if id.starts_with("SEC") => Some(Domain::Security),
        id if id.starts_with("COMPLY") || id.starts_with("COMPLIANCE") => Some(Domain::Compliance),
        id if id.starts_with("PERF") => Some(Domain::Performance),
        id if id.starts_with("REL") => Some(Domain::Reliability),
        id if id.starts_with("OBS") => Some(Domain::Observability),
        id if id.starts_with("ARCH") => Some(Domain::Architecture),
        id if id.starts_with("EDGE") => Some(Domain::Edge),
        id if id.starts_with("RELEASE") => Some(Domain::Release),
        id if id.starts_with("PRODUCT") => Some(Domain::Product),
        id if id.starts_with("DATA") => Some(Domain::Data),
        id if id.starts_with("BEHAV") => Some(Domain::Behavior),
        _ => None,
    }
}

const INTENT_KEYWORD_TEMPLATES: &[(&str, &str)] = &[
    ("changed", "T2"),
    ("edit", "T3"),
    ("verify", "T4"),
    ("which tests", "T5"),
    ("bisect", "T6"),
    ("sbom", "T7"),
    ("dependencies", "T7"),
    ("infra", "T8"),
    ("k8s", "T8"),
    ("runbook", "T9"),
    ("compliance", "T10"),
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub template_id: String,
    pub score: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    Uc,
    Intent,
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstructionPlan {
    pub id: String,
    pub template_id: String,
    pub uc_ids: Vec<String>,
    pub intent: String,
    pub source: PlanSource,
    pub created_at: DateTime<Utc>,
    pub ranked_candidates: Vec<RankedCandidate>,
    pub selection_reason: String,
    pub required_maps: Vec<String>,
    pub required_objects: Vec<String>,
    pub required_capabilities: Vec<String>,
    pub disclosures: Vec<String>,
}

pub const FALLBACK_TEMPLATE: &str = "T12";

pub struct ConstructionPlanner;

impl ConstructionPlanner {
    /// `ledger_name` is emitted as a `tool_call` entry named
    /// `construction_plan` when a ledger callback is provided.
    pub fn plan(query: &QueryEnvelope, mut ledger: Option<&mut dyn FnMut(&str)>) -> ConstructionPlan {
        let plan = if let Some(uc) = &query.uc_requirements {
            if !uc.uc_ids.is_empty() {
                Self::plan_from_uc(query, &uc.uc_ids)
            } else {
                Self::plan_from_intent(query)
            }
        } else {
            Self::plan_from_intent(query)
        };

        if let Some(ledger) = ledger.as_mut() {
            ledger("construction_plan");
        }
        plan
    }

    fn plan_from_uc(query: &QueryEnvelope, uc_ids: &[String]) -> ConstructionPlan {
        let mut disclosures = Vec::new();
        let mut domains = Vec::new();
        for uc_id in uc_ids {
            match uc_id_to_domain(uc_id) {
                Some(domain) => domains.push(domain),
                None => disclosures.push("uc_domain_missing".to_string()),
            }
        }
        if domains.iter().collect::<std::collections::HashSet<_>>().len() > 1 {
            disclosures.push("uc_domain_mismatch".to_string());
        }

        let mut candidates: Vec<RankedCandidate> = Vec::new();
        for domain in &domains {
            for (index, template_id) in domain_templates(*domain).iter().enumerate() {
                let specificity = 1.0 / (index as f64 + 1.0);
                let coverage = 1.0;
                let score = coverage + specificity;
                if let Some(existing) = candidates.iter_mut().find(|c| c.template_id == *template_id) {
                    existing.score += score;
                } else {
                    candidates.push(RankedCandidate {
                        template_id: template_id.to_string(),
                        score,
                        reason: format!("uc domain {:?} maps to {}", domain, template_id),
                    });
                }
            }
        }
        candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());

        let template_id = candidates.first().map(|c| c.template_id.clone()).unwrap_or_else(|| FALLBACK_TEMPLATE.to_string());
        ConstructionPlan {
            id: uuid::Uuid::new_v4().to_string(),
            template_id,
            uc_ids: uc_ids.to_vec(),
            intent: query.intent.clone(),
            source: PlanSource::Uc,
            created_at: Utc::now(),
            ranked_candidates: candidates,
            selection_reason: "highest-ranked template across matched UC domains".to_string(),
            required_maps: Vec::new(),
            required_objects: Vec::new(),
            required_capabilities: Vec::new(),
            disclosures,
        }
    }

    fn plan_from_intent(query: &QueryEnvelope) -> ConstructionPlan {
        let lowered = query.intent.to_lowercase();
        let mut candidates: Vec<RankedCandidate> = INTENT_KEYWORD_TEMPLATES
            .iter()
            .filter(|(keyword, _)| lowered.contains(keyword))
            .map(|(keyword, template_id)| RankedCandidate {
                template_id: template_id.to_string(),
                score: keyword.len() as f64,
                reason: format!("intent matched keyword \"{}\"", keyword),
            })
            .collect();
        candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap());

        let (template_id, source, reason) = match candidates.first() {
            Some(top) => (top.template_id.clone(), PlanSource::Intent, "intent keyword match".to_string()),
            None => (FALLBACK_TEMPLATE.to_string(), PlanSource::Fallback, "no UC hints or keyword match".to_string()),
        };

        ConstructionPlan {
            id: uuid::Uuid::new_v4().to_string(),
            template_id,
            uc_ids: Vec::new(),
            intent: query.intent.clone(),
            source,
            created_at: Utc::now(),
            ranked_candidates: candidates,
            selection_reason: reason,
            required_maps: Vec::new(),
            required_objects: Vec::new(),
            required_capabilities: Vec::new(),
            disclosures: Vec::new(),
        }
    }
}
