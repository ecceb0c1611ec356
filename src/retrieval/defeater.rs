//! Stage 9: defeater check. Runs staleness, code-change,
//! contradiction, and coverage-gap evaluators over each pack, dropping
//! and marking the stage partial when an evaluator itself fails.

use crate::model::ContextPack;
use crate::stage_tracker::{IssueSeverity, StageIssue};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefeaterKind {
    Staleness,
    CodeChange,
    Contradiction,
    CoverageGap,
}

#[derive(Debug, Clone)]
pub struct DefeaterVerdict {
    pub kind: DefeaterKind,
    pub triggered: bool,
    pub confidence_adjustment: f64,
    pub note: String,
}

pub trait DefeaterEvaluator: Send + Sync {
    fn kind(&self) -> DefeaterKind;
    fn evaluate(&self, pack: &ContextPack) -> Result<DefeaterVerdict, String>;
}

/// Flags packs older than `max_age` as stale.
pub struct StalenessEvaluator {
    pub now: DateTime<Utc>,
    pub max_age: chrono::Duration,
}

impl DefeaterEvaluator for StalenessEvaluator {
    fn kind(&self) -> DefeaterKind {
        DefeaterKind::Staleness
    }

    fn evaluate(&self, pack: &ContextPack) -> Result<DefeaterVerdict, String> {
        let age = self.now.signed_duration_since(pack.created_at);
        let triggered = age > self.max_age;
        Ok(DefeaterVerdict {
            kind: DefeaterKind::Staleness,
            triggered,
            confidence_adjustment: if triggered { -0.1 } else { 0.0 },
            note: if triggered { format!("pack age {}h exceeds staleness window", age.num_hours()) } else { String::new() },
        })
    }
}

/// Flags packs whose related files changed since the pack's stored
/// version fingerprint, via an injected checksum lookup.
pub struct CodeChangeEvaluator<'a> {
    pub current_checksum: &'a (dyn Fn(&str) -> Option<String> + Send + Sync),
}

impl DefeaterEvaluator for CodeChangeEvaluator<'_> {
    fn kind(&self) -> DefeaterKind {
        DefeaterKind::CodeChange
    }

    fn evaluate(&self, pack: &ContextPack) -> Result<DefeaterVerdict, String> {
        let changed = pack.related_files.iter().any(|file| match (self.current_checksum)(file) {
            Some(current) => current != pack.version,
            None => false,
        });
        Ok(DefeaterVerdict {
            kind: DefeaterKind::CodeChange,
            triggered: changed,
            confidence_adjustment: if changed { -0.2 } else { 0.0 },
            note: if changed { "related file checksum diverged from pack version".to_string() } else { String::new() },
        })
    }
}

/// Flags packs whose key facts contradict one another by a caller-
/// supplied contradiction predicate (e.g. against a later-indexed pack).
pub struct ContradictionEvaluator<'a> {
    pub contradicts: &'a (dyn Fn(&ContextPack) -> bool + Send + Sync),
}

impl DefeaterEvaluator for ContradictionEvaluator<'_> {
    fn kind(&self) -> DefeaterKind {
        DefeaterKind::Contradiction
    }

    fn evaluate(&self, pack: &ContextPack) -> Result<DefeaterVerdict, String> {
        let triggered = (self.contradicts)(pack);
        Ok(DefeaterVerdict {
            kind: DefeaterKind::Contradiction,
            triggered,
            confidence_adjustment: if triggered { -0.3 } else { 0.0 },
            note: if triggered { "pack contradicts a newer pack's key facts".to_string() } else { String::new() },
        })
    }
}

/// Flags packs with no code snippets and no key facts as coverage gaps.
pub struct CoverageGapEvaluator;

impl DefeaterEvaluator for CoverageGapEvaluator {
    fn kind(&self) -> DefeaterKind {
        DefeaterKind::CoverageGap
    }

    fn evaluate(&self, pack: &ContextPack) -> Result<DefeaterVerdict, String> {
        let triggered = pack.code_snippets.is_empty() && pack.key_facts.is_empty();
        Ok(DefeaterVerdict {
            kind: DefeaterKind::CoverageGap,
            triggered,
            confidence_adjustment: if triggered { -0.05 } else { 0.0 },
            note: if triggered { "pack carries no snippets or key facts".to_string() } else { String::new() },
        })
    }
}

/// Runs every evaluator over every pack, applying the cumulative
/// confidence adjustment (re-clamped into the pack invariant range).
/// An evaluator that returns `Err` drops that evaluator's verdict for
/// that pack and queues a `Moderate` issue rather than failing the pack.
pub fn run_defeaters(packs: Vec<ContextPack>, evaluators: &[Box<dyn DefeaterEvaluator + '_>]) -> (Vec<ContextPack>, Vec<StageIssue>) {
    let mut issues = Vec::new();
    let mut adjusted = Vec::with_capacity(packs.len());

    for mut pack in packs {
        let mut total_adjustment = 0.0;
        for evaluator in evaluators {
            match evaluator.evaluate(&pack) {
                Ok(verdict) => {
                    if verdict.triggered {
                        total_adjustment += verdict.confidence_adjustment;
                    }
                }
                Err(message) => {
                    issues.push(StageIssue {
                        severity: IssueSeverity::Moderate,
                        message: format!("defeater evaluator {:?} failed for pack {}: {}", evaluator.kind(), pack.pack_id, message),
                    });
                }
            }
        }
        pack.confidence = ContextPack::clamp_confidence(pack.confidence + total_adjustment);
        adjusted.push(pack);
    }

    (adjusted, issues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Outcome, PackType};

    fn pack(confidence: f64, age_hours: i64) -> ContextPack {
        ContextPack {
            pack_id: "p1".into(),
            pack_type: PackType::FunctionContext,
            target_id: "fn1".into(),
            summary: "s".into(),
            key_facts: vec!["fact".into()],
            code_snippets: vec![],
            related_files: vec!["src/lib.rs".into()],
            confidence,
            created_at: Utc::now() - chrono::Duration::hours(age_hours),
            access_count: 0,
            last_outcome: Outcome::Unknown,
            success_count: 0,
            failure_count: 0,
            version: "abc".into(),
            invalidation_triggers: vec![],
        }
    }

    #[test]
    fn staleness_evaluator_penalizes_packs_older_than_the_window() {
        let evaluator = StalenessEvaluator { now: Utc::now(), max_age: chrono::Duration::hours(24) };
        let verdict = evaluator.evaluate(&pack(0.8, 48)).unwrap();
        assert!(verdict.triggered);
        assert!(verdict.confidence_adjustment < 0.0);
    }

    #[test]
    fn code_change_evaluator_triggers_on_checksum_divergence() {
        let lookup = |_: &str| Some("different".to_string());
        let evaluator = CodeChangeEvaluator { current_checksum: &lookup };
        let verdict = evaluator.evaluate(&pack(0.8, 0)).unwrap();
        assert!(verdict.triggered);
    }

    #[test]
    fn coverage_gap_evaluator_triggers_when_pack_has_no_evidence() {
        let mut bare = pack(0.8, 0);
        bare.key_facts.clear();
        let verdict = CoverageGapEvaluator.evaluate(&bare).unwrap();
        assert!(verdict.triggered);
    }

    #[test]
    fn cumulative_adjustments_stay_within_the_pack_confidence_invariant() {
        let evaluators: Vec<Box<dyn DefeaterEvaluator + '_>> = vec![
            Box::new(StalenessEvaluator { now: Utc::now(), max_age: chrono::Duration::hours(1) }),
            Box::new(CodeChangeEvaluator { current_checksum: &|_| Some("different".to_string()) }),
            Box::new(ContradictionEvaluator { contradicts: &|_| true }),
        ];
        let (adjusted, _issues) = run_defeaters(vec![pack(0.2, 100)], &evaluators);
        assert!(adjusted[0].confidence >= crate::model::MIN_PACK_CONFIDENCE);
    }

    #[test]
    fn untriggered_defeaters_leave_confidence_unchanged() {
        let lookup = |_: &str| None;
        let evaluators: Vec<Box<dyn DefeaterEvaluator + '_>> = vec![Box::new(CodeChangeEvaluator { current_checksum: &lookup })];
        let (adjusted, issues) = run_defeaters(vec![pack(0.8, 0)], &evaluators);
        assert_eq!(adjusted[0].confidence, 0.8);
        assert!(issues.is_empty());
    }
}
