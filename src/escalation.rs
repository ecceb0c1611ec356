//! Escalation Controller: retrieval entropy over final
//! pack confidences, status bucketing, and the escalation decision
//! rules that may re-enter the pipeline at a higher depth.

use crate::query::Depth;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStatus {
    Sufficient,
    Partial,
    Insufficient,
}

/// Shannon entropy over pack confidences normalized to a probability
/// distribution. Empty input returns `log2(10)`.
pub fn retrieval_entropy(confidences: &[f64]) -> f64 {
    if confidences.is_empty() {
        return (10f64).log2();
    }
    let total: f64 = confidences.iter().sum();
    if total <= 0.0 {
        return (10f64).log2();
    }
    -confidences
        .iter()
        .map(|c| {
            let p = c / total;
            if p <= 0.0 {
                0.0
            } else {
                p * p.log2()
            }
        })
        .sum::<f64>()
}

pub fn retrieval_status(total_confidence: f64, pack_count: usize) -> RetrievalStatus {
    if total_confidence >= 0.7 && pack_count >= 1 {
        RetrievalStatus::Sufficient
    } else if total_confidence >= 0.4 {
        RetrievalStatus::Partial
    } else {
        RetrievalStatus::Insufficient
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EscalationInput {
    pub depth: Depth,
    pub total_confidence: f64,
    pub entropy: f64,
    pub attempts: u32,
    pub max_depth: Depth,
    pub pack_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EscalationDecision {
    pub escalate: bool,
    pub next_depth: Depth,
    pub expand_query: bool,
    pub reason: String,
}

/// Resolves the effective max escalation depth: explicit override ->
/// config value -> default 2, clamped to `[0,8]`. Depth only
/// spans `[0,3]` in this crate's `Depth` enum, so the clamp bounds the
/// raw config value before it is translated into a `Depth`.
pub fn resolve_max_depth(explicit_override: Option<u8>, config_value: Option<u8>) -> Depth {
    let raw = explicit_override.or(config_value).unwrap_or(2).clamp(0, 8);
    Depth::from_index(raw.min(3))
}

pub fn decide_escalation(input: EscalationInput) -> EscalationDecision {
    if input.depth >= input.max_depth {
        return EscalationDecision {
            escalate: false,
            next_depth: input.depth,
            expand_query: false,
            reason: "max escalation depth reached".to_string(),
        };
    }

    if input.total_confidence < 0.2 && input.depth < Depth::L3 {
        return EscalationDecision {
            escalate: true,
            next_depth: Depth::L3.min(input.max_depth),
            expand_query: true,
            reason: "confidence below 0.2: escalate straight to L3".to_string(),
        };
    }

    if input.total_confidence < 0.4 && input.entropy > 1.5 {
        if let Some(next) = input.depth.next() {
            let next = next.min(input.max_depth);
            return EscalationDecision {
                escalate: true,
                next_depth: next,
                expand_query: false,
                reason: "confidence below 0.4 and entropy above 1.5".to_string(),
            };
        }
    }

    if input.entropy > 2.0 && input.pack_count >= 5 && input.total_confidence >= 0.4 && input.total_confidence < 0.7 {
        if let Some(next) = input.depth.next() {
            let next = next.min(input.max_depth);
            return EscalationDecision {
                escalate: true,
                next_depth: next,
                expand_query: false,
                reason: "entropy above 2.0 with moderate confidence and sufficient pack count".to_string(),
            };
        }
    }

    EscalationDecision {
        escalate: false,
        next_depth: input.depth,
        expand_query: false,
        reason: "no escalation rule matched".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_confidence_set_has_log2_ten_entropy() {
        assert!((retrieval_entropy(&[]) - (10f64).log2()).abs() < 1e-9);
    }

    #[test]
    fn uniform_confidences_maximize_entropy_over_their_count() {
        let entropy = retrieval_entropy(&[1.0, 1.0, 1.0, 1.0]);
        assert!((entropy - 2.0).abs() < 1e-9);
    }

    #[test]
    fn status_buckets_match_thresholds() {
        assert_eq!(retrieval_status(0.8, 2), RetrievalStatus::Sufficient);
        assert_eq!(retrieval_status(0.5, 0), RetrievalStatus::Partial);
        assert_eq!(retrieval_status(0.1, 0), RetrievalStatus::Insufficient);
    }

    #[test]
    fn low_confidence_escalates_straight_to_l3() {
        let decision = decide_escalation(EscalationInput {
            depth: Depth::L1,
            total_confidence: 0.1,
            entropy: 0.5,
            attempts: 0,
            max_depth: Depth::L3,
            pack_count: 2,
        });
        assert!(decision.escalate);
        assert_eq!(decision.next_depth, Depth::L3);
        assert!(decision.expand_query);
    }

    #[test]
    fn never_exceeds_configured_max_depth() {
        let decision = decide_escalation(EscalationInput {
            depth: Depth::L2,
            total_confidence: 0.1,
            entropy: 0.5,
            attempts: 0,
            max_depth: Depth::L2,
            pack_count: 2,
        });
        assert!(!decision.escalate);
    }

    #[test]
    fn max_depth_resolution_order_prefers_explicit_override() {
        assert_eq!(resolve_max_depth(Some(1), Some(3)), Depth::L1);
        assert_eq!(resolve_max_depth(None, Some(3)), Depth::from_index(3));
        assert_eq!(resolve_max_depth(None, None), Depth::L2);
    }
}
