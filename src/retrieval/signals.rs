//! Stage 5: multi-signal scoring. Merges candidates by
//! `entityType:entityId`, keeping the strongest value per signal
//! dimension and dropping duplicates in insertion order.

use crate::model::{EntityType, SignalMap};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub key: String,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub signals: SignalMap,
}

/// One observation of a candidate's signals from an earlier stage
/// (direct, semantic, or graph).
#[derive(Debug, Clone)]
pub struct CandidateObservation {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub signals: SignalMap,
}

pub fn merge(observations: Vec<CandidateObservation>) -> Vec<ScoredCandidate> {
    let mut order: Vec<String> = Vec::new();
    let mut merged: HashMap<String, ScoredCandidate> = HashMap::new();

    for observation in observations {
        let key = format!("{:?}:{}", observation.entity_type, observation.entity_id);
        match merged.get_mut(&key) {
            Some(existing) => {
                for (dimension, value) in observation.signals {
                    let slot = existing.signals.entry(dimension).or_insert(f64::MIN);
                    if value > *slot {
                        *slot = value;
                    }
                }
            }
            None => {
                order.push(key.clone());
                merged.insert(
                    key.clone(),
                    ScoredCandidate { key, entity_type: observation.entity_type, entity_id: observation.entity_id, signals: observation.signals },
                );
            }
        }
    }

    order.into_iter().map(|key| merged.remove(&key).unwrap()).collect()
}
