//! Feedback Loop: bounded confidence updates per pack and
//! a Thompson-sampling contextual bandit over retrieval strategy arms.

use crate::error::Result;
use crate::model::{ContextPack, Outcome};
use crate::query::{FeedbackResult, FeedbackSubmission};
use crate::store::KnowledgeStore;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;

pub const RELEVANT_GAIN_PER_USEFULNESS: f64 = 0.05;
pub const IRRELEVANT_PENALTY: f64 = 0.10;
pub const DEFAULT_USEFULNESS: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyArm {
    Bm25Only,
    VectorOnly,
    Hybrid,
    GraphTraversalFirst,
    ContextPackDirect,
}

pub const ALL_ARMS: [StrategyArm; 5] = [
    StrategyArm::Bm25Only,
    StrategyArm::VectorOnly,
    StrategyArm::Hybrid,
    StrategyArm::GraphTraversalFirst,
    StrategyArm::ContextPackDirect,
];

/// Beta(alpha, beta) posterior parameters for one (intentType, arm)
/// pair. `alpha = 1 + successes`, `beta = 1 + failures` (Beta(1,1) prior).
#[derive(Debug, Clone, Copy)]
pub struct BetaPosterior {
    pub alpha: f64,
    pub beta: f64,
}

impl Default for BetaPosterior {
    fn default() -> Self {
        BetaPosterior { alpha: 1.0, beta: 1.0 }
    }
}

impl BetaPosterior {
    pub fn update(&mut self, success: bool) {
        if success {
            self.alpha += 1.0;
        } else {
            self.beta += 1.0;
        }
    }

    /// Samples from Beta(alpha, beta) via two Gamma draws, the standard
    /// Beta-from-Gamma construction; avoids a dedicated Beta sampler
    /// dependency.
    fn sample(&self, rng: &mut ChaCha8Rng) -> f64 {
        let x = sample_gamma(rng, self.alpha);
        let y = sample_gamma(rng, self.beta);
        x / (x + y)
    }
}

/// Marsaglia-Tsang gamma sampler for shape >= 1; for shape < 1, uses the
/// boost-by-one-and-correct trick.
fn sample_gamma(rng: &mut ChaCha8Rng, shape: f64) -> f64 {
    if shape < 1.0 {
        let u: f64 = rng.gen();
        return sample_gamma(rng, shape + 1.0) * u.powf(1.0 / shape);
    }
    let d = shape - 1.0 / 3.0;
    let c = 1.0 / (9.0 * d).sqrt();
    loop {
        let mut x;
        let mut v;
        loop {
            x = standard_normal(rng);
            v = 1.0 + c * x;
            if v > 0.0 {
                break;
            }
        }
        v = v * v * v;
        let u: f64 = rng.gen();
        if u < 1.0 - 0.0331 * x * x * x * x {
            return d * v;
        }
        if u.ln() < 0.5 * x * x + d * (1.0 - v + v.ln()) {
            return d * v;
        }
    }
}

fn standard_normal(rng: &mut ChaCha8Rng) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(1e-12);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

pub struct StrategyBandit {
    posteriors: HashMap<(String, StrategyArm), BetaPosterior>,
    rng: ChaCha8Rng,
}

impl StrategyBandit {
    pub fn new(seed: u64) -> Self {
        StrategyBandit { posteriors: HashMap::new(), rng: ChaCha8Rng::seed_from_u64(seed) }
    }

    pub fn update(&mut self, intent_type: &str, arm: StrategyArm, success: bool) {
        self.posteriors.entry((intent_type.to_string(), arm)).or_default().update(success);
    }

    /// Thompson sampling selection: draws one sample per arm and picks
    /// the arm with the highest sampled value.
    pub fn select(&mut self, intent_type: &str) -> StrategyArm {
        let mut best_arm = StrategyArm::Hybrid;
        let mut best_sample = f64::MIN;
        for arm in ALL_ARMS {
            let posterior = self.posteriors.entry((intent_type.to_string(), arm)).or_default();
            let sample = posterior.sample(&mut self.rng);
            if sample > best_sample {
                best_sample = sample;
                best_arm = arm;
            }
        }
        best_arm
    }
}

/// Applies one relevance rating to `current` confidence.
pub fn apply_rating(current: f64, relevant: bool, usefulness: Option<f64>) -> f64 {
    let usefulness = usefulness.unwrap_or(DEFAULT_USEFULNESS);
    let raw = if relevant {
        current + RELEVANT_GAIN_PER_USEFULNESS * usefulness
    } else {
        current - IRRELEVANT_PENALTY
    };
    ContextPack::clamp_confidence(raw)
}

/// Applies a feedback submission against the store. Idempotent per
/// `(queryId, packId)`: already-applied ratings (tracked via a state
/// key keyed on queryId) are skipped on replay.
pub fn apply_feedback(store: &dyn KnowledgeStore, submission: &FeedbackSubmission) -> Result<FeedbackResult> {
    let applied_key = format!("feedback_applied:{}", submission.query_id);
    let mut already_applied: Vec<String> =
        store.get_state(&applied_key)?.and_then(|raw| serde_json::from_str(&raw).ok()).unwrap_or_default();

    let mut adjustments_applied = 0u32;
    let mut gaps_logged = 0u32;

    for rating in &submission.relevance_ratings {
        if already_applied.contains(&rating.pack_id) {
            continue;
        }
        let Some(mut pack) = store.get_pack(&rating.pack_id)? else {
            gaps_logged += 1;
            continue;
        };

        pack.confidence = apply_rating(pack.confidence, rating.relevant, rating.usefulness);
        pack.last_outcome = if rating.relevant { Outcome::Success } else { Outcome::Failure };
        if rating.relevant {
            pack.success_count += 1;
        } else {
            pack.failure_count += 1;
        }
        store.upsert_pack(pack)?;
        already_applied.push(rating.pack_id.clone());
        adjustments_applied += 1;
    }

    store.set_state(&applied_key, &serde_json::to_string(&already_applied)?)?;
    Ok(FeedbackResult { adjustments_applied, gaps_logged })
}
