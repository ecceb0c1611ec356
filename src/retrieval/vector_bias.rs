//! Stage 6: multi-vector scoring. Derives a query-intent
//! bias profile and applies it to the merged signal map, with an
//! additive boost for entry-point names/paths.

use crate::retrieval::adequacy::QueryClass;
use crate::retrieval::signals::ScoredCandidate;

#[derive(Debug, Clone, Copy)]
pub struct BiasProfile {
    pub document: f64,
    pub code: f64,
    pub definition: f64,
    pub entry_point: f64,
    pub architecture_overview: f64,
}

impl Default for BiasProfile {
    fn default() -> Self {
        BiasProfile { document: 0.5, code: 0.5, definition: 0.5, entry_point: 0.5, architecture_overview: 0.5 }
    }
}

/// Entry-point boost threshold: below this the additive boost is
/// negligible enough that ordering among ties is preserved.
const ENTRY_POINT_BOOST_THRESHOLD: f64 = 0.6;
const ENTRY_POINT_BOOST: f64 = 0.1;

pub fn derive_bias_profile(classes: &[QueryClass]) -> BiasProfile {
    let mut profile = BiasProfile::default();
    if classes.contains(&QueryClass::Meta) {
        profile.document = profile.document.min(1.0);
    }
    if classes.contains(&QueryClass::Test) || classes.contains(&QueryClass::Code) {
        profile.document = profile.document.min(0.1);
    }
    if classes.contains(&QueryClass::Why) {
        profile.document = (profile.document + 0.3).min(1.0);
    }
    if classes.contains(&QueryClass::EntryPoint) {
        profile.entry_point = (profile.entry_point + 0.3).min(1.0);
    }
    if classes.contains(&QueryClass::ArchitectureVerification) {
        profile.architecture_overview = (profile.architecture_overview + 0.3).min(1.0);
    }
    if classes.contains(&QueryClass::Definition) {
        profile.definition = (profile.definition + 0.3).min(1.0);
    }
    profile
}

/// Applies the bias profile to `candidates`, boosting entry-point
/// names/paths additively when the bias clears the threshold.
pub fn apply_bias(candidates: &mut [ScoredCandidate], profile: BiasProfile, entry_point_names: &[String]) {
    for candidate in candidates.iter_mut() {
        let base = candidate.signals.values().copied().sum::<f64>();
        candidate.signals.insert("documentBias".to_string(), profile.document);
        candidate.signals.insert("codeBias".to_string(), profile.code);

        if profile.entry_point > ENTRY_POINT_BOOST_THRESHOLD
            && entry_point_names.iter().any(|name| candidate.entity_id.contains(name.as_str()))
        {
            let boosted = base + ENTRY_POINT_BOOST;
            candidate.signals.insert("entryPointBoost".to_string(), boosted - base);
        }
    }
}
