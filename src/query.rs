//! The query envelope and its nested types. This is the
//! caller-facing input shape every other component normalizes against.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Depth {
    L0,
    L1,
    L2,
    L3,
}

impl Default for Depth {
    fn default() -> Self {
        Depth::L1
    }
}

impl Depth {
    pub fn as_index(self) -> u8 {
        match self {
            Depth::L0 => 0,
            Depth::L1 => 1,
            Depth::L2 => 2,
            Depth::L3 => 3,
        }
    }

    pub fn from_index(index: u8) -> Depth {
        match index {
            0 => Depth::L0,
            1 => Depth::L1,
            2 => Depth::L2,
            _ => Depth::L3,
        }
    }

    pub fn next(self) -> Option<Depth> {
        match self {
            Depth::L0 => Some(Depth::L1),
            Depth::L1 => Some(Depth::L2),
            Depth::L2 => Some(Depth::L3),
            Depth::L3 => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    Understand,
    Impact,
    Refactor,
    Security,
    Test,
    Document,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmRequirement {
    Disabled,
    Optional,
    Required,
}

impl Default for LlmRequirement {
    fn default() -> Self {
        LlmRequirement::Optional
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingRequirement {
    Disabled,
    Optional,
    Required,
}

impl Default for EmbeddingRequirement {
    fn default() -> Self {
        EmbeddingRequirement::Optional
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UcRequirements {
    pub uc_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Filter {
    pub path_prefix: Option<String>,
    pub language: Option<String>,
    pub is_exported: Option<bool>,
    pub is_pure: Option<bool>,
    pub exclude_tests: Option<bool>,
    pub max_file_size_bytes: Option<u64>,
}

impl Filter {
    /// Normalized for cache-key construction: workspace-relative
    /// path prefix with trailing slash, lowercased language.
    pub fn normalized(&self) -> Filter {
        Filter {
            path_prefix: self.path_prefix.as_ref().map(|p| {
                let trimmed = p.trim_end_matches('/');
                format!("{}/", trimmed)
            }),
            language: self.language.as_ref().map(|l| l.to_lowercase()),
            is_exported: self.is_exported,
            is_pure: self.is_pure,
            exclude_tests: self.exclude_tests,
            max_file_size_bytes: self.max_file_size_bytes.filter(|b| *b > 0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryEnvelope {
    pub intent: String,
    #[serde(default)]
    pub depth: Depth,
    pub intent_type: Option<IntentType>,
    pub uc_requirements: Option<UcRequirements>,
    #[serde(default)]
    pub affected_files: Vec<String>,
    pub working_file: Option<String>,
    pub scope: Option<String>,
    #[serde(default)]
    pub filter: Filter,
    #[serde(default)]
    pub llm_requirement: LlmRequirement,
    #[serde(default)]
    pub embedding_requirement: EmbeddingRequirement,
    #[serde(default)]
    pub hyde_expansion: bool,
    #[serde(default)]
    pub diversify: bool,
    pub diversity_lambda: Option<f64>,
    #[serde(default)]
    pub disable_cache: bool,
    #[serde(default)]
    pub disable_method_guidance: bool,
    #[serde(default)]
    pub force_summary_synthesis: bool,
    #[serde(default)]
    pub show_llm_errors: bool,
    pub timeout_ms: Option<u64>,
}

impl QueryEnvelope {
    /// `diversityLambda` clamped into `[0,1]`, default 0.5.
    pub fn diversity_lambda(&self) -> f64 {
        self.diversity_lambda.unwrap_or(0.5).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelevanceRating {
    pub pack_id: String,
    pub relevant: bool,
    pub usefulness: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackSubmission {
    pub query_id: String,
    pub relevance_ratings: Vec<RelevanceRating>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackResult {
    pub adjustments_applied: u32,
    pub gaps_logged: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_defaults_to_l1_and_steps_monotonically() {
        assert_eq!(Depth::default(), Depth::L1);
        assert_eq!(Depth::L1.next(), Some(Depth::L2));
        assert_eq!(Depth::L3.next(), None);
    }

    #[test]
    fn filter_normalization_lowercases_language_and_adds_trailing_slash() {
        let filter = Filter {
            path_prefix: Some("src/api".into()),
            language: Some("Rust".into()),
            max_file_size_bytes: Some(0),
            ..Default::default()
        };
        let normalized = filter.normalized();
        assert_eq!(normalized.path_prefix, Some("src/api/".into()));
        assert_eq!(normalized.language, Some("rust".into()));
        assert_eq!(normalized.max_file_size_bytes, None);
    }

    #[test]
    fn diversity_lambda_clamps_into_unit_interval() {
        let mut query = QueryEnvelope {
            intent: "x".into(),
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
            diversify: true,
            diversity_lambda: Some(5.0),
            disable_cache: false,
            disable_method_guidance: false,
            force_summary_synthesis: false,
            show_llm_errors: false,
            timeout_ms: None,
        };
        assert_eq!(query.diversity_lambda(), 1.0);
        query.diversity_lambda = Some(-3.0);
        assert_eq!(query.diversity_lambda(), 0.0);
    }
}
