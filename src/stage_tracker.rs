//! Stage Tracker: queues issues before a stage starts,
//! attaches them on start, and assembles a report on finish. Also
//! produces the coverage assessment consumed by the Response
//! Assembler.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const STAGE_ORDER: &[&str] = &[
    "adequacy_scan",
    "direct_packs",
    "semantic_retrieval",
    "graph_expansion",
    "multi_signal_scoring",
    "multi_vector_scoring",
    "fallback",
    "reranking",
    "defeater_check",
    "method_guidance",
    "synthesis",
    "post_processing",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    Partial,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Minor,
    Moderate,
    Significant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageIssue {
    pub severity: IssueSeverity,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: String,
    pub status: StageStatus,
    pub input_count: usize,
    pub output_count: usize,
    pub filtered_count: usize,
    pub telemetry: Option<serde_json::Value>,
    pub issues: Vec<StageIssue>,
}

/// A read-only snapshot delivered to an observer once per stage.
/// Observers must not be able to mutate the stored report through it.
pub type StageSnapshot = StageReport;

pub trait StageObserver: Send + Sync {
    fn on_stage(&self, snapshot: &StageSnapshot);
}

pub struct StageTracker {
    queued_issues: Vec<StageIssue>,
    reports: HashMap<String, StageReport>,
    order: Vec<String>,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StageTracker {
    pub fn new() -> Self {
        StageTracker { queued_issues: Vec::new(), reports: HashMap::new(), order: Vec::new() }
    }

    /// Queues an issue to be attached to the next stage that starts.
    pub fn queue_issue(&mut self, severity: IssueSeverity, message: impl Into<String>) {
        self.queued_issues.push(StageIssue { severity, message: message.into() });
    }

    /// Runs one stage, invoking `observer` (if any) with an immutable
    /// snapshot. Observer panics/exceptions must never alter the stored
    /// report, so the observer call happens strictly after the report
    /// is finalized and stored.
    pub fn run_stage(
        &mut self,
        stage: &str,
        input_count: usize,
        output_count: usize,
        filtered_count: usize,
        telemetry: Option<serde_json::Value>,
        extra_issues: Vec<StageIssue>,
        observer: Option<&dyn StageObserver>,
    ) -> StageReport {
        let mut issues = std::mem::take(&mut self.queued_issues);
        issues.extend(extra_issues);

        let status = if output_count == 0 && !issues.is_empty() {
            StageStatus::Failed
        } else if output_count == 0 {
            StageStatus::Partial
        } else {
            StageStatus::Success
        };

        let report = StageReport { stage: stage.to_string(), status, input_count, output_count, filtered_count, telemetry, issues };
        self.reports.insert(stage.to_string(), report.clone());
        self.order.push(stage.to_string());

        if let Some(observer) = observer {
            let guard_report = report.clone();
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| observer.on_stage(&guard_report)));
        }
        report
    }

    /// Generates `skipped` entries (with any queued issues) for every
    /// stage in `STAGE_ORDER` that never ran.
    pub fn finalize_missing(&mut self) {
        for stage in STAGE_ORDER {
            if self.reports.contains_key(*stage) {
                continue;
            }
            let issues = std::mem::take(&mut self.queued_issues);
            let report = StageReport {
                stage: stage.to_string(),
                status: StageStatus::Skipped,
                input_count: 0,
                output_count: 0,
                filtered_count: 0,
                telemetry: None,
                issues,
            };
            self.reports.insert(stage.to_string(), report);
        }
    }

    pub fn reports(&self) -> Vec<StageReport> {
        STAGE_ORDER.iter().filter_map(|stage| self.reports.get(*stage).cloned()).collect()
    }

    /// Combines stage statuses and total confidence into an estimated
    /// coverage in `[0,1]`, a coverage confidence, and gap suggestions.
    pub fn coverage_assessment(&self, total_confidence: f64) -> CoverageAssessment {
        let reports = self.reports();
        let successful = reports.iter().filter(|r| r.status == StageStatus::Success).count();
        let ran = reports.iter().filter(|r| r.status != StageStatus::Skipped).count().max(1);
        let stage_coverage = successful as f64 / ran as f64;
        let coverage = (stage_coverage * 0.5 + total_confidence.clamp(0.0, 1.0) * 0.5).clamp(0.0, 1.0);
        let coverage_confidence = if ran >= STAGE_ORDER.len() { 0.9 } else { 0.6 };

        let mut suggestions = Vec::new();
        if reports.iter().any(|r| r.stage == "direct_packs" && r.output_count == 0) {
            suggestions.push("Index the project and include affected files to improve coverage.".to_string());
        }
        if reports.iter().any(|r| r.status == StageStatus::Failed) {
            suggestions.push("One or more stages failed; re-run with a lower depth or narrower scope.".to_string());
        }

        CoverageAssessment { coverage, coverage_confidence, suggestions }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageAssessment {
    pub coverage: f64,
    pub coverage_confidence: f64,
    pub suggestions: Vec<String>,
}
