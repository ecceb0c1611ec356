//! Stage 11: synthesis. LLM narrative synthesis over
//! the final pack set with a fixed 60s bound independent of the outer
//! query deadline, up to 3 retries accepting JSON or plain text, and a
//! heuristic fallback that downgrades visibly unless errors are hidden.

use crate::model::ContextPack;
use crate::providers::LlmProvider;
use crate::response::SynthesisMode;
use crate::stage_tracker::{IssueSeverity, StageIssue};
use std::time::Duration;

pub const SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(60);
pub const MAX_SYNTHESIS_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct SynthesisOutcome {
    pub summary: String,
    pub mode: SynthesisMode,
    pub llm_error: Option<String>,
}

/// Strips a leading `unverified_by_trace(...)` wrapper some LLM
/// completions prepend when they can't ground a claim in a pack.
fn strip_unverified_prefix(text: &str) -> String {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("unverified_by_trace(") {
        if let Some(close) = rest.find(')') {
            return rest[close + 1..].trim_start().to_string();
        }
    }
    trimmed.to_string()
}

/// Accepts either a JSON `{"summary": "..."}` object or plain text as a
/// valid completion body.
fn extract_summary(raw: &str) -> Option<String> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) {
        if let Some(summary) = value.get("summary").and_then(|v| v.as_str()) {
            return Some(strip_unverified_prefix(summary));
        }
        return None;
    }
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(strip_unverified_prefix(trimmed))
    }
}

fn heuristic_summary(packs: &[ContextPack], intent: &str) -> String {
    if packs.is_empty() {
        return format!("No supporting context packs were found for: {}", intent);
    }
    let highlights: Vec<String> = packs.iter().take(3).map(|p| p.summary.clone()).collect();
    format!("Regarding \"{}\": {}", intent, highlights.join(" "))
}

/// Runs LLM synthesis with up to `MAX_SYNTHESIS_RETRIES` attempts inside
/// a fixed 60s bound, falling back to a heuristic summary on timeout,
/// provider unavailability, or malformed output. The fallback is
/// silent (mode stays `Heuristic` with no `llmError`) when
/// `show_llm_errors` is false, surfacing `llmError` otherwise.
pub async fn synthesize(
    llm: Option<&dyn LlmProvider>,
    packs: &[ContextPack],
    intent: &str,
    force_summary_synthesis: bool,
    show_llm_errors: bool,
) -> (SynthesisOutcome, Vec<StageIssue>) {
    if force_summary_synthesis {
        return (SynthesisOutcome { summary: heuristic_summary(packs, intent), mode: SynthesisMode::Heuristic, llm_error: None }, Vec::new());
    }

    let Some(provider) = llm else {
        return (SynthesisOutcome { summary: heuristic_summary(packs, intent), mode: SynthesisMode::Heuristic, llm_error: None }, Vec::new());
    };

    let prompt = format!(
        "Summarize how these context packs answer the query \"{}\": {}",
        intent,
        packs.iter().map(|p| p.summary.as_str()).collect::<Vec<_>>().join(" | ")
    );

    let attempt = async {
        let mut last_error = String::new();
        for _ in 0..MAX_SYNTHESIS_RETRIES {
            match provider.complete(&prompt).await {
                Ok(raw) => {
                    if let Some(summary) = extract_summary(&raw) {
                        return Ok(summary);
                    }
                    last_error = "synthesis output was empty or malformed".to_string();
                }
                Err(err) => last_error = err.to_string(),
            }
        }
        Err(last_error)
    };

    match tokio::time::timeout(SYNTHESIS_TIMEOUT, attempt).await {
        Ok(Ok(summary)) => (SynthesisOutcome { summary, mode: SynthesisMode::Llm, llm_error: None }, Vec::new()),
        Ok(Err(message)) => downgrade(packs, intent, message, show_llm_errors),
        Err(_) => downgrade(packs, intent, "synthesis exceeded its 60s budget".to_string(), show_llm_errors),
    }
}

fn downgrade(packs: &[ContextPack], intent: &str, message: String, show_llm_errors: bool) -> (SynthesisOutcome, Vec<StageIssue>) {
    let issues = vec![StageIssue { severity: IssueSeverity::Moderate, message: format!("llm synthesis downgraded to heuristic: {}", message) }];
    let llm_error = if show_llm_errors { Some(message) } else { None };
    (SynthesisOutcome { summary: heuristic_summary(packs, intent), mode: SynthesisMode::Heuristic, llm_error }, issues)
}
