//! Stage 10: method guidance. Up to ten seconds of LLM
//! time for a short "how to approach this" hint; skipped, not failed,
//! when guidance is disabled or no LLM is configured.

use crate::providers::LlmProvider;
use crate::stage_tracker::{IssueSeverity, StageIssue};
use std::time::Duration;

pub const METHOD_GUIDANCE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Default)]
pub struct MethodGuidance {
    pub hint: Option<String>,
    pub skipped: bool,
    pub skip_reason: Option<String>,
}

pub async fn guide(llm: Option<&dyn LlmProvider>, intent: &str, disable_method_guidance: bool) -> (MethodGuidance, Vec<StageIssue>) {
    if disable_method_guidance {
        return (MethodGuidance { hint: None, skipped: true, skip_reason: Some("method guidance disabled by caller".into()) }, Vec::new());
    }

    let Some(provider) = llm else {
        return (MethodGuidance { hint: None, skipped: true, skip_reason: Some("no LLM provider configured".into()) }, Vec::new());
    };

    let prompt = format!("In one or two sentences, suggest how to approach investigating: {}", intent);
    let call = tokio::time::timeout(METHOD_GUIDANCE_TIMEOUT, provider.complete(&prompt)).await;

    match call {
        Ok(Ok(hint)) => (MethodGuidance { hint: Some(hint), skipped: false, skip_reason: None }, Vec::new()),
        Ok(Err(err)) => (
            MethodGuidance { hint: None, skipped: true, skip_reason: Some(format!("provider error: {}", err)) },
            vec![StageIssue { severity: IssueSeverity::Minor, message: format!("method guidance provider failed: {}", err) }],
        ),
        Err(_) => (
            MethodGuidance { hint: None, skipped: true, skip_reason: Some("method guidance timed out after 10s".into()) },
            vec![StageIssue { severity: IssueSeverity::Minor, message: "method guidance exceeded its 10s budget".into() }],
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MockLlmProvider;

    #[tokio::test]
    async fn skipped_when_caller_disables_guidance() {
        let llm = MockLlmProvider::new();
        let (guidance, issues) = guide(Some(&llm), "investigate the bug", true).await;
        assert!(guidance.skipped);
        assert!(issues.is_empty());
    }

    #[tokio::test]
    async fn skipped_when_no_provider_is_configured() {
        let (guidance, issues) = guide(None, "investigate the bug", false).await;
        assert!(guidance.skipped);
        assert!(issues.is_empty());
    }

    #[tokio::test]
    async fn returns_a_hint_when_the_provider_succeeds() {
        let llm = MockLlmProvider::new().with_response("investigate", "Start by reproducing the failure locally.");
        let (guidance, issues) = guide(Some(&llm), "investigate the bug", false).await;
        assert!(!guidance.skipped);
        assert_eq!(guidance.hint.unwrap(), "Start by reproducing the failure locally.");
        assert!(issues.is_empty());
    }

    #[tokio::test]
    async fn provider_failure_skips_with_an_issue_recorded() {
        let llm = MockLlmProvider::new().failing("investigate");
        let (guidance, issues) = guide(Some(&llm), "investigate the bug", false).await;
        assert!(guidance.skipped);
        assert!(!issues.is_empty());
    }
}
