//! Stage 1: adequacy scan. Classifies the query's
//! shape via a regex bank and extracts the targets each class cares
//! about; records a coverage gap when nothing actionable is parsed.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryClass {
    Meta,
    Code,
    Definition,
    EntryPoint,
    Why,
    Refactor,
    Security,
    BugInvestigation,
    Test,
    Review,
    ArchitectureVerification,
    FeatureLocation,
}

struct ClassPattern {
    class: QueryClass,
    regex: Regex,
}

fn pattern_bank() -> &'static Vec<ClassPattern> {
    static BANK: OnceLock<Vec<ClassPattern>> = OnceLock::new();
    BANK.get_or_init(|| {
        let defs: &[(QueryClass, &str)] = &[
            (QueryClass::Meta, r"(?i)what (is|does) (this|the) (project|repo|codebase)"),
            (QueryClass::Code, r"(?i)\bshow me the code\b"),
            (QueryClass::Definition, r"(?i)\b(define|definition of)\b"),
            (QueryClass::EntryPoint, r"(?i)entry ?point|main function"),
            (QueryClass::Why, r"(?i)^why\b"),
            (QueryClass::Refactor, r"(?i)\brefactor(ing)?\b"),
            (QueryClass::Security, r"(?i)\b(security|vulnerab\w+|auth\w*)\b"),
            (QueryClass::BugInvestigation, r"(?i)\b(bug|crash|fails?|broken)\b"),
            (QueryClass::Test, r"(?i)\b(test|tests|spec)\b"),
            (QueryClass::Review, r"(?i)\breview\b"),
            (QueryClass::ArchitectureVerification, r"(?i)\barchitectur\w*\b"),
            (QueryClass::FeatureLocation, r"(?i)where (is|does|can i find)"),
        ];
        defs.iter().map(|(class, pattern)| ClassPattern { class: *class, regex: Regex::new(pattern).unwrap() }).collect()
    })
}

fn backtick_paths() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"`([^`]+\.[a-zA-Z0-9]+)`").unwrap())
}

fn quoted_paths() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""([^"]+\.[a-zA-Z0-9]+)""#).unwrap())
}

fn bareword_paths() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([\w./-]+\.(rs|ts|js|tsx|jsx|py|go|java|rb))\b").unwrap())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdequacyReport {
    pub classes: Vec<QueryClass>,
    pub target_files: Vec<String>,
    pub coverage_gap: bool,
}

/// Extracts target file paths from backtick, quote, and bareword
/// patterns, in that precedence order with de-duplication.
pub fn extract_target_files(intent: &str) -> Vec<String> {
    let mut targets = Vec::new();
    for capture in backtick_paths().captures_iter(intent) {
        targets.push(capture[1].to_string());
    }
    for capture in quoted_paths().captures_iter(intent) {
        targets.push(capture[1].to_string());
    }
    for capture in bareword_paths().captures_iter(intent) {
        targets.push(capture[1].to_string());
    }
    targets.sort();
    targets.dedup();
    targets
}

pub fn classify(intent: &str) -> Vec<QueryClass> {
    pattern_bank().iter().filter(|p| p.regex.is_match(intent)).map(|p| p.class).collect()
}

pub fn scan(intent: &str, affected_files: &[String]) -> AdequacyReport {
    let classes = classify(intent);
    let mut target_files = extract_target_files(intent);
    target_files.extend(affected_files.iter().cloned());
    target_files.sort();
    target_files.dedup();
    let coverage_gap = classes.is_empty() && target_files.is_empty();
    AdequacyReport { classes, target_files, coverage_gap }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_and_auth_intent_classifies_as_security() {
        let report = scan("is there a vulnerability in the auth middleware", &[]);
        assert!(report.classes.contains(&QueryClass::Security));
        assert!(!report.coverage_gap);
    }

    #[test]
    fn backtick_path_is_extracted_as_a_target_file() {
        let report = scan("what does `src/lib.rs` export", &[]);
        assert!(report.target_files.contains(&"src/lib.rs".to_string()));
    }

    #[test]
    fn nothing_actionable_records_a_coverage_gap() {
        let report = scan("hmm", &[]);
        assert!(report.coverage_gap);
    }

    #[test]
    fn entry_point_phrasing_classifies_as_entry_point() {
        let report = scan("where is the main function for this service", &[]);
        assert!(report.classes.contains(&QueryClass::EntryPoint));
        assert!(report.classes.contains(&QueryClass::FeatureLocation));
    }
}
