use regex::Regex;
use std::fs;
use std::path::Path;

/// One `CODEOWNERS` rule compiled to a regex over workspace-relative
/// paths. Consumed only by downstream components ; this module
/// just does the compilation.
#[derive(Debug, Clone)]
pub struct OwnerRule {
    pub pattern: String,
    pub regex: Regex,
    pub owners: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CodeOwners {
    pub rules: Vec<OwnerRule>,
}

fn pattern_to_regex(pattern: &str) -> Option<Regex> {
    let mut body = pattern.trim().to_string();
    if body.is_empty() || body.starts_with('#') {
        return None;
    }
    let rooted = body.starts_with('/');
    if rooted {
        body = body.trim_start_matches('/').to_string();
    }
    let dir_only = body.ends_with('/');
    let body = body.trim_end_matches('/');

    let mut regex_str = String::from("^");
    if !rooted {
        regex_str.push_str("(?:.*/)?");
    }
    for part in body.split('*') {
        regex_str.push_str(&regex::escape(part));
        regex_str.push_str(".*");
    }
    // remove the trailing ".*" introduced by the split-join above.
    regex_str.truncate(regex_str.len() - 2);
    if dir_only {
        regex_str.push_str("(?:/.*)?$");
    } else {
        regex_str.push('$');
    }
    Regex::new(&regex_str).ok()
}

impl CodeOwners {
    pub fn load(workspace_root: &Path) -> Self {
        let path = workspace_root.join("CODEOWNERS");
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => return CodeOwners::default(),
        };
        let mut rules = Vec::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.split_whitespace();
            let Some(pattern) = parts.next() else { continue };
            let owners: Vec<String> = parts.map(|s| s.to_string()).collect();
            if let Some(regex) = pattern_to_regex(pattern) {
                rules.push(OwnerRule { pattern: pattern.to_string(), regex, owners });
            }
        }
        CodeOwners { rules }
    }

    /// Last matching rule wins, matching CODEOWNERS' own precedence.
    pub fn owners_for(&self, relative_path: &str) -> Vec<String> {
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.regex.is_match(relative_path))
            .map(|rule| rule.owners.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn rooted_pattern_matches_only_from_root() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("CODEOWNERS"), "/src/ @core-team\n").unwrap();
        let owners = CodeOwners::load(dir.path());
        assert_eq!(owners.owners_for("src/lib.rs"), vec!["@core-team".to_string()]);
        assert!(owners.owners_for("nested/src/lib.rs").is_empty());
    }

    #[test]
    fn later_rule_overrides_earlier_match() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("CODEOWNERS"), "* @everyone\nsrc/ @core-team\n").unwrap();
        let owners = CodeOwners::load(dir.path());
        assert_eq!(owners.owners_for("src/lib.rs"), vec!["@core-team".to_string()]);
        assert_eq!(owners.owners_for("README.md"), vec!["@everyone".to_string()]);
    }
}
