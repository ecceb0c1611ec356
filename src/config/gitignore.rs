use std::fs;
use std::path::Path;

/// Converts one `.gitignore` line into the glob form the rest of the
/// pipeline matches against: `/dir` becomes `**/dir/**`, a
/// trailing `/` is preserved, and a leading `!` (negation) passes through
/// unchanged ahead of the conversion.
pub fn ignore_glob_to_pattern(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (negated, body) = match line.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, line),
    };
    let trailing_slash = body.ends_with('/');
    let trimmed = body.trim_end_matches('/');
    let converted = if let Some(rooted) = trimmed.strip_prefix('/') {
        format!("**/{}/**", rooted)
    } else {
        format!("**/{}/**", trimmed)
    };
    let converted = if trailing_slash {
        converted
    } else {
        // A bare file pattern (no leading slash, no trailing slash) still
        // matches at any depth, but without forcing directory semantics.
        format!("**/{}", trimmed)
    };
    Some(if negated { format!("!{}", converted) } else { converted })
}

#[derive(Debug, Clone, Default)]
pub struct GitignorePatterns {
    pub patterns: Vec<String>,
}

impl GitignorePatterns {
    pub fn load(workspace_root: &Path) -> Self {
        let path = workspace_root.join(".gitignore");
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => return GitignorePatterns::default(),
        };
        let patterns = raw.lines().filter_map(ignore_glob_to_pattern).collect();
        GitignorePatterns { patterns }
    }
}
