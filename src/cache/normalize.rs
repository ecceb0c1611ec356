//! Intent normalization for cache-key construction:
//! lowercase, strip punctuation, fold synonym classes, drop stop
//! words and trailing interrogatives, sort tokens so paraphrases that
//! fold to the same token multiset collapse onto the same key.

const STOP_WORDS: &[&str] = &["the", "a", "an", "of", "to", "in", "on", "for", "is", "does", "do", "i"];

const SYNONYM_GROUPS: &[(&str, &[&str])] = &[
    ("auth", &["authentication", "auth", "method", "login", "signin"]),
    ("function", &["function", "method", "routine"]),
    ("workflow", &["how", "explain", "describe", "what"]),
    ("permission", &["permissions", "access", "authorization", "role"]),
];

fn fold_synonym(token: &str) -> String {
    for (canonical, members) in SYNONYM_GROUPS {
        if members.contains(&token) {
            return (*canonical).to_string();
        }
    }
    token.to_string()
}

fn strip_punctuation(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect()
}

/// Returns the sorted, deduplicated token multiset used as the
/// intent component of the cache key. Paraphrases that fold to the
/// same multiset produce the same key.
pub fn normalize_intent(intent: &str) -> Vec<String> {
    let lowered = intent.to_lowercase();
    let stripped = strip_punctuation(&lowered);
    let mut tokens: Vec<String> = stripped
        .split_whitespace()
        .map(fold_synonym)
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
        .collect();
    tokens.sort();
    tokens
}

/// Whether the intent text deterministically classifies as
/// meta/code/definition/entry-point, 's cache-key boolean and
/// 's adequacy-scan class bank.
pub fn is_structural_class(intent: &str) -> bool {
    let lowered = intent.to_lowercase();
    const MARKERS: &[&str] = &[
        "what is",
        "define",
        "definition of",
        "entry point",
        "entrypoint",
        "main function",
        "where does the code",
        "project structure",
    ];
    MARKERS.iter().any(|marker| lowered.contains(marker))
}
