//! LLM and embedding provider interfaces. This
//! module also ships deterministic test/demo implementations so the
//! pipeline is exercisable without a live service, following a
//! placeholder-with-real-API-shape pattern.

use crate::error::{Error, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// A short hypothetical-document expansion or a cross-encoder rerank
/// completion. Implementations may be remote; callers must treat
/// unavailability as `ProviderUnavailable` rather than panicking.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn dimensions(&self) -> usize;
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Canned/rule-based completions, deterministic for tests. `responses`
/// is consulted in order by substring match against the prompt; falls
/// back to an echo-style completion for HyDE expansion prompts.
pub struct MockLlmProvider {
    pub responses: Vec<(String, String)>,
    pub fail_on: Option<String>,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        MockLlmProvider { responses: Vec::new(), fail_on: None }
    }

    pub fn with_response(mut self, contains: impl Into<String>, response: impl Into<String>) -> Self {
        self.responses.push((contains.into(), response.into()));
        self
    }

    pub fn failing(mut self, contains: impl Into<String>) -> Self {
        self.fail_on = Some(contains.into());
        self
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn complete(&self, prompt: &str) -> Result<String> {
        if let Some(fail_on) = &self.fail_on {
            if prompt.contains(fail_on.as_str()) {
                return Err(Error::ProviderUnavailable("mock provider configured to fail".into()));
            }
        }
        for (needle, response) in &self.responses {
            if prompt.contains(needle.as_str()) {
                return Ok(response.clone());
            }
        }
        Ok(format!("// hypothetical expansion for: {}", prompt.chars().take(120).collect::<String>()))
    }
}

/// A deterministic, dependency-free embedding over token shingles: not
/// a real semantic embedder, but stable enough to exercise
/// nearest-neighbor search, chunk/merge, and RRF fusion end-to-end.
/// Each dimension is a hashed-shingle bucket count, L2-normalized.
pub struct HashEmbeddingProvider {
    dims: usize,
}

impl HashEmbeddingProvider {
    pub fn new(dims: usize) -> Self {
        HashEmbeddingProvider { dims: dims.max(1) }
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    fn dimensions(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut buckets = vec![0f32; self.dims];
        let normalized: String = text.to_lowercase();
        let tokens: Vec<&str> = normalized.split_whitespace().collect();
        if tokens.is_empty() {
            return Ok(buckets);
        }
        for window in tokens.windows(2.min(tokens.len()).max(1)) {
            let shingle = window.join(" ");
            let mut hasher = Sha256::new();
            hasher.update(shingle.as_bytes());
            let digest = hasher.finalize();
            let bucket = (u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize) % self.dims;
            buckets[bucket] += 1.0;
        }
        let norm = buckets.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut buckets {
                *value /= norm;
            }
        }
        Ok(buckets)
    }
}
