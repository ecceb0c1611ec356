//! Embedding construction with chunk/merge for text exceeding a
//! provider's context window.

use crate::error::{Error, Result};
use crate::providers::EmbeddingProvider;

pub const DEFAULT_CHUNK_CHARS: usize = 400;
pub const DEFAULT_CHUNK_OVERLAP: usize = 80;

/// Splits `text` into overlapping chunks of at most `chunk_chars`
/// characters, advancing by `chunk_chars - overlap` each step.
pub fn chunk_text(text: &str, chunk_chars: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= chunk_chars {
        return vec![text.to_string()];
    }
    let stride = chunk_chars.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + chunk_chars).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += stride;
    }
    chunks
}

/// Element-wise mean of equal-dimension vectors. Mismatched dimensions
/// are a provider contract violation, not a caller error.
pub fn merge_by_mean(vectors: &[Vec<f32>]) -> Result<Vec<f32>> {
    let Some(first) = vectors.first() else {
        return Ok(Vec::new());
    };
    let dims = first.len();
    if vectors.iter().any(|v| v.len() != dims) {
        return Err(Error::ProviderInvalidOutput("chunk embeddings have mismatched dimensions".into()));
    }
    let mut sum = vec![0f32; dims];
    for vector in vectors {
        for (slot, value) in sum.iter_mut().zip(vector.iter()) {
            *slot += value;
        }
    }
    let count = vectors.len() as f32;
    for value in &mut sum {
        *value /= count;
    }
    Ok(sum)
}

/// Embeds `text`, chunking first when it exceeds `chunk_chars`, then
/// merging chunk embeddings by element-wise mean.
pub async fn embed_with_chunking(
    provider: &dyn EmbeddingProvider,
    text: &str,
    chunk_chars: usize,
    overlap: usize,
) -> Result<Vec<f32>> {
    let chunks = chunk_text(text, chunk_chars, overlap);
    let mut vectors = Vec::with_capacity(chunks.len());
    for chunk in &chunks {
        vectors.push(provider.embed(chunk).await?);
    }
    merge_by_mean(&vectors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::HashEmbeddingProvider;

    #[test]
    fn short_text_is_returned_as_a_single_chunk() {
        let chunks = chunk_text("short text", 400, 80);
        assert_eq!(chunks, vec!["short text".to_string()]);
    }

    #[test]
    fn long_text_chunks_with_configured_overlap() {
        let text = "a".repeat(900);
        let chunks = chunk_text(&text, 400, 80);
        assert!(chunks.len() >= 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 400));
    }

    #[test]
    fn merge_rejects_mismatched_dimensions_as_provider_invalid_output() {
        let result = merge_by_mean(&[vec![1.0, 2.0], vec![1.0, 2.0, 3.0]]);
        assert!(matches!(result, Err(Error::ProviderInvalidOutput(_))));
    }

    #[test]
    fn merge_of_equal_vectors_is_elementwise_mean() {
        let merged = merge_by_mean(&[vec![1.0, 1.0], vec![3.0, 5.0]]).unwrap();
        assert_eq!(merged, vec![2.0, 3.0]);
    }

    #[tokio::test]
    async fn embed_with_chunking_merges_long_text_into_single_vector() {
        let provider = HashEmbeddingProvider::new(32);
        let text = "permission check ".repeat(60);
        let vector = embed_with_chunking(&provider, &text, 400, 80).await.unwrap();
        assert_eq!(vector.len(), 32);
    }
}
