//! Local hash embeddings.
//!
//! Feature-hashes tokens and adjacent-token bigrams with FNV-1a into a fixed
//! number of signed buckets, then L2-normalizes. Deterministic, no model files.

use async_trait::async_trait;
use route_core::semantic::{Embedder, EmbeddingError};

/// Default embedding width.
pub const DEFAULT_EMBEDDING_DIMS: usize = 384;

const BIGRAM_WEIGHT: f32 = 0.5;

/// FNV-1a feature-hashing embedder.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dims: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIMS)
    }
}

impl HashEmbedder {
    /// `dims` of zero is bumped to one.
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Embed text synchronously. Empty or token-less text is an error.
    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }

        let mut embedding = vec![0.0; self.dims];
        for token in &tokens {
            accumulate(&mut embedding, token, 1.0);
        }
        for window in tokens.windows(2) {
            let bigram = format!("{} {}", window[0], window[1]);
            accumulate(&mut embedding, &bigram, BIGRAM_WEIGHT);
        }

        l2_normalize(&mut embedding);
        Ok(embedding)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_text(text)
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .map(|t| t.trim_matches('-'))
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_string)
        .collect()
}

fn accumulate(embedding: &mut [f32], feature: &str, weight: f32) {
    let hash = fnv1a_hash(feature.as_bytes());
    let bucket = ((hash >> 1) % embedding.len() as u64) as usize;
    if hash & 1 == 0 {
        embedding[bucket] += weight;
    } else {
        embedding[bucket] -= weight;
    }
}

fn fnv1a_hash(data: &[u8]) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    let mut hash = FNV_OFFSET;
    for byte in data {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn l2_normalize(vec: &mut [f32]) {
    let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vec.iter_mut() {
            *value /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use route_core::semantic::cosine_similarity;

    #[test]
    fn embedding_is_normalized_and_sized() {
        let embedder = HashEmbedder::new(64);
        let v = embedder.embed_text("draft a follow-up email").unwrap();
        assert_eq!(v.len(), 64);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn embedding_is_deterministic() {
        let embedder = HashEmbedder::default();
        assert_eq!(
            embedder.embed_text("log the call").unwrap(),
            embedder.embed_text("log the call").unwrap()
        );
    }

    #[test]
    fn empty_text_is_rejected() {
        let embedder = HashEmbedder::default();
        assert_eq!(embedder.embed_text("   "), Err(EmbeddingError::EmptyInput));
        assert_eq!(embedder.embed_text("a ! ?"), Err(EmbeddingError::EmptyInput));
    }

    #[test]
    fn related_text_scores_higher_than_unrelated() {
        let embedder = HashEmbedder::default();
        let skill = embedder.embed_text("send follow-up email to client").unwrap();
        let close = embedder.embed_text("follow-up email for the client").unwrap();
        let far = embedder.embed_text("update pipeline forecast numbers").unwrap();
        assert!(cosine_similarity(&skill, &close) > cosine_similarity(&skill, &far));
    }

    #[tokio::test]
    async fn trait_embed_matches_sync_path() {
        let embedder = HashEmbedder::new(32);
        let via_trait = Embedder::embed(&embedder, "meeting notes").await.unwrap();
        assert_eq!(via_trait, embedder.embed_text("meeting notes").unwrap());
    }
}
