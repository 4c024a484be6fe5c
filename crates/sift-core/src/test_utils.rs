//! Shared test helpers.
//!
//! The real embedder needs model weights on disk, so tests run against
//! [`HashEmbedder`], a deterministic bag-of-words stand-in: texts sharing
//! words get similar vectors, identical texts get identical vectors, and no
//! model files are involved.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::config::EMBEDDING_DIM;
use crate::embedding::TextEmbedder;
use crate::error::EmbedError;

/// Deterministic stub embedder: each lowercased word hashes to a dimension
/// bucket, and the bucket counts are L2-normalised.
pub struct HashEmbedder {
    dim: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self { dim: EMBEDDING_DIM }
    }
}

impl HashEmbedder {
    /// Stub with the production embedding dimension.
    pub fn new() -> Self {
        Self::default()
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];
        for word in text.to_lowercase().split_whitespace() {
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            let bucket = (hasher.finish() % self.dim as u64) as usize;
            v[bucket] += 1.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        } else {
            v[0] = 1.0;
        }
        v
    }
}

impl TextEmbedder for HashEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed_docs(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn embed_query(&self, query: &str) -> Result<Vec<f32>, EmbedError> {
        Ok(self.embed_one(query))
    }
}

/// Embedder that fails every call, for exercising per-file skip paths.
pub struct FailingEmbedder;

impl TextEmbedder for FailingEmbedder {
    fn dim(&self) -> usize {
        EMBEDDING_DIM
    }

    fn embed_docs(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Err(EmbedError::Inference("stub failure".to_string()))
    }

    fn embed_query(&self, _query: &str) -> Result<Vec<f32>, EmbedError> {
        Err(EmbedError::Inference("stub failure".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_embedder_deterministic() {
        let e = HashEmbedder::new();
        let a = e.embed_query("hello world").unwrap();
        let b = e.embed_query("hello world").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_hash_embedder_unit_norm() {
        let e = HashEmbedder::new();
        for text in ["hello", "", "one two three four"] {
            let v = e.embed_query(text).unwrap();
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5, "norm for {text:?} was {norm}");
        }
    }

    #[test]
    fn test_shared_words_raise_similarity() {
        let e = HashEmbedder::new();
        let a = e.embed_query("rust memory safety").unwrap();
        let b = e.embed_query("rust memory model").unwrap();
        let c = e.embed_query("quarterly revenue report").unwrap();

        let sim = |x: &[f32], y: &[f32]| -> f32 { x.iter().zip(y).map(|(p, q)| p * q).sum() };
        assert!(sim(&a, &b) > sim(&a, &c));
    }
}
