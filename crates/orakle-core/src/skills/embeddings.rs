//! Embedding generation and caching for the skill registry: an async
//! `EmbeddingProvider` trait, a deterministic hash-based provider for tests
//! and offline use, an LRU-cached wrapper, and `cosine_similarity`.

use std::sync::Mutex;

use async_trait::async_trait;
use lru::LruCache;
use thiserror::Error;

/// Embedding dimension used throughout the skill registry. Matches
/// `text-embedding-3-small` (OpenAI) and common local models.
pub const EMBEDDING_DIM: usize = 384;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding request failed: {0}")]
    Request(String),
}

/// Async trait for computing fixed-dimension text embeddings.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Return a unit-normalised embedding vector for `text`.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Cosine similarity between two vectors, in `[0, 1]` for unit-normalised
/// inputs. Returns `0.0` if either vector is all-zeros or the lengths
/// mismatch, rather than panicking — the registry's k-NN search calls this
/// across descriptors that must never crash the server.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        0.0
    } else {
        (dot / (mag_a * mag_b)).clamp(0.0, 1.0)
    }
}

/// Deterministic, hash-based embedding provider for tests and for running
/// Orakle without a configured embedding model. Identical text always
/// produces the identical vector, which also gives the registry its
/// reload-idempotence property for free when descriptions are unchanged.
#[derive(Debug, Default)]
pub struct HashEmbeddingProvider;

impl HashEmbeddingProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut raw = vec![0.0f32; EMBEDDING_DIM];
        for (i, ch) in text.chars().enumerate() {
            let idx = (i + ch as usize) % EMBEDDING_DIM;
            raw[idx] += 1.0;
        }
        let mag: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
        if mag > 0.0 {
            for v in &mut raw {
                *v /= mag;
            }
        }
        Ok(raw)
    }
}

/// LRU-cached wrapper over any [`EmbeddingProvider`]. Avoids redundant
/// embedding calls when a reload finds an unchanged description.
pub struct LruEmbeddingCache {
    inner: Box<dyn EmbeddingProvider>,
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl LruEmbeddingCache {
    pub fn new(provider: Box<dyn EmbeddingProvider>, capacity: usize) -> Self {
        let cap = std::num::NonZeroUsize::new(capacity)
            .unwrap_or(std::num::NonZeroUsize::MIN.saturating_add(9_999));
        Self { inner: provider, cache: Mutex::new(LruCache::new(cap)) }
    }
}

#[async_trait]
impl EmbeddingProvider for LruEmbeddingCache {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        {
            let mut guard = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(hit) = guard.get(text) {
                return Ok(hit.clone());
            }
        }
        let embedding = self.inner.embed(text).await?;
        {
            let mut guard = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            guard.put(text.to_owned(), embedding.clone());
        }
        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_identical() {
        let v = vec![0.6f32, 0.8, 0.0];
        let score = cosine_similarity(&v, &v);
        assert!((score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn cosine_similarity_orthogonal() {
        let a = vec![1.0f32, 0.0, 0.0];
        let b = vec![0.0f32, 1.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 0.0).abs() < 1e-5);
    }

    #[test]
    fn cosine_similarity_zero_vector_no_panic() {
        let a = vec![0.0f32; 4];
        let b = vec![1.0f32, 0.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn cosine_similarity_mismatched_lengths() {
        let a = vec![1.0f32, 0.0];
        let b = vec![1.0f32, 0.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[tokio::test]
    async fn hash_provider_deterministic() {
        let provider = HashEmbeddingProvider::new();
        let e1 = provider.embed("find my documents").await.unwrap();
        let e2 = provider.embed("find my documents").await.unwrap();
        assert_eq!(e1, e2);
    }

    #[tokio::test]
    async fn hash_provider_different_texts_differ() {
        let provider = HashEmbeddingProvider::new();
        let e1 = provider.embed("get weather").await.unwrap();
        let e2 = provider.embed("convert currency").await.unwrap();
        assert_ne!(e1, e2);
    }

    #[tokio::test]
    async fn hash_provider_unit_normalised() {
        let provider = HashEmbeddingProvider::new();
        let e = provider.embed("normalise me").await.unwrap();
        let mag: f32 = e.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((mag - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn lru_cache_returns_same_result() {
        let cache = LruEmbeddingCache::new(Box::new(HashEmbeddingProvider::new()), 10);
        let first = cache.embed("test text").await.unwrap();
        let second = cache.embed("test text").await.unwrap();
        assert_eq!(first, second);
    }
}
