//! Deterministic feature-hashing embedder.

use super::{Embedder, Embedding};
use crate::error::{BenchError, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

/// Maps lowercase word unigrams and bigrams into `dimension` signed buckets.
///
/// Texts sharing vocabulary land close together, which is enough to make
/// retrieval quality differences between chunking strategies visible
/// without a model.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
    normalize: bool,
    name: String,
}

impl HashingEmbedder {
    pub fn new(dimension: usize, normalize: bool) -> Result<Self> {
        if dimension == 0 {
            return Err(BenchError::InvalidConfig(
                "hashing embedder dimension must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            dimension,
            normalize,
            name: format!("hashing-{}", dimension),
        })
    }

    /// Bucket and sign from SHA-256, so vectors are stable across toolchains.
    fn bucket(&self, feature: &str) -> (usize, f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let h = u64::from_le_bytes(head);
        let index = (h % self.dimension as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        (index, sign)
    }

    fn embed_text(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0f32; self.dimension];
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect();

        for word in &words {
            let (i, sign) = self.bucket(word);
            vector[i] += sign;
        }
        for pair in words.windows(2) {
            let (i, sign) = self.bucket(&format!("{} {}", pair[0], pair[1]));
            vector[i] += 0.5 * sign;
        }

        if self.normalize {
            let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                vector.iter_mut().for_each(|x| *x /= norm);
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[tokio::test]
    async fn test_deterministic_and_sized() {
        let embedder = HashingEmbedder::new(64, true).unwrap();
        let texts = vec!["The borrow checker".to_string(), "".to_string()];

        let first = embedder.embed_batch(&texts).await.unwrap();
        let second = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|v| v.len() == 64));
        assert!(first[1].iter().all(|&x| x == 0.0));
    }

    #[tokio::test]
    async fn test_shared_vocabulary_is_closer() {
        let embedder = HashingEmbedder::new(256, true).unwrap();
        let query = embedder.embed_query("rust memory safety").await.unwrap();
        let near = embedder
            .embed_query("Rust guarantees memory safety through ownership")
            .await
            .unwrap();
        let far = embedder
            .embed_query("Python was released in 1991")
            .await
            .unwrap();
        assert!(cosine_similarity(&query, &near) > cosine_similarity(&query, &far));
    }

    #[tokio::test]
    async fn test_buckets_are_pinned() {
        let embedder = HashingEmbedder::new(64, false).unwrap();

        let rust = embedder.embed_query("Rust").await.unwrap();
        assert_eq!(rust[18], -1.0);
        assert_eq!(rust.iter().filter(|&&x| x != 0.0).count(), 1);

        let borrow = embedder.embed_query("borrow").await.unwrap();
        assert_eq!(borrow[17], 1.0);

        let pair = embedder.embed_query("borrow checker").await.unwrap();
        assert_eq!(embedder.bucket("borrow checker"), (57, 1.0));
        assert_eq!(pair[57], 0.5);
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(HashingEmbedder::new(0, true).is_err());
    }
}
