//! Local feature-hashing embedder

use async_trait::async_trait;

use ragpipe_core::{Embedder, Result};

/// Deterministic bag-of-words embedder that needs no model download.
///
/// Words and bigrams are hashed into a fixed number of buckets and the
/// resulting vector is L2-normalized, so cosine similarity approximates
/// lexical overlap. md5 keeps bucket assignment stable across toolchains,
/// which matters once vectors are persisted.
pub struct HashEmbedder {
    dimension: usize,
    model_id: String,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            model_id: format!("hash-{}", dimension),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn bucket(&self, feature: &str) -> (usize, u64) {
        let digest = md5::compute(feature.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest.0[..8]);
        let hash = u64::from_le_bytes(bytes);
        ((hash % self.dimension as u64) as usize, hash)
    }

    /// Generate the embedding synchronously
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let normalized_text = text
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric() || c.is_whitespace())
            .collect::<String>();

        let words: Vec<&str> = normalized_text.split_whitespace().collect();
        let mut embedding = vec![0.0f32; self.dimension];

        for (i, word) in words.iter().enumerate() {
            let (idx, hash) = self.bucket(word);
            let weight = 1.0 / (1.0 + i as f32 * 0.1);
            embedding[idx] += weight;

            if word.len() > 3 {
                let secondary_idx = ((hash >> 16) % self.dimension as u64) as usize;
                embedding[secondary_idx] += weight * 0.5;
            }
        }

        for window in words.windows(2) {
            let (idx, _) = self.bucket(&format!("{} {}", window[0], window[1]));
            embedding[idx] += 0.3;
        }

        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for val in &mut embedding {
                *val /= magnitude;
            }
        }

        embedding
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }
}
