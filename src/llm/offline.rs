//! Deterministic local language model
//!
//! Embeddings are feature-hashed bags of lowercase words, so texts that
//! share words are similar and texts that share none score zero.
//! Completions echo a whitespace-collapsed prefix of the user prompt.

use async_trait::async_trait;

use super::error::LlmResult;
use super::LanguageModel;

/// Default dimensionality of offline embeddings
pub const DEFAULT_OFFLINE_DIMENSIONS: usize = 1024;

const COMPLETION_CHARS: usize = 280;

/// Offline [`LanguageModel`] with no network access
#[derive(Debug, Clone)]
pub struct OfflineModel {
    dimensions: usize,
}

impl Default for OfflineModel {
    fn default() -> Self {
        Self::new(DEFAULT_OFFLINE_DIMENSIONS)
    }
}

impl OfflineModel {
    /// Create a model producing vectors of `dimensions` components
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Embed synchronously
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            let hash = blake3::hash(token.as_bytes());
            let bytes = hash.as_bytes();
            let mut index_bytes = [0u8; 8];
            index_bytes.copy_from_slice(&bytes[..8]);
            let index = (u64::from_le_bytes(index_bytes) % self.dimensions as u64) as usize;
            vector[index] += 1.0;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in vector.iter_mut() {
                *x /= norm;
            }
        }

        vector
    }
}

#[async_trait]
impl LanguageModel for OfflineModel {
    async fn embed(&self, text: &str) -> LlmResult<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    async fn quick_complete(&self, _system: &str, user: &str) -> LlmResult<String> {
        let collapsed = user.split_whitespace().collect::<Vec<_>>().join(" ");
        Ok(collapsed.chars().take(COMPLETION_CHARS).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "offline"
    }
}
