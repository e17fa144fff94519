use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use twox_hash::XxHash64;

use trawl_core::{Message, ModelBackend, ModelError};

pub const DEFAULT_HASH_DIM: usize = 384;

/// Deterministic bag-of-tokens embeddings. Texts sharing words land close to
/// each other, which is enough for offline runs and tests.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        let tokens = text
            .split_whitespace()
            .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|t| !t.is_empty());
        for (i, token) in tokens.enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i % 3) as f32 * 0.01;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        v
    }
}

#[async_trait]
impl ModelBackend for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    async fn complete(&self, _messages: &[Message]) -> Result<String, ModelError> {
        Err(ModelError::Unsupported("hash".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_words_score_higher() {
        let e = HashEmbedder::new(64);
        let a = e.embed_text("rust borrow checker");
        let b = e.embed_text("The borrow checker, in Rust!");
        let c = e.embed_text("sourdough bread recipe");
        let ab = trawl_core::similarity::cosine(&a, &b);
        let ac = trawl_core::similarity::cosine(&a, &c);
        assert!(ab > ac, "ab={ab} ac={ac}");
    }
}
