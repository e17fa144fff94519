//! Embedding gateway: model lookup, batching and timeout retries.

use std::sync::Arc;

use trawl_core::{Error, ModelError, ModelHandle, ModelRegistry, ModelType, Result};

use crate::retry::RetryPolicy;

pub const DEFAULT_BATCH_SIZE: usize = 48;

pub struct EmbeddingGateway {
    models: Arc<ModelRegistry>,
    policy: RetryPolicy,
    batch_size: usize,
}

impl EmbeddingGateway {
    pub fn new(models: Arc<ModelRegistry>) -> Self {
        Self { models, policy: RetryPolicy::default(), batch_size: DEFAULT_BATCH_SIZE }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn models(&self) -> &Arc<ModelRegistry> {
        &self.models
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Embeds `texts` in one backend request. Only timeouts are retried;
    /// every other failure surfaces immediately.
    pub async fn embed(&self, texts: &[String], model_id: &str) -> Result<Vec<Vec<f32>>> {
        let model = self.embedding_model(model_id)?;
        self.embed_with(model, texts).await
    }

    pub async fn embed_query(&self, prompt: &str, model_id: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[prompt.to_string()], model_id).await?;
        vectors
            .pop()
            .ok_or_else(|| ModelError::InvalidResponse("empty embedding response".into()).into())
    }

    /// Embeds `texts` in slices of `batch_size`, one request per slice,
    /// keeping input order.
    pub async fn embed_batched(&self, texts: &[String], model_id: &str) -> Result<Vec<Vec<f32>>> {
        let model = self.embedding_model(model_id)?;
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.embed_with(model, batch).await?);
        }
        Ok(vectors)
    }

    fn embedding_model(&self, model_id: &str) -> Result<&ModelHandle> {
        let model = self.models.resolve(model_id)?;
        model.require(ModelType::Embeddings)?;
        Ok(model)
    }

    async fn embed_with(&self, model: &ModelHandle, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self
            .policy
            .run(ModelError::is_timeout, || model.backend.embed(texts))
            .await?;

        if vectors.len() != texts.len() {
            return Err(ModelError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            ))
            .into());
        }
        if let Some(expected) = model.config.vector_size {
            if let Some(v) = vectors.iter().find(|v| v.len() != expected) {
                return Err(Error::DimensionMismatch { expected, found: v.len() });
            }
        }
        Ok(vectors)
    }
}
