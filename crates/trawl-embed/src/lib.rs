//! trawl-embed
//!
//! Model backends (OpenAI-compatible HTTP, token hashing), the retry policy
//! applied to embedding calls, and the gateway the search and ingest paths
//! embed through.

pub mod gateway;
pub mod hashing;
pub mod openai;
pub mod retry;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use trawl_core::config::{EmbeddingSettings, ModelSettings, Provider};
use trawl_core::{Error, ModelBackend, ModelRegistry, ModelType, Result};

pub use gateway::{EmbeddingGateway, DEFAULT_BATCH_SIZE};
pub use hashing::{HashEmbedder, DEFAULT_HASH_DIM};
pub use openai::OpenAiBackend;
pub use retry::RetryPolicy;

const SIZING_TEXT: &str = "hello world";

impl From<&EmbeddingSettings> for RetryPolicy {
    fn from(settings: &EmbeddingSettings) -> Self {
        RetryPolicy::new(settings.max_attempts, Duration::from_millis(settings.retry_delay_ms))
    }
}

/// Builds the model registry from configuration.
///
/// Embedding models without a configured `vector_size` embed one sample
/// text to learn it. A model that cannot be reached is skipped with a
/// warning; the registry fails only when nothing configured is usable.
pub async fn connect_models(settings: &[ModelSettings]) -> Result<ModelRegistry> {
    let mut registry = ModelRegistry::new();
    for model in settings {
        let mut config = model.to_config();
        let backend: Arc<dyn ModelBackend> = match model.provider {
            Provider::OpenAi => {
                Arc::new(OpenAiBackend::new(&config, Duration::from_secs(model.timeout_secs))?)
            }
            Provider::Hash => {
                let embedder = HashEmbedder::new(model.vector_size.unwrap_or(DEFAULT_HASH_DIM));
                config.vector_size = Some(embedder.dim());
                Arc::new(embedder)
            }
        };

        if config.model_type == ModelType::Embeddings && config.vector_size.is_none() {
            match backend.embed(&[SIZING_TEXT.to_string()]).await {
                Ok(vectors) if vectors.first().is_some_and(|v| !v.is_empty()) => {
                    config.vector_size = vectors.first().map(Vec::len);
                }
                Ok(_) => {
                    warn!(model = %model.id, "model returned no embedding, skipping");
                    continue;
                }
                Err(e) => {
                    warn!(model = %model.id, error = %e, "model unreachable, skipping");
                    continue;
                }
            }
        }

        info!(model = %config.id, kind = %config.model_type, dims = ?config.vector_size, "model registered");
        registry.register(config, backend, &model.aliases)?;
    }

    if registry.is_empty() && !settings.is_empty() {
        return Err(Error::InvalidConfig("no configured model could be reached".into()));
    }
    Ok(registry)
}
