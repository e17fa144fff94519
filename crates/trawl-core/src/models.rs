//! Model registry: resolves a model id or alias to its configuration and backend.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::traits::ModelBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelType {
    #[serde(rename = "text-embeddings-inference")]
    Embeddings,
    #[serde(rename = "text-generation")]
    Language,
    #[serde(rename = "text-classification")]
    Rerank,
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelType::Embeddings => "text-embeddings-inference",
            ModelType::Language => "text-generation",
            ModelType::Rerank => "text-classification",
        })
    }
}

/// Immutable description of one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub model_type: ModelType,
    pub vector_size: Option<usize>,
    pub base_url: String,
    pub api_key: Option<String>,
    pub supports_internet_search: bool,
}

#[derive(Clone)]
pub struct ModelHandle {
    pub config: ModelConfig,
    pub backend: Arc<dyn ModelBackend>,
}

impl ModelHandle {
    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn require(&self, expected: ModelType) -> Result<()> {
        if self.config.model_type != expected {
            return Err(Error::WrongModelType {
                expected: expected.to_string(),
                found: self.config.model_type.to_string(),
            });
        }
        Ok(())
    }

    pub fn vector_size(&self) -> Result<usize> {
        self.config
            .vector_size
            .ok_or_else(|| Error::InvalidConfig(format!("model {} has no vector size", self.config.id)))
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle").field("config", &self.config).finish_non_exhaustive()
    }
}

#[derive(Debug, Default, Clone)]
pub struct ModelRegistry {
    models: HashMap<String, ModelHandle>,
    aliases: HashMap<String, String>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a backend under its id and any aliases. Embedding models must
    /// already know their vector size.
    pub fn register(&mut self, config: ModelConfig, backend: Arc<dyn ModelBackend>, aliases: &[String]) -> Result<()> {
        if self.models.contains_key(&config.id) || self.aliases.contains_key(&config.id) {
            return Err(Error::InvalidConfig(format!("model id {} is duplicated", config.id)));
        }
        if config.model_type == ModelType::Embeddings && config.vector_size.is_none() {
            return Err(Error::InvalidConfig(format!("embeddings model {} has no vector size", config.id)));
        }
        for alias in aliases {
            if self.models.contains_key(alias) || self.aliases.contains_key(alias) {
                return Err(Error::InvalidConfig(format!("model alias {alias} is duplicated")));
            }
        }
        for alias in aliases {
            self.aliases.insert(alias.clone(), config.id.clone());
        }
        self.models.insert(config.id.clone(), ModelHandle { config, backend });
        Ok(())
    }

    pub fn resolve(&self, alias: &str) -> Result<&ModelHandle> {
        let id = self.aliases.get(alias).map(String::as_str).unwrap_or(alias);
        self.models.get(id).ok_or_else(|| Error::ModelNotFound(alias.to_string()))
    }

    pub fn configs(&self) -> Vec<&ModelConfig> {
        let mut configs: Vec<&ModelConfig> = self.models.values().map(|m| &m.config).collect();
        configs.sort_by(|a, b| a.id.cmp(&b.id));
        configs
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
