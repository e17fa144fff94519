//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge `trawl.toml` + `trawl.<env>.toml` + `TRAWL_*` env vars
//! (nested keys separated by `__`, e.g. `TRAWL_STORAGE__BACKEND=vector`).
//! Provides helpers to expand `~` and `${VAR}` and to resolve relative paths
//! against a known base directory.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::models::{ModelConfig, ModelType};
use crate::query::DEFAULT_NUM_CANDIDATES;
use crate::types::{DEFAULT_K, DEFAULT_RFF_K};

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_from(Path::new("."), &env_name)
    }

    pub fn load_from(dir: &Path, env_name: &str) -> Result<Self> {
        let mut figment = Figment::new().merge(Toml::file(dir.join("trawl.toml")));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("trawl.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("trawl.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("trawl.test.toml"))),
            other => return Err(Error::InvalidConfig(format!("unknown environment '{other}'"))),
        }
        figment = figment.merge(Env::prefixed("TRAWL_").split("__"));
        Ok(Self { figment })
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("Failed to get '{}': {}", key, e)))
    }

    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(default)]
    pub embeddings: EmbeddingSettings,
    #[serde(default)]
    pub models: Vec<ModelSettings>,
}

impl Settings {
    fn validate(&self) -> Result<()> {
        if self.embeddings.batch_size == 0 {
            return Err(Error::InvalidConfig("embeddings.batch_size must be positive".into()));
        }
        if self.embeddings.max_attempts == 0 {
            return Err(Error::InvalidConfig("embeddings.max_attempts must be at least 1".into()));
        }
        for model in &self.models {
            if model.provider == Provider::OpenAi && model.url.is_empty() {
                return Err(Error::InvalidConfig(format!("model {} has no url", model.id)));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Inverted index with stored vectors.
    #[default]
    Tantivy,
    /// Pure vector store.
    Vector,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Data directory; the store lives in memory when unset.
    #[serde(default)]
    pub path: Option<String>,
}

impl StorageSettings {
    pub fn resolved_path(&self, base: &Path) -> Option<PathBuf> {
        self.path.as_deref().map(|p| resolve_with_base(base, p))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_rff_k")]
    pub rff_k: usize,
    #[serde(default = "default_num_candidates")]
    pub num_candidates: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self { k: DEFAULT_K, rff_k: DEFAULT_RFF_K, num_candidates: DEFAULT_NUM_CANDIDATES }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// OpenAI-compatible HTTP API.
    #[default]
    #[serde(rename = "openai")]
    OpenAi,
    /// Deterministic token-hash embeddings, no network.
    Hash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    pub id: String,
    #[serde(rename = "type")]
    pub model_type: ModelType,
    #[serde(default)]
    pub provider: Provider,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub vector_size: Option<usize>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub search_internet: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl ModelSettings {
    pub fn to_config(&self) -> ModelConfig {
        ModelConfig {
            id: self.id.clone(),
            model_type: self.model_type,
            vector_size: self.vector_size,
            base_url: self.url.clone(),
            api_key: self.key.clone(),
            supports_internet_search: self.search_internet,
        }
    }
}

fn default_k() -> usize {
    DEFAULT_K
}

fn default_rff_k() -> usize {
    DEFAULT_RFF_K
}

fn default_num_candidates() -> usize {
    DEFAULT_NUM_CANDIDATES
}

fn default_batch_size() -> usize {
    48
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2_000
}

fn default_timeout_secs() -> u64 {
    10
}

/// Expands `${VAR}`/`$VAR` and a leading `~`. Unknown variables are left as written.
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let raw = input.as_ref();
    let with_vars = shellexpand::env(raw).unwrap_or(Cow::Borrowed(raw));
    PathBuf::from(shellexpand::tilde(&with_vars).as_ref())
}

/// Expanded `path`, joined onto `base` unless already absolute.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, path: S) -> PathBuf {
    let path = expand_path(path);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}
