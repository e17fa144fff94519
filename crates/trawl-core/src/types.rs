//! Domain types shared by the registry, the search engines and the storage backends.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

pub type ChunkId = String;

pub const DEFAULT_K: usize = 4;
pub const DEFAULT_RFF_K: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionType {
    #[default]
    Private,
    Public,
}

impl fmt::Display for CollectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CollectionType::Private => "private",
            CollectionType::Public => "public",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
}

/// Caller identity supplied by the auth layer for every operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub role: Role,
}

impl User {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self { id: id.into(), role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Index-level metadata written once when a collection is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionMeta {
    pub name: String,
    #[serde(rename = "type")]
    pub collection_type: CollectionType,
    pub model: String,
    pub user: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: i64,
    #[serde(default)]
    pub documents: u64,
}

/// A named, access-scoped container of indexed chunks.
///
/// `documents` is never persisted incrementally; the registry recomputes it
/// from the chunk store every time a collection is resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub collection_type: CollectionType,
    pub model: String,
    pub user: String,
    pub description: Option<String>,
    pub created_at: i64,
    pub documents: u64,
}

impl Collection {
    pub fn from_meta(id: impl Into<String>, meta: CollectionMeta) -> Self {
        Self {
            id: id.into(),
            name: meta.name,
            collection_type: meta.collection_type,
            model: meta.model,
            user: meta.user,
            description: meta.description,
            created_at: meta.created_at,
            documents: meta.documents,
        }
    }

    /// Owners always see their collections; everybody sees public ones.
    pub fn is_visible_to(&self, user: &User) -> bool {
        self.user == user.id || self.collection_type == CollectionType::Public
    }

    /// Public collections are administered by admins only.
    pub fn check_write_access(&self, user: &User) -> Result<(), Error> {
        if self.collection_type == CollectionType::Public && !user.is_admin() {
            return Err(Error::InsufficientRights);
        }
        Ok(())
    }
}

/// Chunk metadata: typed document fields plus arbitrary extra keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub document_id: String,
    #[serde(default)]
    pub document_name: Option<String>,
    #[serde(default)]
    pub document_part: u32,
    #[serde(default)]
    pub document_created_at: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// The smallest retrievable unit of text, as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// A document as seen through aggregation of its chunks' metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub name: Option<String>,
    pub created_at: Option<i64>,
    pub chunks: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMethod {
    Lexical,
    #[default]
    Semantic,
    Hybrid,
}

impl SearchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMethod::Lexical => "lexical",
            SearchMethod::Semantic => "semantic",
            SearchMethod::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lexical" => Ok(SearchMethod::Lexical),
            "semantic" => Ok(SearchMethod::Semantic),
            "hybrid" => Ok(SearchMethod::Hybrid),
            other => Err(format!("unknown search method '{other}'")),
        }
    }
}

/// One ranked hit. `method` names the retrieval path(s) that produced it,
/// e.g. `lexical`, `semantic` or `lexical/semantic` after fusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub score: f64,
    pub chunk: Chunk,
    pub method: String,
}

/// Request-scoped search parameters.
///
/// `k = None` asks for every hit the engines return (see fusion for how
/// `Some(0)` is treated).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub prompt: String,
    #[serde(default)]
    pub collection_ids: Vec<String>,
    #[serde(default)]
    pub method: SearchMethod,
    #[serde(default = "default_k")]
    pub k: Option<usize>,
    #[serde(default = "default_rff_k")]
    pub rff_k: usize,
}

fn default_k() -> Option<usize> {
    Some(DEFAULT_K)
}

fn default_rff_k() -> usize {
    DEFAULT_RFF_K
}

impl SearchQuery {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            collection_ids: Vec::new(),
            method: SearchMethod::default(),
            k: default_k(),
            rff_k: DEFAULT_RFF_K,
        }
    }

    pub fn collections<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.collection_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn method(mut self, method: SearchMethod) -> Self {
        self.method = method;
        self
    }

    pub fn k(mut self, k: Option<usize>) -> Self {
        self.k = k;
        self
    }

    pub fn rff_k(mut self, rff_k: usize) -> Self {
        self.rff_k = rff_k;
        self
    }
}

/// Chat message passed to completion backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}
