//! Records exchanged with [`crate::traits::StorageEngine`] implementations.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Chunk, ChunkId, ChunkMetadata};

/// Schema pinned at index creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSchema {
    pub vector_size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexPattern {
    All,
    Ids(Vec<String>),
}

/// A chunk as persisted: `body`, `embedding` and `metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: ChunkId,
    pub body: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// A search hit. The embedding is never part of the returned payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub id: ChunkId,
    pub index: String,
    pub score: f32,
    pub body: String,
    pub metadata: ChunkMetadata,
}

impl Hit {
    pub fn into_chunk(self) -> Chunk {
        Chunk { id: self.id, content: self.body, metadata: self.metadata }
    }
}

/// Terms aggregation bucket over `metadata.document_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentBucket {
    pub document_id: String,
    pub chunk_count: u64,
    /// Metadata of the first chunk (lowest `document_part`) of the document.
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkFilter {
    Document(String),
}

/// Orders hits by score descending; ties keep their original order.
pub fn sort_hits(hits: &mut [Hit]) {
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
}

/// Orders buckets the way a terms aggregation does: largest first, then by key.
pub fn sort_buckets(buckets: &mut [DocumentBucket]) {
    buckets.sort_by(|a, b| {
        b.chunk_count
            .cmp(&a.chunk_count)
            .then_with(|| a.document_id.cmp(&b.document_id))
    });
}

/// Index ids double as file names for on-disk backends.
pub fn validate_index_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && !id.starts_with('.')
        && id.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!("invalid collection id '{id}'")))
    }
}
