use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::error::{ModelError, Result};
use crate::query::SearchRequest;
use crate::storage::{ChunkFilter, ChunkRecord, DocumentBucket, Hit, IndexPattern, IndexSchema};
use crate::types::{CollectionMeta, Message};

/// A remote or local model endpoint.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// One vector per input text, in input order.
    async fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ModelError>;

    async fn complete(&self, messages: &[Message]) -> std::result::Result<String, ModelError>;

    /// Relevance of each input to `prompt`, in input order. Only dedicated
    /// rerank endpoints implement this.
    async fn rerank(&self, _prompt: &str, _inputs: &[String]) -> std::result::Result<Vec<f32>, ModelError> {
        Err(ModelError::Unsupported("rerank".into()))
    }
}

/// The contract every storage backend fulfils. One logical index per collection.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Returns `false` if the index already existed, in which case its schema
    /// and metadata are left untouched.
    async fn create_index(&self, id: &str, schema: &IndexSchema, meta: &CollectionMeta) -> Result<bool>;

    /// Dropping an absent index is not an error.
    async fn drop_index(&self, id: &str) -> Result<()>;

    async fn index_exists(&self, id: &str) -> Result<bool>;

    /// Metadata of the existing indices matching `pattern`; requested ids
    /// without an index are simply absent from the map.
    async fn list_index_meta(&self, pattern: &IndexPattern) -> Result<BTreeMap<String, CollectionMeta>>;

    async fn search(&self, indices: &[String], request: &SearchRequest) -> Result<Vec<Hit>>;

    /// Number of distinct `metadata.document_id` values in the index.
    async fn count_documents(&self, index: &str) -> Result<u64>;

    async fn document_buckets(&self, index: &str, limit: usize, offset: usize) -> Result<Vec<DocumentBucket>>;

    /// Inserts or replaces records by id. Every embedding must match the
    /// index's pinned vector size.
    async fn bulk_upsert(&self, index: &str, records: Vec<ChunkRecord>) -> Result<()>;

    /// Returns the number of removed chunks.
    async fn delete_by_filter(&self, index: &str, filter: &ChunkFilter) -> Result<u64>;
}
