use std::sync::Arc;

use tracing::debug;

use trawl_core::query::{SearchRequest, TextMatch, DEFAULT_NUM_CANDIDATES};
use trawl_core::{Result, SearchMethod, SearchResult, StorageEngine};

/// Filtered kNN: nearest neighbours of the query vector among the chunks
/// that also match the prompt's text clause.
pub struct SemanticSearchEngine {
    storage: Arc<dyn StorageEngine>,
    num_candidates: usize,
}

impl SemanticSearchEngine {
    pub fn new(storage: Arc<dyn StorageEngine>) -> Self {
        Self { storage, num_candidates: DEFAULT_NUM_CANDIDATES }
    }

    pub fn with_num_candidates(mut self, num_candidates: usize) -> Self {
        self.num_candidates = num_candidates.max(1);
        self
    }

    pub async fn search(&self, prompt: &str, query_vector: &[f32], collection_ids: &[String], size: usize) -> Result<Vec<SearchResult>> {
        if collection_ids.is_empty() || size == 0 {
            return Ok(Vec::new());
        }
        let request = SearchRequest::Knn {
            vector: query_vector.to_vec(),
            k: size,
            num_candidates: self.num_candidates.max(size),
            filter: Some(TextMatch::for_prompt(prompt)),
        };
        let hits = self.storage.search(collection_ids, &request).await?;
        debug!(collections = collection_ids.len(), hits = hits.len(), "semantic search");
        Ok(hits
            .into_iter()
            .map(|hit| SearchResult { score: hit.score as f64, method: SearchMethod::Semantic.to_string(), chunk: hit.into_chunk() })
            .collect())
    }
}
