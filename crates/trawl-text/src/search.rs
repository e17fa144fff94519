use std::sync::Arc;

use tracing::debug;

use trawl_core::query::{SearchRequest, TextMatch};
use trawl_core::{Result, SearchMethod, SearchResult, StorageEngine};

/// Relevance-ranked text search over already-authorized collections.
pub struct LexicalSearchEngine {
	storage: Arc<dyn StorageEngine>,
}

impl LexicalSearchEngine {
	pub fn new(storage: Arc<dyn StorageEngine>) -> Self {
		Self { storage }
	}

	pub async fn search(&self, prompt: &str, collection_ids: &[String], size: usize) -> Result<Vec<SearchResult>> {
		if collection_ids.is_empty() || size == 0 {
			return Ok(Vec::new());
		}
		let request = SearchRequest::Match { clause: TextMatch::for_prompt(prompt), size };
		let hits = self.storage.search(collection_ids, &request).await?;
		debug!(collections = collection_ids.len(), hits = hits.len(), "lexical search");
		Ok(hits
			.into_iter()
			.map(|hit| SearchResult { score: hit.score as f64, method: SearchMethod::Lexical.to_string(), chunk: hit.into_chunk() })
			.collect())
	}
}
