//! Query dispatch: resolve and validate collections, then run the lexical,
//! semantic or hybrid path.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info};

use trawl_core::{Collection, CollectionRegistry, Error, Result, SearchMethod, SearchQuery, SearchResult, User};
use trawl_embed::EmbeddingGateway;
use trawl_text::LexicalSearchEngine;
use trawl_vector::SemanticSearchEngine;

use crate::fusion;

/// Hits requested from each engine when the caller sets no positive `k`.
pub const DEFAULT_FETCH_SIZE: usize = 10;

pub struct HybridQueryOrchestrator {
    registry: Arc<CollectionRegistry>,
    gateway: Arc<EmbeddingGateway>,
    lexical: Arc<LexicalSearchEngine>,
    semantic: Arc<SemanticSearchEngine>,
}

impl HybridQueryOrchestrator {
    pub fn new(
        registry: Arc<CollectionRegistry>,
        gateway: Arc<EmbeddingGateway>,
        lexical: Arc<LexicalSearchEngine>,
        semantic: Arc<SemanticSearchEngine>,
    ) -> Self {
        Self { registry, gateway, lexical, semantic }
    }

    pub async fn query(&self, query: &SearchQuery, user: &User) -> Result<Vec<SearchResult>> {
        let collections = self.registry.resolve(&query.collection_ids, user).await?;
        // Vectors from different models live in different spaces; refuse the
        // mix before any embedding call, whatever the method.
        let Some(model) = shared_model(&collections)? else {
            debug!(user = %user.id, "no collection to search");
            return Ok(Vec::new());
        };
        let ids: Vec<String> = collections.iter().map(|c| c.id.clone()).collect();
        let size = fetch_size(query.k);

        let results = match query.method {
            SearchMethod::Lexical => self.lexical.search(&query.prompt, &ids, size).await?,
            SearchMethod::Semantic => {
                let vector = self.gateway.embed_query(&query.prompt, model).await?;
                self.semantic.search(&query.prompt, &vector, &ids, size).await?
            }
            SearchMethod::Hybrid => {
                let vector = self.gateway.embed_query(&query.prompt, model).await?;
                let [lexical, semantic] = self.run_both(&query.prompt, vector, ids, size).await?;
                fusion::fuse(vec![lexical, semantic], query.k, query.rff_k)
            }
        };
        info!(method = %query.method, collections = collections.len(), results = results.len(), "query served");
        Ok(results)
    }

    /// Runs both engines as two tasks. Dropping the set, on error or when the
    /// caller goes away, aborts whichever task is still running.
    async fn run_both(&self, prompt: &str, vector: Vec<f32>, ids: Vec<String>, size: usize) -> Result<[Vec<SearchResult>; 2]> {
        let mut tasks = JoinSet::new();

        let lexical = Arc::clone(&self.lexical);
        let (lexical_prompt, lexical_ids) = (prompt.to_string(), ids.clone());
        tasks.spawn(async move { (0usize, lexical.search(&lexical_prompt, &lexical_ids, size).await) });

        let semantic = Arc::clone(&self.semantic);
        let semantic_prompt = prompt.to_string();
        tasks.spawn(async move { (1usize, semantic.search(&semantic_prompt, &vector, &ids, size).await) });

        let mut lists: [Vec<SearchResult>; 2] = Default::default();
        while let Some(joined) = tasks.join_next().await {
            let (slot, results) = joined.map_err(|e| Error::Storage(format!("search task failed: {e}")))?;
            lists[slot] = results?;
        }
        Ok(lists)
    }
}

/// The embedding model shared by every collection, `None` when there are none.
fn shared_model(collections: &[Collection]) -> Result<Option<&str>> {
    let mut models = collections.iter().map(|c| c.model.as_str());
    let Some(first) = models.next() else { return Ok(None) };
    if models.any(|m| m != first) {
        return Err(Error::DifferentCollectionsModels);
    }
    Ok(Some(first))
}

fn fetch_size(k: Option<usize>) -> usize {
    k.filter(|&k| k > 0).unwrap_or(DEFAULT_FETCH_SIZE)
}
