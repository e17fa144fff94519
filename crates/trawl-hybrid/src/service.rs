//! The retrieval facade: every operation takes the caller's [`User`] and
//! goes through the collection registry first.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use trawl_core::query::{SearchRequest, DEFAULT_NUM_CANDIDATES};
use trawl_core::storage::{ChunkFilter, ChunkRecord};
use trawl_core::types::ChunkId;
use trawl_core::{
    Chunk, ChunkMetadata, Collection, CollectionRegistry, Document, Error, Message, ModelBackend, ModelError, ModelType,
    NewCollection, Result, SearchQuery, SearchResult, StorageEngine, User,
};
use trawl_embed::EmbeddingGateway;
use trawl_text::LexicalSearchEngine;
use trawl_vector::SemanticSearchEngine;

use crate::orchestrator::HybridQueryOrchestrator;

/// A chunk to index; its id is derived on upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewChunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// A generated answer with the chunks it was grounded on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<SearchResult>,
}

/// Relevance of one rerank input; `index` points into the request inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rerank {
    pub index: usize,
    pub score: f32,
}

/// Stable chunk id: re-ingesting a document part overwrites it.
pub fn chunk_id(collection_id: &str, document_id: &str, part: u32) -> ChunkId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(collection_id.as_bytes());
    hasher.update(&[0]);
    hasher.update(document_id.as_bytes());
    hasher.update(&[0]);
    hasher.update(&part.to_le_bytes());
    hasher.finalize().to_hex().to_string()
}

pub struct RetrievalService {
    registry: Arc<CollectionRegistry>,
    gateway: Arc<EmbeddingGateway>,
    orchestrator: HybridQueryOrchestrator,
}

impl RetrievalService {
    pub fn new(storage: Arc<dyn StorageEngine>, gateway: EmbeddingGateway) -> Self {
        Self::with_num_candidates(storage, gateway, DEFAULT_NUM_CANDIDATES)
    }

    pub fn with_num_candidates(storage: Arc<dyn StorageEngine>, gateway: EmbeddingGateway, num_candidates: usize) -> Self {
        let registry = Arc::new(CollectionRegistry::new(storage.clone(), gateway.models().clone()));
        let gateway = Arc::new(gateway);
        let lexical = Arc::new(LexicalSearchEngine::new(storage.clone()));
        let semantic = Arc::new(SemanticSearchEngine::new(storage).with_num_candidates(num_candidates));
        let orchestrator = HybridQueryOrchestrator::new(registry.clone(), gateway.clone(), lexical, semantic);
        Self { registry, gateway, orchestrator }
    }

    pub fn registry(&self) -> &CollectionRegistry {
        &self.registry
    }

    pub fn gateway(&self) -> &EmbeddingGateway {
        &self.gateway
    }

    fn storage(&self) -> &Arc<dyn StorageEngine> {
        self.registry.storage()
    }

    pub async fn query(&self, query: &SearchQuery, user: &User) -> Result<Vec<SearchResult>> {
        self.orchestrator.query(query, user).await
    }

    pub async fn list_collections(&self, user: &User, collection_ids: &[String]) -> Result<Vec<Collection>> {
        self.registry.resolve(collection_ids, user).await
    }

    pub async fn create_collection(&self, request: NewCollection, user: &User) -> Result<Collection> {
        self.registry.create(request, user).await
    }

    pub async fn delete_collection(&self, collection_id: &str, user: &User) -> Result<()> {
        self.registry.delete(collection_id, user).await
    }

    /// Chunks of one document in part order; each carries its `collection_id`.
    pub async fn get_chunks(&self, collection_id: &str, document_id: &str, user: &User, limit: usize, offset: usize) -> Result<Vec<Chunk>> {
        let collection = self.registry.resolve_one(collection_id, user).await?;
        let request = SearchRequest::Document { document_id: document_id.to_string(), limit, offset };
        let hits = self.storage().search(&[collection.id.clone()], &request).await?;
        Ok(hits
            .into_iter()
            .map(|hit| {
                let mut chunk = hit.into_chunk();
                chunk.metadata.extra.insert("collection_id".to_string(), collection.id.clone().into());
                chunk
            })
            .collect())
    }

    /// Documents of a collection, largest first.
    pub async fn get_documents(&self, collection_id: &str, user: &User, limit: usize, offset: usize) -> Result<Vec<Document>> {
        let collection = self.registry.resolve_one(collection_id, user).await?;
        let buckets = self.storage().document_buckets(&collection.id, limit, offset).await?;
        Ok(buckets
            .into_iter()
            .map(|bucket| Document {
                id: bucket.document_id,
                name: bucket.metadata.document_name,
                created_at: bucket.metadata.document_created_at,
                chunks: bucket.chunk_count,
            })
            .collect())
    }

    pub async fn delete_document(&self, collection_id: &str, document_id: &str, user: &User) -> Result<()> {
        let collection = self.registry.resolve_one(collection_id, user).await?;
        collection.check_write_access(user)?;
        let removed = self
            .storage()
            .delete_by_filter(&collection.id, &ChunkFilter::Document(document_id.to_string()))
            .await?;
        info!(collection = %collection.id, document = %document_id, chunks = removed, "document deleted");
        Ok(())
    }

    /// Embeds and stores `chunks` with the collection's model. Returns the
    /// chunk ids in input order.
    pub async fn upsert(&self, collection_id: &str, chunks: Vec<NewChunk>, user: &User) -> Result<Vec<ChunkId>> {
        let collection = self.registry.resolve_one(collection_id, user).await?;
        collection.check_write_access(user)?;
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        check_distinct_parts(&chunks)?;

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.gateway.embed_batched(&texts, &collection.model).await?;
        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| ChunkRecord {
                id: chunk_id(&collection.id, &chunk.metadata.document_id, chunk.metadata.document_part),
                body: chunk.content,
                embedding,
                metadata: chunk.metadata,
            })
            .collect();
        let ids: Vec<ChunkId> = records.iter().map(|r| r.id.clone()).collect();

        self.storage().bulk_upsert(&collection.id, records).await?;
        info!(collection = %collection.id, chunks = ids.len(), "chunks upserted");
        Ok(ids)
    }

    /// Single completion on a language model.
    pub async fn complete(&self, model_id: &str, messages: &[Message]) -> Result<String> {
        let model = self.gateway.models().resolve(model_id)?;
        model.require(ModelType::Language)?;
        Ok(model.backend.complete(messages).await?)
    }

    /// Retrieval-augmented answer: runs `query`, then asks `model_id` to
    /// answer the prompt from the retrieved chunks only.
    pub async fn answer(&self, query: &SearchQuery, model_id: &str, user: &User) -> Result<Answer> {
        let model = self.gateway.models().resolve(model_id)?;
        model.require(ModelType::Language)?;

        let sources = self.query(query, user).await?;
        let messages = grounded_prompt(&query.prompt, &sources);
        let answer = model.backend.complete(&messages).await?;
        Ok(Answer { answer, sources })
    }

    /// Orders `inputs` by relevance to `prompt`, best first. Rerank models
    /// score natively; language models are asked for a 0 to 10 rating of each
    /// input.
    pub async fn rerank(&self, prompt: &str, inputs: &[String], model_id: &str) -> Result<Vec<Rerank>> {
        let model = self.gateway.models().resolve(model_id)?;
        let scores = match model.config.model_type {
            ModelType::Rerank => model.backend.rerank(prompt, inputs).await?,
            ModelType::Language => {
                let backend = model.backend.as_ref();
                try_join_all(inputs.iter().map(|input| rate(backend, prompt, input))).await?
            }
            ModelType::Embeddings => {
                return Err(Error::WrongModelType {
                    expected: format!("{} or {}", ModelType::Language, ModelType::Rerank),
                    found: model.config.model_type.to_string(),
                })
            }
        };
        if scores.len() != inputs.len() {
            return Err(Error::Model(ModelError::InvalidResponse(format!(
                "expected {} rerank scores, got {}",
                inputs.len(),
                scores.len()
            ))));
        }

        let mut ranked: Vec<Rerank> = scores.into_iter().enumerate().map(|(index, score)| Rerank { index, score }).collect();
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        debug!(model = %model.id(), inputs = inputs.len(), "reranked");
        Ok(ranked)
    }
}

/// Chunk ids derive from `(document_id, document_part)`, so two records
/// sharing both would overwrite each other.
pub fn check_distinct_parts(chunks: &[NewChunk]) -> Result<()> {
    let mut seen = HashSet::with_capacity(chunks.len());
    for chunk in chunks {
        let meta = &chunk.metadata;
        if !seen.insert((meta.document_id.as_str(), meta.document_part)) {
            return Err(Error::InvalidRequest(format!(
                "document {} has more than one chunk with part {}",
                meta.document_id, meta.document_part
            )));
        }
    }
    Ok(())
}

async fn rate(backend: &dyn ModelBackend, prompt: &str, input: &str) -> Result<f32> {
    let messages = vec![
        Message::system(
            "Rate how relevant the passage is to the question on a scale from 0 to 10. \
             Reply with the number only.",
        ),
        Message::user(format!("Question: {prompt}\n\nPassage:\n{input}")),
    ];
    let reply = backend.complete(&messages).await?;
    Ok(parse_rating(&reply))
}

/// First number in `reply`, clamped to the 0 to 10 scale; 0 when there is none.
fn parse_rating(reply: &str) -> f32 {
    reply
        .split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .find_map(|token| token.trim_matches('.').parse::<f32>().ok())
        .map_or(0.0, |score| score.clamp(0.0, 10.0))
}

fn grounded_prompt(prompt: &str, sources: &[SearchResult]) -> Vec<Message> {
    let context = sources
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let name = s.chunk.metadata.document_name.as_deref().unwrap_or(&s.chunk.metadata.document_id);
            format!("[{}] ({name})\n{}", i + 1, s.chunk.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    vec![
        Message::system(
            "Answer the question using only the numbered context passages. \
             Cite passages as [n]. If the context does not contain the answer, say so.",
        ),
        Message::user(format!("Context:\n{context}\n\nQuestion: {prompt}")),
    ]
}
