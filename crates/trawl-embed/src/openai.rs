//! OpenAI-compatible HTTP backend (`/embeddings`, `/chat/completions`,
//! and the `/rerank` route served by text-embeddings-inference).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use trawl_core::{Message, ModelBackend, ModelConfig, ModelError};

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    texts: &'a [String],
}

#[derive(Debug, Deserialize)]
struct RerankItem {
    index: usize,
    score: f32,
}

pub struct OpenAiBackend {
    client: Client,
    model: String,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiBackend {
    /// Every request made by this backend is bounded by `timeout`.
    pub fn new(config: &ModelConfig, timeout: Duration) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ModelError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            model: config.id.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, ModelError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body).map_err(|e| ModelError::InvalidResponse(e.to_string()))?;
        let mut request = self
            .client
            .post(self.endpoint(path))
            .header("Content-Type", "application/json")
            .body(payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        let text = response.text().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(ModelError::Status { status: status.as_u16(), body: text });
        }
        serde_json::from_str(&text).map_err(|e| ModelError::InvalidResponse(format!("{e}: {text}")))
    }
}

fn map_transport_error(e: reqwest::Error) -> ModelError {
    if e.is_timeout() {
        ModelError::Timeout(e.to_string())
    } else {
        ModelError::Transport(e.to_string())
    }
}

#[async_trait]
impl ModelBackend for OpenAiBackend {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(model = %self.model, batch = texts.len(), "embedding request");
        let request = EmbeddingRequest { model: &self.model, input: texts };
        let response: EmbeddingResponse = self.post("embeddings", &request).await?;

        let mut data = response.data;
        // Some servers return items out of order; `index` is authoritative when present.
        if data.iter().all(|d| d.index.is_some()) {
            data.sort_by_key(|d| d.index);
        }
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    async fn complete(&self, messages: &[Message]) -> Result<String, ModelError> {
        let request = ChatRequest { model: &self.model, messages, stream: false };
        let response: ChatResponse = self.post("chat/completions", &request).await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ModelError::InvalidResponse("no completion in response".into()))
    }

    async fn rerank(&self, prompt: &str, inputs: &[String]) -> Result<Vec<f32>, ModelError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        debug!(model = %self.model, inputs = inputs.len(), "rerank request");
        let request = RerankRequest { query: prompt, texts: inputs };
        let items: Vec<RerankItem> = self.post("rerank", &request).await?;
        scores_by_index(items, inputs.len())
    }
}

/// Rerank servers answer best-first; scores go back to input order.
fn scores_by_index(items: Vec<RerankItem>, expected: usize) -> Result<Vec<f32>, ModelError> {
    let mut scores = vec![None; expected];
    for item in items {
        let slot = scores
            .get_mut(item.index)
            .ok_or_else(|| ModelError::InvalidResponse(format!("rerank index {} out of range", item.index)))?;
        *slot = Some(item.score);
    }
    scores
        .into_iter()
        .enumerate()
        .map(|(i, score)| score.ok_or_else(|| ModelError::InvalidResponse(format!("no rerank score for input {i}"))))
        .collect()
}
