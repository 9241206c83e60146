//! OpenAI-compatible embeddings client.

use super::{Embedder, Embedding};
use crate::config::EmbeddingApiConfig;
use crate::error::{BenchError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Embedder backed by a `/v1/embeddings` endpoint.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    api: EmbeddingApiConfig,
    model: String,
    dimension: usize,
    batch_size: usize,
}

impl OpenAiEmbedder {
    pub fn new(
        api: EmbeddingApiConfig,
        model: String,
        dimension: usize,
        batch_size: usize,
    ) -> Result<Self> {
        if api.api_base.is_empty() {
            return Err(BenchError::Config(
                "Embedding API base URL is required. Set EMBEDDING_API_BASE or add it to the config file."
                    .to_string(),
            ));
        }
        if dimension == 0 || batch_size == 0 {
            return Err(BenchError::InvalidConfig(
                "embedding dimension and batch_size must be greater than 0".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(api.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api,
            model,
            dimension,
            batch_size,
        })
    }

    fn endpoint(&self) -> String {
        let base = self.api.api_base.trim_end_matches('/');
        format!("{}/v1/embeddings", base)
    }

    async fn request(&self, input: &[String]) -> Result<Vec<Embedding>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input,
            dimensions: self.dimension,
        };

        let mut builder = self.client.post(self.endpoint()).json(&request);
        if !self.api.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api.api_key);
        }
        let response = builder.send().await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if let Ok(api_error) = serde_json::from_str::<ApiError>(&body) {
                return Err(BenchError::Collaborator(format!(
                    "embedding API error ({}): {}",
                    status, api_error.error.message
                )));
            }
            return Err(BenchError::Collaborator(format!(
                "embedding request failed ({}): {}",
                status, body
            )));
        }

        let mut parsed: EmbeddingResponse = serde_json::from_str(&body)?;
        if parsed.data.len() != input.len() {
            return Err(BenchError::Collaborator(format!(
                "embedding API returned {} vectors for {} inputs",
                parsed.data.len(),
                input.len()
            )));
        }
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.request(batch).await?);
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
