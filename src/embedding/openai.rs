use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::embedding::{Embedder, EmbeddingError, check_vectors};

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    dims: Option<usize>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            EmbeddingError::Config("API key is required for the openai embedding backend".to_string())
        })?;

        let api_url = config
            .api_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1/embeddings".to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            api_url,
            api_key,
            model: config.model.clone(),
            dims: config.dims,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        debug!("Embedding {} texts with {}", texts.len(), self.model);

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| EmbeddingError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EmbeddingError::Response(format!(
                "API responded with status code: {}",
                response.status()
            )));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Response(e.to_string()))?;

        // The API does not promise response order.
        parsed.data.sort_by_key(|d| d.index);
        let vectors: Vec<Vec<f32>> = parsed.data.into_iter().map(|d| d.embedding).collect();

        check_vectors(&vectors, texts.len(), self.dims)?;
        Ok(vectors)
    }
}
