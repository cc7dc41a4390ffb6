use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::embedding::{Embedder, EmbeddingError, check_vectors};

pub struct OllamaEmbedder {
    client: reqwest::Client,
    api_url: String,
    model: String,
    dims: Option<usize>,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let base = config
            .api_url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            api_url: format!("{}/api/embed", base.trim_end_matches('/')),
            model: config.model.clone(),
            dims: config.dims,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        debug!("Embedding {} texts with Ollama model {}", texts.len(), self.model);

        let response = self
            .client
            .post(&self.api_url)
            .json(&EmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| {
                EmbeddingError::Connection(format!(
                    "is Ollama running at {}? {}",
                    self.api_url, e
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Response(format!(
                "Ollama responded with status code: {} - {}",
                status, body
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::Response(e.to_string()))?;

        check_vectors(&parsed.embeddings, texts.len(), self.dims)?;
        Ok(parsed.embeddings)
    }
}
