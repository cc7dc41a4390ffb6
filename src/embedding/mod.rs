//! Embedding providers.
//!
//! The process builds one [`Embedder`] at startup with [`create_embedder`]
//! and shares it read-only (`Arc<dyn Embedder>`) across every request.
//! - **[`OllamaEmbedder`]** calls a local Ollama instance's `/api/embed`.
//! - **[`OpenAiEmbedder`]** calls an OpenAI-compatible `/v1/embeddings`.

pub mod ollama;
pub mod openai;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::config::EmbeddingConfig;

pub use ollama::OllamaEmbedder;
pub use openai::OpenAiEmbedder;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding connection error: {0}")]
    Connection(String),
    #[error("embedding response error: {0}")]
    Response(String),
    #[error("embedding configuration error: {0}")]
    Config(String),
}

/// Turns text into fixed-length vectors. Every call within a process must
/// return vectors of the same dimension.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::Response("empty embedding response".to_string()))
    }
}

pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, EmbeddingError> {
    match config.backend.as_str() {
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        other => Err(EmbeddingError::Config(format!(
            "Unsupported embedding backend: {}",
            other
        ))),
    }
}

/// Checks a provider response: one vector per input, all of the expected size.
pub(crate) fn check_vectors(
    vectors: &[Vec<f32>],
    expected_count: usize,
    dims: Option<usize>,
) -> Result<(), EmbeddingError> {
    if vectors.len() != expected_count {
        return Err(EmbeddingError::Response(format!(
            "expected {} embeddings, got {}",
            expected_count,
            vectors.len()
        )));
    }
    let dims = dims.or_else(|| vectors.first().map(Vec::len));
    if let Some(dims) = dims {
        if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
            return Err(EmbeddingError::Response(format!(
                "embedding dimension {} does not match expected {}",
                bad.len(),
                dims
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_checks() {
        let ok = vec![vec![0.0; 3], vec![1.0; 3]];
        assert!(check_vectors(&ok, 2, None).is_ok());
        assert!(check_vectors(&ok, 2, Some(3)).is_ok());
        assert!(check_vectors(&ok, 3, None).is_err());
        assert!(check_vectors(&ok, 2, Some(4)).is_err());

        let ragged = vec![vec![0.0; 3], vec![1.0; 2]];
        assert!(check_vectors(&ragged, 2, None).is_err());
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let config = EmbeddingConfig {
            backend: "carrier-pigeon".into(),
            ..Default::default()
        };
        assert!(matches!(create_embedder(&config), Err(EmbeddingError::Config(_))));
    }
}
