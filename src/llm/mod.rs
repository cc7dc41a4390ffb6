pub mod models;
pub mod prompt;
pub mod providers;

use crate::config::LlmConfig;
use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

pub use models::{IntentType, QueryIntentResult};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM connection error: {0}")]
    Connection(String),
    #[error("LLM response error: {0}")]
    Response(String),
    #[error("LLM configuration error: {0}")]
    Config(String),
    /// The reply arrived but could not be read as an intent.
    #[error("LLM reply was not in the expected format: {0}")]
    Format(String),
}

/// Sends a question and schema text to a model and returns its decision.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify_and_generate(
        &self,
        question: &str,
        schema: &str,
    ) -> Result<QueryIntentResult, LlmError>;
}

pub struct LlmManager {
    classifier: Box<dyn IntentClassifier>,
}

impl LlmManager {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let classifier: Box<dyn IntentClassifier> = match config.backend.as_str() {
            "remote" => Box::new(providers::remote::RemoteLlmProvider::new(config)?),
            "ollama" => Box::new(providers::ollama::OllamaProvider::new(config)?),
            "gemini" => Box::new(providers::gemini::GeminiProvider::new(config)?),
            _ => {
                return Err(LlmError::Config(format!(
                    "Unsupported LLM backend: {}",
                    config.backend
                )));
            }
        };

        info!("Using {} LLM backend with model {}", config.backend, config.model);
        Ok(Self { classifier })
    }
}

#[async_trait]
impl IntentClassifier for LlmManager {
    async fn classify_and_generate(
        &self,
        question: &str,
        schema: &str,
    ) -> Result<QueryIntentResult, LlmError> {
        self.classifier.classify_and_generate(question, schema).await
    }
}
