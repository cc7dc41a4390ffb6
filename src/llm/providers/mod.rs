pub mod gemini;
pub mod ollama;
pub mod remote;

use std::time::Duration;

use crate::config::LlmConfig;
use crate::llm::LlmError;

pub(crate) fn http_client(config: &LlmConfig) -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| LlmError::Connection(e.to_string()))
}
