use crate::config::LlmConfig;
use crate::llm::prompt::{build_prompt, parse_intent_response};
use crate::llm::providers::http_client;
use crate::llm::{IntentClassifier, LlmError, QueryIntentResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

pub struct OllamaProvider {
    client: reqwest::Client,
    api_url: String,
    model: String,
}

#[derive(Serialize, Debug)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    format: &'static str,
    options: OllamaOptions,
}

#[derive(Serialize, Debug)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize, Debug)]
struct OllamaResponse {
    response: String,
}

impl OllamaProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_url = config
            .api_url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434/api/generate".to_string());

        Ok(Self {
            client: http_client(config)?,
            api_url,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl IntentClassifier for OllamaProvider {
    async fn classify_and_generate(
        &self,
        question: &str,
        schema: &str,
    ) -> Result<QueryIntentResult, LlmError> {
        info!("Sending request to Ollama with model: {}", self.model);
        debug!("API URL: {}", self.api_url);

        let request = OllamaRequest {
            model: &self.model,
            prompt: build_prompt(question, schema),
            stream: false,
            format: "json",
            options: OllamaOptions { temperature: 0.1 },
        };

        let response = self
            .client
            .post(&self.api_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = match response.text().await {
                Ok(body) => format!(" - Response body: {}", body),
                Err(_) => String::new(),
            };

            error!("Ollama API responded with status code: {}{}", status, error_body);
            return Err(LlmError::Response(format!(
                "Ollama API responded with status code: {}{}",
                status, error_body
            )));
        }

        let response_text = response
            .text()
            .await
            .map_err(|e| LlmError::Response(format!("Failed to read response body: {}", e)))?;

        debug!("Raw response from Ollama: {}", response_text);

        parse_intent_response(&reply_text(&response_text)?)
    }
}

/// The generated text inside an `/api/generate` envelope.
fn reply_text(body: &str) -> Result<String, LlmError> {
    let envelope: OllamaResponse = serde_json::from_str(body).map_err(|e| {
        error!("Failed to parse Ollama response: {}", e);
        LlmError::Format(format!("Failed to parse Ollama response: {}", e))
    })?;
    Ok(envelope.response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_text_reads_the_envelope() {
        let body = r#"{"model":"llama3","response":"{\"response_type\":\"meta\"}","done":true}"#;
        assert_eq!(reply_text(body).unwrap(), r#"{"response_type":"meta"}"#);
    }

    #[test]
    fn broken_envelope_is_a_format_error() {
        assert!(matches!(reply_text("<html>"), Err(LlmError::Format(_))));
        assert!(matches!(reply_text(r#"{"done":true}"#), Err(LlmError::Format(_))));
    }
}
