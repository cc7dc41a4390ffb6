use crate::config::LlmConfig;
use crate::llm::prompt::{build_prompt, parse_intent_response};
use crate::llm::providers::http_client;
use crate::llm::{IntentClassifier, LlmError, QueryIntentResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Google Gemini via the `generateContent` REST endpoint.
pub struct GeminiProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Content,
}

impl GeminiProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            LlmError::Config("API key is required for the Gemini provider".to_string())
        })?;

        let model = if config.model.trim().is_empty() {
            DEFAULT_MODEL.to_string()
        } else {
            config.model.clone()
        };
        let base = config.api_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let endpoint = format!(
            "{}/models/{}:generateContent",
            base.trim_end_matches('/'),
            model
        );

        Ok(Self {
            client: http_client(config)?,
            endpoint,
            api_key,
            model,
        })
    }
}

#[async_trait]
impl IntentClassifier for GeminiProvider {
    async fn classify_and_generate(
        &self,
        question: &str,
        schema: &str,
    ) -> Result<QueryIntentResult, LlmError> {
        info!("Sending request to Gemini with model: {}", self.model);

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: build_prompt(question, schema),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.1,
                response_mime_type: "application/json",
            },
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError::Response(format!(
                "Gemini responded with status code: {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| LlmError::Response(format!("Failed to read response body: {}", e)))?;
        let text = reply_text(&body)?;

        debug!("Gemini replied with {} chars", text.len());
        parse_intent_response(&text)
    }
}

/// Concatenated parts of the first candidate.
fn reply_text(body: &str) -> Result<String, LlmError> {
    let reply: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| LlmError::Format(format!("Failed to parse Gemini response: {}", e)))?;
    reply
        .candidates
        .into_iter()
        .next()
        .map(|c| c.content.parts.into_iter().map(|p| p.text).collect())
        .ok_or_else(|| LlmError::Format("No candidates in response".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_text_joins_candidate_parts() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"{\"a\":"},{"text":"1}"}]}}]}"#;
        assert_eq!(reply_text(body).unwrap(), r#"{"a":1}"#);
        assert!(matches!(reply_text(r#"{"candidates":[]}"#), Err(LlmError::Format(_))));
        assert!(matches!(reply_text(""), Err(LlmError::Format(_))));
    }

    #[test]
    fn endpoint_uses_default_model() {
        let config = LlmConfig {
            backend: "gemini".into(),
            model: String::new(),
            api_key: Some("k".into()),
            ..Default::default()
        };
        let provider = GeminiProvider::new(&config).unwrap();
        assert_eq!(
            provider.endpoint,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn key_is_required() {
        let config = LlmConfig {
            backend: "gemini".into(),
            ..Default::default()
        };
        assert!(matches!(GeminiProvider::new(&config), Err(LlmError::Config(_))));
    }
}
