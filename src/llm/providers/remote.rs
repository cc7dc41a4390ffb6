use crate::config::LlmConfig;
use crate::llm::prompt::{build_prompt, parse_intent_response};
use crate::llm::providers::http_client;
use crate::llm::{IntentClassifier, LlmError, QueryIntentResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Any OpenAI-compatible chat completions endpoint.
pub struct RemoteLlmProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: usize,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

impl RemoteLlmProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_url = config.api_url.clone().ok_or_else(|| {
            LlmError::Config("API URL is required for remote LLM provider".to_string())
        })?;

        let api_key = config.api_key.clone().ok_or_else(|| {
            LlmError::Config("API key is required for remote LLM provider".to_string())
        })?;

        Ok(Self {
            client: http_client(config)?,
            api_url,
            api_key,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl IntentClassifier for RemoteLlmProvider {
    async fn classify_and_generate(
        &self,
        question: &str,
        schema: &str,
    ) -> Result<QueryIntentResult, LlmError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user".to_string(),
                content: build_prompt(question, schema),
            }],
            temperature: 0.1,
            max_tokens: 2000,
            response_format: ResponseFormat { kind: "json_object" },
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(LlmError::Response(format!(
                "API responded with status code: {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| LlmError::Response(format!("Failed to read response body: {}", e)))?;
        let content = reply_text(&body)?;

        debug!("Remote model replied with {} chars", content.len());
        parse_intent_response(&content)
    }
}

/// The first choice's message in a chat completions envelope.
fn reply_text(body: &str) -> Result<String, LlmError> {
    let chat: ChatResponse = serde_json::from_str(body)
        .map_err(|e| LlmError::Format(format!("Failed to parse chat response: {}", e)))?;
    chat.choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| LlmError::Format("No choices in response".to_string()))
}
