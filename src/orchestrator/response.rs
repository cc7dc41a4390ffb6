use serde::Serialize;
use serde_json::Value;

use crate::db::Record;
use crate::llm::IntentType;

/// What the caller gets back for every question, success or not.
///
/// `rows` is empty unless `response_type` is `sql` and execution succeeded;
/// error responses carry the message as the single row's `error` field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationResponse {
    pub response_type: IntentType,
    pub query: String,
    pub explanation: String,
    pub rows: Vec<Record>,
}

impl OrchestrationResponse {
    pub fn sql(query: impl Into<String>, explanation: impl Into<String>, rows: Vec<Record>) -> Self {
        Self {
            response_type: IntentType::Sql,
            query: query.into(),
            explanation: explanation.into(),
            rows,
        }
    }

    pub fn meta(explanation: impl Into<String>) -> Self {
        Self {
            response_type: IntentType::Meta,
            query: String::new(),
            explanation: explanation.into(),
            rows: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        let mut row = Record::new();
        row.insert("error".to_string(), Value::String(message.clone()));
        Self {
            response_type: IntentType::Error,
            query: String::new(),
            explanation: message,
            rows: vec![row],
        }
    }

    pub fn is_error(&self) -> bool {
        self.response_type == IntentType::Error
    }

    /// The message of an error response.
    pub fn error_message(&self) -> Option<&str> {
        if !self.is_error() {
            return None;
        }
        self.rows.first()?.get("error")?.as_str()
    }
}
