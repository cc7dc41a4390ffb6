use serde::{Deserialize, Serialize};

/// What the model decided the question needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentType {
    /// A query must be generated and run.
    Sql,
    /// Answerable from the schema alone.
    Meta,
    /// Not answerable from this source.
    Error,
}

impl std::fmt::Display for IntentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            IntentType::Sql => "sql",
            IntentType::Meta => "meta",
            IntentType::Error => "error",
        };
        f.write_str(name)
    }
}

/// Classified intent plus generated query. `query` is only set for `Sql`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryIntentResult {
    pub intent: IntentType,
    pub query: Option<String>,
    pub explanation: String,
}

impl QueryIntentResult {
    pub fn sql(query: impl Into<String>, explanation: impl Into<String>) -> Self {
        Self {
            intent: IntentType::Sql,
            query: Some(query.into()),
            explanation: explanation.into(),
        }
    }

    pub fn meta(explanation: impl Into<String>) -> Self {
        Self {
            intent: IntentType::Meta,
            query: None,
            explanation: explanation.into(),
        }
    }

    pub fn error(explanation: impl Into<String>) -> Self {
        Self {
            intent: IntentType::Error,
            query: None,
            explanation: explanation.into(),
        }
    }
}

// Shape the model is asked to answer in. Fields are loose on purpose so a
// partially filled object still parses.
#[derive(Debug, Deserialize)]
pub(crate) struct RawIntentResponse {
    pub response_type: Option<String>,
    pub sql_query: Option<String>,
    pub explanation: Option<String>,
}
