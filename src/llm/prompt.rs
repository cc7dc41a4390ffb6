use regex::Regex;
use tracing::debug;

use crate::llm::LlmError;
use crate::llm::models::{IntentType, QueryIntentResult, RawIntentResponse};

pub const NO_EXPLANATION: &str = "No explanation provided.";

/// Builds the intent-classification prompt sent to every provider.
pub fn build_prompt(question: &str, schema: &str) -> String {
    format!(
        r#"
### Instructions:
You are a data analysis expert. Decide the **intent** of the user's question given the database schema below.

**Intent 1: Data Query (sql)**
The question asks for specific data (e.g. "how many users", "list products", "total sales"). Generate a SQL query that answers it.

**Intent 2: Meta-Data Question (meta)**
The question is about the structure of the data itself (e.g. "what is this database about?", "what columns are in orders?"). Answer it in natural language.

Adhere to these rules:
- **Use ONLY the tables and columns present in the schema**, spelled exactly as shown
- **Use Table Aliases** to prevent ambiguity
- When creating a ratio, always cast the numerator as float
- If the question cannot be answered from the schema, use "response_type": "error" and say why in the explanation

### Output Format:
Reply with a single minified JSON object and nothing else:
{{"response_type": "sql" | "meta" | "error", "sql_query": "SQL text, or null unless sql", "explanation": "a user-friendly explanation"}}

### Database Schema:
{}

### User Question:
{}
"#,
        schema, question
    )
}

/// Parses a model reply into a [`QueryIntentResult`].
///
/// Tolerates markdown fences and prose around the JSON object. A missing
/// `response_type` means `meta`; an unknown one is a [`LlmError::Format`].
pub fn parse_intent_response(content: &str) -> Result<QueryIntentResult, LlmError> {
    let json = extract_json_object(content)?;
    debug!("Intent JSON: {}", json);

    let raw: RawIntentResponse =
        serde_json::from_str(json).map_err(|e| LlmError::Format(e.to_string()))?;

    let intent = match raw.response_type.as_deref().map(str::trim) {
        None | Some("") => IntentType::Meta,
        Some(t) if t.eq_ignore_ascii_case("sql") => IntentType::Sql,
        Some(t) if t.eq_ignore_ascii_case("meta") => IntentType::Meta,
        Some(t) if t.eq_ignore_ascii_case("error") => IntentType::Error,
        Some(other) => {
            return Err(LlmError::Format(format!(
                "unknown response_type '{}'",
                other
            )));
        }
    };

    let explanation = raw
        .explanation
        .filter(|e| !e.trim().is_empty())
        .unwrap_or_else(|| NO_EXPLANATION.to_string());

    let query = match intent {
        IntentType::Sql => raw
            .sql_query
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty()),
        IntentType::Meta | IntentType::Error => None,
    };

    Ok(QueryIntentResult {
        intent,
        query,
        explanation,
    })
}

fn extract_json_object(content: &str) -> Result<&str, LlmError> {
    let fence = Regex::new(r"(?s)```(?:json)?\s*(.*?)```")
        .map_err(|e| LlmError::Format(e.to_string()))?;
    let body = fence
        .captures(content)
        .and_then(|c| c.get(1))
        .map_or(content, |m| m.as_str());

    let start = body.find('{');
    let end = body.rfind('}');
    match (start, end) {
        (Some(s), Some(e)) if s < e => Ok(&body[s..=e]),
        _ => Err(LlmError::Format("no JSON object in model reply".to_string())),
    }
}
