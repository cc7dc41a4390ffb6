//! Answers one question against one data source.
//!
//! `process_query` walks a fixed sequence of steps:
//! 1. resolve the source (directly supplied, or a saved connection id)
//! 2. obtain schema text, narrowed by semantic search unless the schema is large
//! 3. ask the LLM for an intent and, for data questions, a query
//! 4. execute the query through the data access manager
//!
//! Every failure after step 1 comes back as an error-typed
//! [`OrchestrationResponse`]. Only an invalid descriptor is returned as `Err`.

pub mod expansion;
pub mod response;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{LlmConfig, QueryConfig};
use crate::db::{DataAccess, DataAccessManager, DataSourceDescriptor, PoolRegistry};
use crate::embedding::Embedder;
use crate::error::{DataError, OrchestrationError};
use crate::llm::{IntentClassifier, IntentType, LlmError};
use crate::schema::{SchemaArtifacts, render_table_columns};
use crate::search::{DEFAULT_TOP_K, SemanticSchemaSearch};
use crate::store::{ConnectionStore, StoreError};

pub use expansion::{expand_with_identifiers, is_identifier_column};
pub use response::OrchestrationResponse;

const UNREADABLE_REPLY: &str =
    "The language model returned a reply that could not be understood. Please try rephrasing the question.";
const EMPTY_SQL: &str = "The question was identified as a data query but no query text was produced.";

/// Where a question should be answered.
#[derive(Debug, Clone)]
pub enum SourceRef {
    /// A saved connection, resolved through the [`ConnectionStore`].
    Connection(String),
    /// A descriptor supplied by the caller with schema artifacts it
    /// discovered itself.
    Direct {
        descriptor: DataSourceDescriptor,
        artifacts: Option<SchemaArtifacts>,
    },
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub top_k: usize,
    pub llm_timeout: Duration,
    pub query_timeout: Duration,
}

impl OrchestratorSettings {
    pub fn from_config(query: &QueryConfig, llm: &LlmConfig) -> Self {
        Self {
            top_k: query.top_k,
            llm_timeout: Duration::from_secs(llm.timeout_secs),
            query_timeout: Duration::from_secs(query.timeout_secs),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            llm_timeout: Duration::from_secs(60),
            query_timeout: Duration::from_secs(30),
        }
    }
}

pub struct QueryOrchestrator {
    store: Arc<dyn ConnectionStore>,
    llm: Arc<dyn IntentClassifier>,
    embedder: Arc<dyn Embedder>,
    registry: Arc<PoolRegistry>,
    settings: OrchestratorSettings,
}

impl QueryOrchestrator {
    pub fn new(
        store: Arc<dyn ConnectionStore>,
        llm: Arc<dyn IntentClassifier>,
        embedder: Arc<dyn Embedder>,
        registry: Arc<PoolRegistry>,
    ) -> Self {
        Self {
            store,
            llm,
            embedder,
            registry,
            settings: OrchestratorSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Answers `question` against `source`.
    ///
    /// Returns `Err` only for [`DataError::Configuration`]; everything else,
    /// including a missing source, is reported as an error response.
    pub async fn process_query(
        &self,
        question: &str,
        source: Option<SourceRef>,
    ) -> Result<OrchestrationResponse, DataError> {
        info!("Processing question: {}", question);
        match self.run(question, source).await {
            Ok(response) => {
                info!("Answered with {} response", response.response_type);
                Ok(response)
            }
            Err(OrchestrationError::Data(e)) if e.is_configuration() => {
                warn!("Rejecting request: {}", e);
                Err(e)
            }
            Err(e) => {
                warn!("Returning error response: {}", e);
                Ok(OrchestrationResponse::error(user_message(&e)))
            }
        }
    }

    async fn run(
        &self,
        question: &str,
        source: Option<SourceRef>,
    ) -> Result<OrchestrationResponse, OrchestrationError> {
        let (descriptor, artifacts) = self.resolve_source(source).await?;
        descriptor.validate()?;
        debug!("Resolved {} source", descriptor.kind);

        let artifacts = artifacts
            .filter(|a| !a.flat_elements.is_empty())
            .ok_or(OrchestrationError::NoSchema)?;
        let schema_text = self.schema_context(question, &artifacts).await?;
        debug!("Schema context is {} bytes", schema_text.len());

        let intent = bounded(
            self.settings.llm_timeout,
            self.llm.classify_and_generate(question, &schema_text),
        )
        .await
        .ok_or(OrchestrationError::LlmTimeout(self.settings.llm_timeout))??;
        info!("Classified question as {}", intent.intent);

        let query = match intent.intent {
            IntentType::Error => return Ok(OrchestrationResponse::error(intent.explanation)),
            IntentType::Meta => return Ok(OrchestrationResponse::meta(intent.explanation)),
            IntentType::Sql => match intent.query {
                Some(query) if !query.trim().is_empty() => query,
                _ => return Ok(OrchestrationResponse::error(EMPTY_SQL)),
            },
        };

        debug!("Executing generated query: {}", query);
        let manager = DataAccessManager::connect(&descriptor, &self.registry).await?;
        let rows = bounded(self.settings.query_timeout, manager.execute(&query))
            .await
            .ok_or(DataError::Timeout(self.settings.query_timeout))??;

        info!("Query returned {} rows", rows.len());
        Ok(OrchestrationResponse::sql(query, intent.explanation, rows))
    }

    async fn resolve_source(
        &self,
        source: Option<SourceRef>,
    ) -> Result<(DataSourceDescriptor, Option<SchemaArtifacts>), OrchestrationError> {
        match source {
            None => Err(OrchestrationError::MissingSource),
            Some(SourceRef::Direct {
                descriptor,
                artifacts,
            }) => Ok((descriptor, artifacts)),
            Some(SourceRef::Connection(id)) => {
                let descriptor = match self.store.resolve_connection(&id).await {
                    Ok(descriptor) => descriptor,
                    Err(StoreError::NotFound(_)) => return Err(OrchestrationError::MissingSource),
                    Err(e) => return Err(e.into()),
                };
                let artifacts = self.store.cached_schema_artifacts(&id).await?;
                Ok((descriptor, artifacts))
            }
        }
    }

    /// Schema text for the prompt. Large schemas are sent whole; smaller
    /// ones are narrowed to the nearest elements plus identifier columns.
    async fn schema_context(
        &self,
        question: &str,
        artifacts: &SchemaArtifacts,
    ) -> Result<String, OrchestrationError> {
        if artifacts.is_large {
            info!(
                "Schema is large, sending all {} elements",
                artifacts.flat_elements.len()
            );
            return Ok(render_table_columns(&artifacts.flat_elements));
        }

        let mut search = SemanticSchemaSearch::new(Arc::clone(&self.embedder));
        search.build_index(&artifacts.flat_elements).await?;
        let relevant = search.find_relevant(question, self.settings.top_k).await?;
        let expanded = expand_with_identifiers(&artifacts.flat_elements, &relevant);
        info!(
            "Narrowed schema to {} of {} elements ({} after expansion)",
            relevant.len(),
            artifacts.flat_elements.len(),
            expanded.len()
        );
        Ok(render_table_columns(&expanded))
    }
}

/// `None` when `future` did not finish within `limit`.
async fn bounded<F: Future>(limit: Duration, future: F) -> Option<F::Output> {
    tokio::time::timeout(limit, future).await.ok()
}

fn user_message(error: &OrchestrationError) -> String {
    match error {
        OrchestrationError::Llm(LlmError::Format(detail)) => {
            debug!("Unreadable LLM reply: {}", detail);
            UNREADABLE_REPLY.to_string()
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DataSourceKind;
    use crate::embedding::EmbeddingError;
    use crate::llm::QueryIntentResult;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ZeroEmbedder;

    #[async_trait]
    impl Embedder for ZeroEmbedder {
        fn model_name(&self) -> &str {
            "zero"
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(texts.iter().map(|_| vec![0.0; 2]).collect())
        }
    }

    /// Replies with a fixed result and remembers the schema text it saw.
    struct Scripted {
        reply: Result<QueryIntentResult, fn() -> LlmError>,
        seen_schema: Mutex<Option<String>>,
        delay: Duration,
    }

    impl Scripted {
        fn replying(reply: QueryIntentResult) -> Self {
            Self {
                reply: Ok(reply),
                seen_schema: Mutex::new(None),
                delay: Duration::ZERO,
            }
        }

        fn failing(error: fn() -> LlmError) -> Self {
            Self {
                reply: Err(error),
                seen_schema: Mutex::new(None),
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl IntentClassifier for Scripted {
        async fn classify_and_generate(
            &self,
            _question: &str,
            schema: &str,
        ) -> Result<QueryIntentResult, LlmError> {
            *self.seen_schema.lock().unwrap() = Some(schema.to_string());
            tokio::time::sleep(self.delay).await;
            match &self.reply {
                Ok(r) => Ok(r.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    fn orchestrator(llm: Arc<Scripted>) -> QueryOrchestrator {
        QueryOrchestrator::new(
            Arc::new(InMemoryStore::new()),
            llm,
            Arc::new(ZeroEmbedder),
            Arc::new(PoolRegistry::default()),
        )
    }

    fn csv_source(artifacts: Option<SchemaArtifacts>) -> Option<SourceRef> {
        Some(SourceRef::Direct {
            descriptor: DataSourceDescriptor::file(DataSourceKind::Csv, "/nonexistent/orders.csv"),
            artifacts,
        })
    }

    fn artifacts(elements: &[&str], is_large: bool) -> SchemaArtifacts {
        SchemaArtifacts {
            flat_elements: elements.iter().map(|s| s.to_string()).collect(),
            presentation_tree: Vec::new(),
            is_large,
        }
    }

    #[tokio::test]
    async fn missing_source_is_an_error_response() {
        let llm = Arc::new(Scripted::replying(QueryIntentResult::meta("x")));
        let r = orchestrator(llm).process_query("q", None).await.unwrap();
        assert!(r.is_error());
    }

    #[tokio::test]
    async fn unknown_connection_is_missing_source() {
        let llm = Arc::new(Scripted::replying(QueryIntentResult::meta("x")));
        let r = orchestrator(llm)
            .process_query("q", Some(SourceRef::Connection("nope".into())))
            .await
            .unwrap();
        assert_eq!(
            r.error_message(),
            Some(OrchestrationError::MissingSource.to_string().as_str())
        );
    }

    #[tokio::test]
    async fn empty_schema_is_no_schema() {
        let llm = Arc::new(Scripted::replying(QueryIntentResult::meta("x")));
        let o = orchestrator(llm.clone());
        for source in [csv_source(None), csv_source(Some(artifacts(&[], false)))] {
            let r = o.process_query("q", source).await.unwrap();
            assert_eq!(
                r.error_message(),
                Some(OrchestrationError::NoSchema.to_string().as_str())
            );
        }
        assert!(llm.seen_schema.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn invalid_descriptor_propagates() {
        let llm = Arc::new(Scripted::replying(QueryIntentResult::meta("x")));
        let source = Some(SourceRef::Direct {
            descriptor: DataSourceDescriptor::file(DataSourceKind::Csv, "  "),
            artifacts: Some(artifacts(&["t.a"], false)),
        });
        let err = orchestrator(llm).process_query("q", source).await.unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn meta_is_returned_verbatim() {
        let llm = Arc::new(Scripted::replying(QueryIntentResult::meta("Orders and customers.")));
        let r = orchestrator(llm)
            .process_query("what is this?", csv_source(Some(artifacts(&["orders.id"], false))))
            .await
            .unwrap();
        assert_eq!(r, OrchestrationResponse::meta("Orders and customers."));
    }

    #[tokio::test]
    async fn llm_error_intent_uses_its_explanation() {
        let llm = Arc::new(Scripted::replying(QueryIntentResult::error(
            "Cannot answer this question with the available data",
        )));
        let r = orchestrator(llm)
            .process_query("weather?", csv_source(Some(artifacts(&["orders.id"], false))))
            .await
            .unwrap();
        assert_eq!(
            r.error_message(),
            Some("Cannot answer this question with the available data")
        );
    }

    #[tokio::test]
    async fn sql_without_text_is_an_error() {
        let llm = Arc::new(Scripted::replying(QueryIntentResult {
            intent: IntentType::Sql,
            query: None,
            explanation: "x".into(),
        }));
        let r = orchestrator(llm)
            .process_query("q", csv_source(Some(artifacts(&["orders.id"], false))))
            .await
            .unwrap();
        assert_eq!(r.error_message(), Some(EMPTY_SQL));
    }

    #[tokio::test]
    async fn blank_sql_text_is_an_error() {
        let llm = Arc::new(Scripted::replying(QueryIntentResult::sql("   ", "x")));
        let r = orchestrator(llm)
            .process_query("q", csv_source(Some(artifacts(&["orders.id"], false))))
            .await
            .unwrap();
        assert_eq!(r.response_type, IntentType::Error);
        assert_eq!(r.error_message(), Some(EMPTY_SQL));
        assert!(r.query.is_empty());
    }

    #[tokio::test]
    async fn unreadable_reply_gets_generic_message() {
        let llm = Arc::new(Scripted::failing(|| LlmError::Format("trailing garbage".into())));
        let r = orchestrator(llm)
            .process_query("q", csv_source(Some(artifacts(&["orders.id"], false))))
            .await
            .unwrap();
        assert_eq!(r.error_message(), Some(UNREADABLE_REPLY));
    }

    #[tokio::test]
    async fn execution_failure_is_an_error_response() {
        let llm = Arc::new(Scripted::replying(QueryIntentResult::sql(
            "SELECT * FROM orders",
            "x",
        )));
        let r = orchestrator(llm)
            .process_query("q", csv_source(Some(artifacts(&["orders.id"], false))))
            .await
            .unwrap();
        assert!(r.is_error());
        assert!(r.query.is_empty());
    }

    #[tokio::test]
    async fn slow_llm_times_out() {
        let mut scripted = Scripted::replying(QueryIntentResult::meta("late"));
        scripted.delay = Duration::from_millis(200);
        let o = orchestrator(Arc::new(scripted)).with_settings(OrchestratorSettings {
            llm_timeout: Duration::from_millis(10),
            ..Default::default()
        });
        let r = o
            .process_query("q", csv_source(Some(artifacts(&["orders.id"], false))))
            .await
            .unwrap();
        assert!(r.is_error());
    }

    #[tokio::test]
    async fn large_schema_is_sent_whole() {
        let llm = Arc::new(Scripted::replying(QueryIntentResult::meta("x")));
        let elements = ["a.x", "a.y", "b.z"];
        orchestrator(llm.clone())
            .process_query("q", csv_source(Some(artifacts(&elements, true))))
            .await
            .unwrap();
        assert_eq!(
            llm.seen_schema.lock().unwrap().as_deref(),
            Some("Table a has columns: x, y\nTable b has columns: z")
        );
    }

    #[tokio::test]
    async fn small_schema_is_narrowed_to_top_k() {
        let llm = Arc::new(Scripted::replying(QueryIntentResult::meta("x")));
        let o = orchestrator(llm.clone()).with_settings(OrchestratorSettings {
            top_k: 1,
            ..Default::default()
        });
        // Every vector is equal, so the first element wins the tie.
        o.process_query("q", csv_source(Some(artifacts(&["a.v", "a.id", "b.w"], false))))
            .await
            .unwrap();
        assert_eq!(
            llm.seen_schema.lock().unwrap().as_deref(),
            Some("Table a has columns: v, id")
        );
    }
}
