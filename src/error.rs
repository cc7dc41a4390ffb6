use std::time::Duration;
use thiserror::Error;

use crate::embedding::EmbeddingError;
use crate::llm::LlmError;
use crate::search::SearchError;
use crate::store::StoreError;

/// Failures raised by a data access manager.
#[derive(Debug, Error)]
pub enum DataError {
    /// The descriptor is invalid for its kind. Raised at construction time.
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("connection error: {0}")]
    Connection(String),
    /// The backend rejected the submitted query.
    #[error("{0}")]
    Execution(String),
    #[error("query timed out after {0:?}")]
    Timeout(Duration),
}

impl DataError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, DataError::Configuration(_))
    }
}

impl From<duckdb::Error> for DataError {
    fn from(err: duckdb::Error) -> Self {
        DataError::Execution(err.to_string())
    }
}

impl From<r2d2::Error> for DataError {
    fn from(err: r2d2::Error) -> Self {
        DataError::Connection(err.to_string())
    }
}

impl From<sqlx::Error> for DataError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(e) => DataError::Configuration(e.to_string()),
            sqlx::Error::Io(e) => DataError::Connection(e.to_string()),
            sqlx::Error::Tls(e) => DataError::Connection(e.to_string()),
            sqlx::Error::PoolTimedOut => {
                DataError::Connection("timed out waiting for a pooled connection".to_string())
            }
            sqlx::Error::PoolClosed => DataError::Connection("connection pool closed".to_string()),
            other => DataError::Execution(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for DataError {
    fn from(err: tokio::task::JoinError) -> Self {
        DataError::Execution(format!("backend task failed: {}", err))
    }
}

/// Precondition and collaborator failures inside the orchestrator.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("no data source was supplied and none could be resolved")]
    MissingSource,
    #[error("no schema has been discovered for this data source")]
    NoSchema,
    #[error("the language model did not answer within {0:?}")]
    LlmTimeout(Duration),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}
