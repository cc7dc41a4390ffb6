//! Persistence for saved data-source connections and their cached schemas.

pub mod file;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::{DataSourceDescriptor, DataSourceKind};
use crate::schema::SchemaArtifacts;

pub use file::JsonFileStore;
pub use memory::InMemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection '{0}' not found")]
    NotFound(String),
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store data is corrupt: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A saved connection. `artifacts` is filled by discovery and replaced on refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredConnection {
    pub id: String,
    pub name: String,
    pub descriptor: DataSourceDescriptor,
    #[serde(default)]
    pub artifacts: Option<SchemaArtifacts>,
    pub created_at: DateTime<Utc>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl StoredConnection {
    pub fn new(name: impl Into<String>, descriptor: DataSourceDescriptor) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            descriptor,
            artifacts: None,
            created_at: Utc::now(),
            refreshed_at: None,
        }
    }

    pub fn summary(&self) -> ConnectionSummary {
        ConnectionSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            kind: self.descriptor.kind,
            element_count: self.artifacts.as_ref().map(|a| a.flat_elements.len()),
            is_large: self.artifacts.as_ref().map(|a| a.is_large),
            created_at: self.created_at,
            refreshed_at: self.refreshed_at,
        }
    }
}

/// Listing view of a connection. Carries no credentials.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConnectionSummary {
    pub id: String,
    pub name: String,
    pub kind: DataSourceKind,
    pub element_count: Option<usize>,
    pub is_large: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub refreshed_at: Option<DateTime<Utc>>,
}

/// Where the orchestrator looks up saved connections.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    async fn resolve_connection(&self, id: &str) -> Result<DataSourceDescriptor, StoreError>;

    /// Cached schema for `id`; `None` if the connection was never discovered.
    async fn cached_schema_artifacts(&self, id: &str)
    -> Result<Option<SchemaArtifacts>, StoreError>;
}
