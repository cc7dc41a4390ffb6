use std::sync::Arc;
use tracing::{info, warn};

use crate::db::{DataAccess, DataAccessManager, DataSourceDescriptor, PoolRegistry};
use crate::error::DataError;
use crate::schema::size::{LARGE_SCHEMA_TOKENS, TokenCounter, is_large_schema, whitespace_token_count};
use crate::schema::{
    SchemaArtifacts, SchemaElement, TypedColumn, build_presentation_tree, render_table_columns,
};

/// Connects to a data source and produces its cached schema artifacts.
///
/// Read-only against the source and stateless between calls, so a refresh is
/// simply another `discover`.
pub struct SchemaDiscoveryService {
    registry: Arc<PoolRegistry>,
    token_counter: TokenCounter,
    large_threshold: usize,
}

impl SchemaDiscoveryService {
    pub fn new(registry: Arc<PoolRegistry>) -> Self {
        Self {
            registry,
            token_counter: whitespace_token_count,
            large_threshold: LARGE_SCHEMA_TOKENS,
        }
    }

    pub fn with_token_counter(mut self, counter: TokenCounter) -> Self {
        self.token_counter = counter;
        self
    }

    pub fn with_large_threshold(mut self, threshold: usize) -> Self {
        self.large_threshold = threshold;
        self
    }

    pub async fn discover(
        &self,
        descriptor: &DataSourceDescriptor,
    ) -> Result<SchemaArtifacts, DataError> {
        info!("Discovering schema for {} source", descriptor.kind);
        let manager = DataAccessManager::connect(descriptor, &self.registry).await?;
        self.discover_with(&manager).await
    }

    /// Runs discovery against an already constructed backend.
    pub async fn discover_with(&self, manager: &dyn DataAccess) -> Result<SchemaArtifacts, DataError> {
        let flat_elements = manager.list_schema_elements().await?;

        let typed = match manager.list_typed_columns().await {
            Ok(typed) => typed,
            Err(e) => {
                warn!("Column types unavailable, continuing without them: {}", e);
                Vec::new()
            }
        };

        let artifacts = self.artifacts_from(flat_elements, &typed);
        info!(
            "Discovered {} schema elements across {} schemas (large: {})",
            artifacts.flat_elements.len(),
            artifacts.presentation_tree.len(),
            artifacts.is_large
        );
        Ok(artifacts)
    }

    pub fn artifacts_from(
        &self,
        flat_elements: Vec<SchemaElement>,
        typed: &[TypedColumn],
    ) -> SchemaArtifacts {
        let presentation_tree = build_presentation_tree(&flat_elements, typed);
        let rendered = render_table_columns(&flat_elements);
        let is_large = is_large_schema(&rendered, self.token_counter, self.large_threshold);
        SchemaArtifacts {
            flat_elements,
            presentation_tree,
            is_large,
        }
    }
}
