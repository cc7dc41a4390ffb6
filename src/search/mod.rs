pub mod index;

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::embedding::{Embedder, EmbeddingError};
use crate::schema::SchemaElement;

pub use index::FlatL2Index;

pub const DEFAULT_TOP_K: usize = 15;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("cannot build a search index over an empty schema")]
    EmptyInput,
    #[error("search index has not been built")]
    NotInitialized,
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

/// Finds the schema elements closest in meaning to a question.
///
/// One instance serves one request. The embedder is shared process-wide and
/// only read.
pub struct SemanticSchemaSearch {
    embedder: Arc<dyn Embedder>,
    index: Option<FlatL2Index>,
    elements: Vec<SchemaElement>,
}

impl SemanticSchemaSearch {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            index: None,
            elements: Vec::new(),
        }
    }

    pub fn is_built(&self) -> bool {
        self.index.is_some()
    }

    /// Embeds every element and replaces the current index.
    ///
    /// On failure the previous index, if any, stays in place.
    pub async fn build_index(&mut self, elements: &[SchemaElement]) -> Result<(), SearchError> {
        if elements.is_empty() {
            return Err(SearchError::EmptyInput);
        }

        let vectors = self.embedder.embed_batch(elements).await?;
        let dims = vectors.first().map(Vec::len).unwrap_or_default();

        let mut index = FlatL2Index::new(dims);
        for vector in vectors {
            if !index.add(vector) {
                return Err(EmbeddingError::Response(format!(
                    "embedding dimension does not match {}",
                    dims
                ))
                .into());
            }
        }
        if index.len() != elements.len() {
            return Err(EmbeddingError::Response(format!(
                "expected {} embeddings, got {}",
                elements.len(),
                index.len()
            ))
            .into());
        }

        info!(
            "Built schema index over {} elements ({} dims, model {})",
            index.len(),
            dims,
            self.embedder.model_name()
        );
        self.index = Some(index);
        self.elements = elements.to_vec();
        Ok(())
    }

    /// The `k` elements nearest to `question`, nearest first.
    pub async fn find_relevant(
        &self,
        question: &str,
        k: usize,
    ) -> Result<Vec<SchemaElement>, SearchError> {
        let index = self.index.as_ref().ok_or(SearchError::NotInitialized)?;
        let query = self.embedder.embed(question).await?;
        if query.len() != index.dims() {
            return Err(EmbeddingError::Response(format!(
                "question embedding has {} dims, index has {}",
                query.len(),
                index.dims()
            ))
            .into());
        }

        let hits = index.search(&query, k);
        debug!("Semantic search returned {} of {} elements", hits.len(), index.len());
        Ok(hits
            .into_iter()
            .map(|(i, _)| self.elements[i].clone())
            .collect())
    }
}
