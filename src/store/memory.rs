use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::db::DataSourceDescriptor;
use crate::schema::SchemaArtifacts;
use crate::store::{ConnectionStore, StoreError, StoredConnection};

/// Process-local store, used by tests and one-shot CLI runs.
#[derive(Default)]
pub struct InMemoryStore {
    connections: RwLock<HashMap<String, StoredConnection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, connection: StoredConnection) -> String {
        let id = connection.id.clone();
        self.connections.write().await.insert(id.clone(), connection);
        id
    }

    pub async fn get(&self, id: &str) -> Option<StoredConnection> {
        self.connections.read().await.get(id).cloned()
    }
}

#[async_trait]
impl ConnectionStore for InMemoryStore {
    async fn resolve_connection(&self, id: &str) -> Result<DataSourceDescriptor, StoreError> {
        self.connections
            .read()
            .await
            .get(id)
            .map(|c| c.descriptor.clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn cached_schema_artifacts(
        &self,
        id: &str,
    ) -> Result<Option<SchemaArtifacts>, StoreError> {
        self.connections
            .read()
            .await
            .get(id)
            .map(|c| c.artifacts.clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DataSourceKind;

    #[tokio::test]
    async fn insert_and_resolve() {
        let store = InMemoryStore::new();
        let descriptor = DataSourceDescriptor::file(DataSourceKind::Csv, "orders.csv");
        let id = store.insert(StoredConnection::new("orders", descriptor.clone())).await;

        assert_eq!(store.resolve_connection(&id).await.unwrap(), descriptor);
        assert!(store.cached_schema_artifacts(&id).await.unwrap().is_none());
        assert!(matches!(
            store.resolve_connection("missing").await,
            Err(StoreError::NotFound(_))
        ));
    }
}
