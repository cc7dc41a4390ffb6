use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::db::DataSourceDescriptor;
use crate::schema::SchemaArtifacts;
use crate::store::{ConnectionStore, ConnectionSummary, StoreError, StoredConnection};

const STORE_FILE: &str = "connections.json";

/// Connections kept as a JSON array in `<data_dir>/connections.json`.
///
/// The whole file is rewritten on every change through a temp file and a
/// rename, so a crash never leaves a half-written store behind.
pub struct JsonFileStore {
    path: PathBuf,
    connections: RwLock<Vec<StoredConnection>>,
}

impl JsonFileStore {
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = data_dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(STORE_FILE);

        let connections = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => Vec::new(),
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        debug!("Loaded {} connections from {}", connections.len(), path.display());

        Ok(Self {
            path,
            connections: RwLock::new(connections),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Saves `connection`. Nothing changes, on disk or in memory, unless the
    /// write succeeds.
    pub async fn add(&self, connection: StoredConnection) -> Result<String, StoreError> {
        let id = connection.id.clone();
        let mut connections = self.connections.write().await;
        let mut next = connections.clone();
        next.push(connection);
        self.persist(&next).await?;
        *connections = next;
        info!("Saved connection {}", id);
        Ok(id)
    }

    /// Replaces the cached schema of `id` and stamps the refresh time.
    pub async fn update_artifacts(
        &self,
        id: &str,
        artifacts: SchemaArtifacts,
    ) -> Result<(), StoreError> {
        let mut connections = self.connections.write().await;
        let mut next = connections.clone();
        let connection = next
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        connection.artifacts = Some(artifacts);
        connection.refreshed_at = Some(Utc::now());
        self.persist(&next).await?;
        *connections = next;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<StoredConnection, StoreError> {
        self.connections
            .read()
            .await
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    pub async fn list(&self) -> Vec<ConnectionSummary> {
        self.connections
            .read()
            .await
            .iter()
            .map(StoredConnection::summary)
            .collect()
    }

    pub async fn remove(&self, id: &str) -> Result<(), StoreError> {
        let mut connections = self.connections.write().await;
        let next: Vec<StoredConnection> =
            connections.iter().filter(|c| c.id != id).cloned().collect();
        if next.len() == connections.len() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        self.persist(&next).await?;
        *connections = next;
        info!("Removed connection {}", id);
        Ok(())
    }

    async fn persist(&self, connections: &[StoredConnection]) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(connections)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ConnectionStore for JsonFileStore {
    async fn resolve_connection(&self, id: &str) -> Result<DataSourceDescriptor, StoreError> {
        Ok(self.get(id).await?.descriptor)
    }

    async fn cached_schema_artifacts(
        &self,
        id: &str,
    ) -> Result<Option<SchemaArtifacts>, StoreError> {
        Ok(self.get(id).await?.artifacts)
    }
}
