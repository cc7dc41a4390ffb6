use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info};

use crate::config::ObjectStoreConfig;
use crate::db::descriptor::{DataSourceKind, RelationalConnectionParams};
use crate::db::relational::RelationalPool;
use crate::error::DataError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PoolKey {
    kind: DataSourceKind,
    params: RelationalConnectionParams,
}

/// Process-lifetime home of relational connection pools and backend settings.
///
/// Pools are created on first use for a given set of connection parameters
/// and reused by every later request against the same source. The map lock
/// is only held to find a source's slot, so a slow connect to one source
/// never blocks lookups for another.
pub struct PoolRegistry {
    pools: Mutex<HashMap<PoolKey, Arc<OnceCell<RelationalPool>>>>,
    pool_size: u32,
    acquire_timeout: Duration,
    object_store: ObjectStoreConfig,
}

impl PoolRegistry {
    pub fn new(pool_size: u32, object_store: ObjectStoreConfig) -> Self {
        Self {
            pools: Mutex::new(HashMap::new()),
            pool_size: pool_size.max(1),
            acquire_timeout: Duration::from_secs(10),
            object_store,
        }
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn pool_size(&self) -> u32 {
        self.pool_size
    }

    pub fn object_store(&self) -> &ObjectStoreConfig {
        &self.object_store
    }

    /// Returns the pool for these parameters, connecting it if needed.
    pub async fn relational_pool(
        &self,
        kind: DataSourceKind,
        params: &RelationalConnectionParams,
    ) -> Result<RelationalPool, DataError> {
        let key = PoolKey {
            kind,
            params: params.clone(),
        };

        let slot = {
            let mut pools = self.pools.lock().await;
            Arc::clone(pools.entry(key).or_default())
        };
        if let Some(pool) = slot.get() {
            debug!("Reusing {} pool for {:?}", kind, params.database);
            return Ok(pool.clone());
        }

        // Concurrent callers for the same source wait on one connect. A failed
        // connect leaves the slot empty for the next caller to retry.
        let pool = slot
            .get_or_try_init(|| async {
                info!(
                    "Opening {} pool to {:?}/{:?} (max {} connections)",
                    kind, params.host, params.database, self.pool_size
                );
                RelationalPool::connect(kind, params, self.pool_size, self.acquire_timeout).await
            })
            .await?;
        Ok(pool.clone())
    }

    pub async fn open_pools(&self) -> usize {
        self.pools
            .lock()
            .await
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new(5, ObjectStoreConfig::default())
    }
}
