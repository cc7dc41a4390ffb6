pub mod db_pool;
pub mod descriptor;
pub mod pool_registry;
pub mod relational;
pub mod tabular;

use async_trait::async_trait;

use crate::error::DataError;
use crate::schema::{SchemaElement, TypedColumn, render_table_columns};

pub use descriptor::{
    DataSourceDescriptor, DataSourceKind, FileLocation, RelationalConnectionParams,
    SourceConnection,
};
pub use pool_registry::PoolRegistry;
pub use relational::RelationalManager;
pub use tabular::TabularManager;

/// One result row, column name to value.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Schema introspection and query execution over one backend.
#[async_trait]
pub trait DataAccess: Send + Sync {
    /// Compact `Table <t> has columns: ...` text for the whole source.
    async fn describe_schema(&self) -> Result<String, DataError> {
        Ok(render_table_columns(&self.list_schema_elements().await?))
    }

    async fn list_schema_elements(&self) -> Result<Vec<SchemaElement>, DataError>;

    /// Columns with their backend types. Best effort; callers tolerate failure.
    async fn list_typed_columns(&self) -> Result<Vec<TypedColumn>, DataError>;

    /// Runs `query` and materialises every result row.
    async fn execute(&self, query: &str) -> Result<Vec<Record>, DataError>;
}

/// The backend chosen for a data source, dispatched on the descriptor's kind.
pub enum DataAccessManager {
    Relational(RelationalManager),
    Tabular(TabularManager),
}

impl DataAccessManager {
    /// Builds the manager for `descriptor`.
    ///
    /// An invalid descriptor fails with [`DataError::Configuration`] before
    /// any backend is contacted.
    pub async fn connect(
        descriptor: &DataSourceDescriptor,
        registry: &PoolRegistry,
    ) -> Result<Self, DataError> {
        descriptor.validate()?;
        match &descriptor.connection {
            SourceConnection::Relational(params) => {
                let pool = registry.relational_pool(descriptor.kind, params).await?;
                Ok(DataAccessManager::Relational(RelationalManager::new(pool)))
            }
            SourceConnection::File(location) => Ok(DataAccessManager::Tabular(
                TabularManager::load(descriptor.kind, location, registry).await?,
            )),
        }
    }

    fn backend(&self) -> &dyn DataAccess {
        match self {
            DataAccessManager::Relational(manager) => manager,
            DataAccessManager::Tabular(manager) => manager,
        }
    }
}

#[async_trait]
impl DataAccess for DataAccessManager {
    async fn describe_schema(&self) -> Result<String, DataError> {
        self.backend().describe_schema().await
    }

    async fn list_schema_elements(&self) -> Result<Vec<SchemaElement>, DataError> {
        self.backend().list_schema_elements().await
    }

    async fn list_typed_columns(&self) -> Result<Vec<TypedColumn>, DataError> {
        self.backend().list_typed_columns().await
    }

    async fn execute(&self, query: &str) -> Result<Vec<Record>, DataError> {
        self.backend().execute(query).await
    }
}
