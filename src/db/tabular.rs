use arrow::json::writer::{JsonArray, WriterBuilder};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use duckdb::Connection;
use r2d2::Pool;
use tracing::{debug, info};

use crate::config::ObjectStoreConfig;
use crate::db::db_pool::DuckDBConnectionManager;
use crate::db::descriptor::{DataSourceKind, FileLocation};
use crate::db::pool_registry::PoolRegistry;
use crate::db::{DataAccess, Record};
use crate::error::DataError;
use crate::schema::{SchemaElement, TypedColumn};

/// Data access over a single file loaded into an in-memory DuckDB dataset.
///
/// The dataset is the only table the manager exposes; its name is derived
/// from the file name (see [`dataset_name`]).
pub struct TabularManager {
    pool: Pool<DuckDBConnectionManager>,
    dataset: String,
}

impl TabularManager {
    pub async fn load(
        kind: DataSourceKind,
        location: &FileLocation,
        registry: &PoolRegistry,
    ) -> Result<Self, DataError> {
        let dataset = dataset_name(location);
        let reader = reader_sql(kind, location)?;
        let setup = setup_statements(kind, location, registry.object_store())?;
        let create_sql = format!(
            "CREATE TABLE {} AS SELECT * FROM {}",
            quote_ident(&dataset),
            reader
        );

        info!("Loading {} source {} as dataset '{}'", kind, location.as_str(), dataset);
        let display = location.as_str().to_string();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, DataError> {
            let conn = Connection::open_in_memory()
                .map_err(|e| DataError::Connection(format!("failed to start DuckDB: {}", e)))?;
            for statement in &setup {
                conn.execute_batch(statement).map_err(|e| {
                    DataError::Connection(format!("failed to prepare access to {}: {}", display, e))
                })?;
            }
            conn.execute_batch(&create_sql)
                .map_err(|e| DataError::Connection(format!("failed to load {}: {}", display, e)))?;
            Ok(conn)
        })
        .await??;

        let pool_size = registry.pool_size();
        let pool = tokio::task::spawn_blocking(move || {
            Pool::builder()
                .max_size(pool_size)
                .build(DuckDBConnectionManager::new(conn))
        })
        .await??;

        Ok(Self { pool, dataset })
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }
}

#[async_trait]
impl DataAccess for TabularManager {
    async fn list_schema_elements(&self) -> Result<Vec<SchemaElement>, DataError> {
        let elements: Vec<SchemaElement> = self
            .list_typed_columns()
            .await?
            .into_iter()
            .map(|c| format!("{}.{}", c.table, c.column))
            .collect();
        debug!("Discovered {} columns in dataset '{}'", elements.len(), self.dataset);
        Ok(elements)
    }

    async fn list_typed_columns(&self) -> Result<Vec<TypedColumn>, DataError> {
        let pool = self.pool.clone();
        let dataset = self.dataset.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<TypedColumn>, DataError> {
            let conn = pool.get()?;
            let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_literal(&dataset)))?;
            let columns = stmt
                .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(columns
                .into_iter()
                .map(|(column, data_type)| TypedColumn {
                    schema: None,
                    table: dataset.clone(),
                    column,
                    data_type,
                })
                .collect())
        })
        .await?
    }

    /// Runs `query` on a blocking thread. DuckDB offers no interrupt here, so
    /// a caller that stops waiting (for example on timeout) does not cancel
    /// the statement: it runs to completion, holding its pooled connection
    /// and blocking thread until then.
    async fn execute(&self, query: &str) -> Result<Vec<Record>, DataError> {
        let pool = self.pool.clone();
        let query = query.to_string();
        tokio::task::spawn_blocking(move || -> Result<Vec<Record>, DataError> {
            let conn = pool.get()?;
            let mut stmt = conn.prepare(&query)?;
            let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();
            batches_to_records(&batches)
        })
        .await?
    }
}

/// Serialises Arrow batches into one JSON object per row, nulls included.
fn batches_to_records(batches: &[RecordBatch]) -> Result<Vec<Record>, DataError> {
    if batches.iter().all(|b| b.num_rows() == 0) {
        return Ok(Vec::new());
    }

    let mut writer = WriterBuilder::new()
        .with_explicit_nulls(true)
        .build::<_, JsonArray>(Vec::new());
    let refs: Vec<&RecordBatch> = batches.iter().collect();
    writer
        .write_batches(&refs)
        .and_then(|_| writer.finish())
        .map_err(|e| DataError::Execution(format!("failed to serialise results: {}", e)))?;

    serde_json::from_slice(&writer.into_inner())
        .map_err(|e| DataError::Execution(format!("failed to read serialised results: {}", e)))
}

/// Table name for a loaded file: its lowercased stem with anything outside
/// `[a-z0-9_]` replaced by `_`.
pub fn dataset_name(location: &FileLocation) -> String {
    let mut name = String::new();
    for c in location.file_stem().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            name.push(c);
        } else if !name.ends_with('_') {
            name.push('_');
        }
    }
    let name = name.trim_matches('_');
    if name.is_empty() {
        "data".to_string()
    } else if name.starts_with(|c: char| c.is_ascii_digit()) {
        format!("t_{}", name)
    } else {
        name.to_string()
    }
}

fn reader_sql(kind: DataSourceKind, location: &FileLocation) -> Result<String, DataError> {
    let path = quote_literal(location.as_str());
    match kind {
        DataSourceKind::Csv => Ok(format!("read_csv_auto({})", path)),
        DataSourceKind::Excel => Ok(format!("st_read({})", path)),
        other => Err(DataError::Configuration(format!(
            "{} is not a file-backed source",
            other
        ))),
    }
}

/// Extension loading and credentials needed before the file can be read.
fn setup_statements(
    kind: DataSourceKind,
    location: &FileLocation,
    object_store: &ObjectStoreConfig,
) -> Result<Vec<String>, DataError> {
    let mut statements = Vec::new();

    match location.scheme() {
        None => {}
        Some("http") | Some("https") => {
            statements.push("INSTALL httpfs; LOAD httpfs;".to_string());
        }
        Some("s3") => {
            statements.push("INSTALL httpfs; LOAD httpfs;".to_string());
            if let Some(secret) = s3_secret(object_store) {
                statements.push(secret);
            }
        }
        Some(other) => {
            return Err(DataError::Configuration(format!(
                "unsupported file location scheme '{}'",
                other
            )));
        }
    }

    if kind == DataSourceKind::Excel {
        statements.push("INSTALL spatial; LOAD spatial;".to_string());
    }
    Ok(statements)
}

fn s3_secret(config: &ObjectStoreConfig) -> Option<String> {
    let mut options = Vec::new();
    if let Some(key_id) = &config.access_key_id {
        options.push(format!("KEY_ID {}", quote_literal(key_id)));
    }
    if let Some(secret) = &config.secret_access_key {
        options.push(format!("SECRET {}", quote_literal(secret)));
    }
    if let Some(token) = &config.session_token {
        options.push(format!("SESSION_TOKEN {}", quote_literal(token)));
    }
    if let Some(region) = &config.region {
        options.push(format!("REGION {}", quote_literal(region)));
    }
    if let Some(endpoint) = &config.endpoint {
        options.push(format!("ENDPOINT {}", quote_literal(endpoint)));
    }
    if options.is_empty() {
        return None;
    }
    Some(format!(
        "CREATE OR REPLACE SECRET querai_s3 (TYPE S3, {})",
        options.join(", ")
    ))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
