use async_trait::async_trait;
use serde_json::Value;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::postgres::types::{Oid, PgInterval};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::{Decimal, Json, Uuid};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::time::Duration;
use tracing::debug;

use crate::db::descriptor::{DataSourceKind, RelationalConnectionParams};
use crate::db::{DataAccess, Record};
use crate::error::DataError;
use crate::schema::{SchemaElement, TypedColumn};

/// Catalog and system schemas that never hold user data.
const SYSTEM_SCHEMAS: &[&str] = &[
    "information_schema",
    "pg_catalog",
    "pg_toast",
    "performance_schema",
    "mysql",
    "sys",
    "topology",
    "tiger",
    "tiger_data",
];

pub fn is_system_schema(name: &str) -> bool {
    let lower = name.to_lowercase();
    SYSTEM_SCHEMAS.contains(&lower.as_str())
        || lower.starts_with("pg_temp_")
        || lower.starts_with("pg_toast_temp_")
}

const PG_COLUMNS_SQL: &str = "
    SELECT table_schema::text, table_name::text, column_name::text, data_type::text
    FROM information_schema.columns
    ORDER BY table_schema, table_name, ordinal_position";

// MySQL 8 reports information_schema text as binary unless cast.
const MYSQL_COLUMNS_SQL: &str = "
    SELECT CAST(table_schema AS CHAR), CAST(table_name AS CHAR),
           CAST(column_name AS CHAR), CAST(data_type AS CHAR)
    FROM information_schema.columns
    ORDER BY table_schema, table_name, ordinal_position";

/// A connection pool to one relational engine.
#[derive(Clone)]
pub enum RelationalPool {
    Postgres(PgPool),
    MySql(MySqlPool),
    Sqlite(SqlitePool),
}

impl RelationalPool {
    pub async fn connect(
        kind: DataSourceKind,
        params: &RelationalConnectionParams,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, DataError> {
        let host = params.host.as_deref().unwrap_or("localhost");
        let port = params.port.or(kind.default_port()).unwrap_or_default();
        let username = params.username.as_deref().unwrap_or_default();
        let database = params.database.as_deref().unwrap_or_default();

        let pool = match kind {
            DataSourceKind::Postgres => {
                let mut options = PgConnectOptions::new()
                    .host(host)
                    .port(port)
                    .username(username)
                    .database(database);
                if let Some(password) = &params.password {
                    options = options.password(password);
                }
                let pool = PgPoolOptions::new()
                    .max_connections(max_connections)
                    .acquire_timeout(acquire_timeout)
                    .connect_with(options)
                    .await
                    .map_err(connect_error)?;
                RelationalPool::Postgres(pool)
            }
            DataSourceKind::Mysql => {
                let mut options = MySqlConnectOptions::new()
                    .host(host)
                    .port(port)
                    .username(username)
                    .database(database);
                if let Some(password) = &params.password {
                    options = options.password(password);
                }
                let pool = MySqlPoolOptions::new()
                    .max_connections(max_connections)
                    .acquire_timeout(acquire_timeout)
                    .connect_with(options)
                    .await
                    .map_err(connect_error)?;
                RelationalPool::MySql(pool)
            }
            DataSourceKind::Sqlite => {
                let options = SqliteConnectOptions::new()
                    .filename(database)
                    .create_if_missing(false);
                let pool = SqlitePoolOptions::new()
                    .max_connections(max_connections)
                    .acquire_timeout(acquire_timeout)
                    .connect_with(options)
                    .await
                    .map_err(connect_error)?;
                RelationalPool::Sqlite(pool)
            }
            other => {
                return Err(DataError::Configuration(format!(
                    "{} is not a relational source",
                    other
                )));
            }
        };
        Ok(pool)
    }
}

fn connect_error(err: sqlx::Error) -> DataError {
    match err {
        sqlx::Error::Configuration(e) => DataError::Configuration(e.to_string()),
        other => DataError::Connection(other.to_string()),
    }
}

/// Data access over a pooled relational connection.
pub struct RelationalManager {
    pool: RelationalPool,
}

impl RelationalManager {
    pub fn new(pool: RelationalPool) -> Self {
        Self { pool }
    }

    async fn sqlite_columns(pool: &SqlitePool) -> Result<Vec<TypedColumn>, DataError> {
        let databases: Vec<(i64, String, Option<String>)> =
            sqlx::query_as("PRAGMA database_list").fetch_all(pool).await?;

        let mut columns = Vec::new();
        for (_, schema, _) in databases.into_iter().filter(|(_, name, _)| name != "temp") {
            let tables: Vec<(String,)> = sqlx::query_as(&format!(
                "SELECT name FROM {}.sqlite_master \
                 WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' ORDER BY name",
                quote_ident(&schema)
            ))
            .fetch_all(pool)
            .await?;

            for (table,) in tables {
                let table_columns: Vec<(String, String)> =
                    sqlx::query_as("SELECT name, type FROM pragma_table_info(?1, ?2) ORDER BY cid")
                        .bind(&table)
                        .bind(&schema)
                        .fetch_all(pool)
                        .await?;
                for (column, data_type) in table_columns {
                    columns.push(TypedColumn {
                        schema: Some(schema.clone()),
                        table: table.clone(),
                        column,
                        data_type,
                    });
                }
            }
        }
        Ok(columns)
    }
}

#[async_trait]
impl DataAccess for RelationalManager {
    async fn list_schema_elements(&self) -> Result<Vec<SchemaElement>, DataError> {
        let elements: Vec<SchemaElement> = self
            .list_typed_columns()
            .await?
            .into_iter()
            .map(|c| match c.schema {
                Some(schema) => format!("{}.{}.{}", schema, c.table, c.column),
                None => format!("{}.{}", c.table, c.column),
            })
            .collect();
        debug!("Discovered {} relational schema elements", elements.len());
        Ok(elements)
    }

    async fn list_typed_columns(&self) -> Result<Vec<TypedColumn>, DataError> {
        let rows: Vec<(String, String, String, String)> = match &self.pool {
            RelationalPool::Postgres(pool) => sqlx::query_as(PG_COLUMNS_SQL).fetch_all(pool).await?,
            RelationalPool::MySql(pool) => sqlx::query_as(MYSQL_COLUMNS_SQL).fetch_all(pool).await?,
            RelationalPool::Sqlite(pool) => return Self::sqlite_columns(pool).await,
        };

        Ok(rows
            .into_iter()
            .filter(|(schema, _, _, _)| !is_system_schema(schema))
            .map(|(schema, table, column, data_type)| TypedColumn {
                schema: Some(schema),
                table,
                column,
                data_type,
            })
            .collect())
    }

    async fn execute(&self, query: &str) -> Result<Vec<Record>, DataError> {
        let records = match &self.pool {
            RelationalPool::Postgres(pool) => sqlx::query(query)
                .fetch_all(pool)
                .await?
                .iter()
                .map(pg_record)
                .collect(),
            RelationalPool::MySql(pool) => sqlx::query(query)
                .fetch_all(pool)
                .await?
                .iter()
                .map(mysql_record)
                .collect(),
            RelationalPool::Sqlite(pool) => sqlx::query(query)
                .fetch_all(pool)
                .await?
                .iter()
                .map(sqlite_record)
                .collect(),
        };
        Ok(records)
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn to_json<T: Into<Value>>(decoded: Result<T, sqlx::Error>) -> Value {
    decoded.map(Into::into).unwrap_or(Value::Null)
}

fn to_text<T: ToString>(decoded: Result<T, sqlx::Error>) -> Value {
    decoded
        .map(|v| Value::String(v.to_string()))
        .unwrap_or(Value::Null)
}

fn decimal_to_json(decoded: Result<Decimal, sqlx::Error>) -> Value {
    match decoded {
        Ok(d) => d
            .to_string()
            .parse::<serde_json::Number>()
            .map(Value::Number)
            .unwrap_or_else(|_| Value::String(d.to_string())),
        Err(_) => Value::Null,
    }
}

fn array_to_json<T: Into<Value>>(decoded: Result<Vec<Option<T>>, sqlx::Error>) -> Value {
    decoded
        .map(|items| {
            Value::Array(
                items
                    .into_iter()
                    .map(|item| item.map(Into::into).unwrap_or(Value::Null))
                    .collect(),
            )
        })
        .unwrap_or(Value::Null)
}

/// ISO 8601 duration, e.g. `P1M2DT3.5S`.
fn interval_to_text(interval: &PgInterval) -> String {
    let seconds = interval.microseconds as f64 / 1_000_000.0;
    format!("P{}M{}DT{}S", interval.months, interval.days, seconds)
}

/// Text for a cell with no dedicated mapping. Values that cannot be read as
/// text come back as a `<TYPE value>` marker rather than `null`, so a real
/// NULL stays distinguishable.
fn text_or_marker(decoded: Result<String, sqlx::Error>, type_name: &str) -> Value {
    match decoded {
        Ok(text) => Value::String(text),
        Err(e) => {
            debug!("No JSON mapping for {} cell: {}", type_name, e);
            Value::String(format!("<{} value>", type_name))
        }
    }
}

fn bytes_to_json(decoded: Result<Vec<u8>, sqlx::Error>) -> Value {
    decoded
        .map(|b| Value::String(String::from_utf8_lossy(&b).into_owned()))
        .unwrap_or(Value::Null)
}

/// The runtime type name of a cell, or `None` when the cell is NULL.
fn cell_type<R: Row>(row: &R, idx: usize) -> Option<String>
where
    usize: sqlx::ColumnIndex<R>,
{
    let raw = row.try_get_raw(idx).ok()?;
    if raw.is_null() {
        return None;
    }
    Some(raw.type_info().name().to_string())
}

fn pg_record(row: &PgRow) -> Record {
    let mut record = Record::new();
    for column in row.columns() {
        record.insert(column.name().to_string(), pg_value(row, column.ordinal()));
    }
    record
}

/// Maps a Postgres cell to JSON. Types without a mapping below (INET, ranges,
/// geometric types and arrays of anything but text, integers, floats and
/// booleans) are reported through [`text_or_marker`].
fn pg_value(row: &PgRow, idx: usize) -> Value {
    let Some(type_name) = cell_type(row, idx) else {
        return Value::Null;
    };
    match type_name.as_str() {
        "BOOL" => to_json(row.try_get::<bool, _>(idx)),
        "INT2" => to_json(row.try_get::<i16, _>(idx)),
        "INT4" => to_json(row.try_get::<i32, _>(idx)),
        "INT8" => to_json(row.try_get::<i64, _>(idx)),
        "FLOAT4" => to_json(row.try_get::<f32, _>(idx)),
        "FLOAT8" => to_json(row.try_get::<f64, _>(idx)),
        "NUMERIC" => decimal_to_json(row.try_get::<Decimal, _>(idx)),
        "JSON" | "JSONB" => row
            .try_get::<Json<Value>, _>(idx)
            .map(|j| j.0)
            .unwrap_or(Value::Null),
        "UUID" => to_text(row.try_get::<Uuid, _>(idx)),
        "DATE" => to_text(row.try_get::<NaiveDate, _>(idx)),
        "TIME" => to_text(row.try_get::<NaiveTime, _>(idx)),
        "TIMESTAMP" => to_text(row.try_get::<NaiveDateTime, _>(idx)),
        "TIMESTAMPTZ" => to_text(row.try_get::<DateTime<Utc>, _>(idx)),
        "BYTEA" => bytes_to_json(row.try_get::<Vec<u8>, _>(idx)),
        "INTERVAL" => row
            .try_get::<PgInterval, _>(idx)
            .map(|i| Value::String(interval_to_text(&i)))
            .unwrap_or(Value::Null),
        "OID" => to_json(row.try_get::<Oid, _>(idx).map(|oid| oid.0)),
        "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]" => {
            array_to_json(row.try_get::<Vec<Option<String>>, _>(idx))
        }
        "INT2[]" => array_to_json(row.try_get::<Vec<Option<i16>>, _>(idx)),
        "INT4[]" => array_to_json(row.try_get::<Vec<Option<i32>>, _>(idx)),
        "INT8[]" => array_to_json(row.try_get::<Vec<Option<i64>>, _>(idx)),
        "FLOAT4[]" => array_to_json(row.try_get::<Vec<Option<f32>>, _>(idx)),
        "FLOAT8[]" => array_to_json(row.try_get::<Vec<Option<f64>>, _>(idx)),
        "BOOL[]" => array_to_json(row.try_get::<Vec<Option<bool>>, _>(idx)),
        name => text_or_marker(row.try_get::<String, _>(idx), name),
    }
}

fn mysql_record(row: &MySqlRow) -> Record {
    let mut record = Record::new();
    for column in row.columns() {
        record.insert(column.name().to_string(), mysql_value(row, column.ordinal()));
    }
    record
}

/// Maps a MySQL cell to JSON. Spatial and other unmapped types are reported
/// through [`text_or_marker`].
fn mysql_value(row: &MySqlRow, idx: usize) -> Value {
    let Some(type_name) = cell_type(row, idx) else {
        return Value::Null;
    };
    match type_name.as_str() {
        "BOOLEAN" => to_json(row.try_get::<bool, _>(idx)),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            to_json(row.try_get::<i64, _>(idx))
        }
        name if name.ends_with("UNSIGNED") => to_json(row.try_get::<u64, _>(idx)),
        "FLOAT" => to_json(row.try_get::<f32, _>(idx)),
        "DOUBLE" => to_json(row.try_get::<f64, _>(idx)),
        "DECIMAL" => decimal_to_json(row.try_get::<Decimal, _>(idx)),
        "JSON" => row
            .try_get::<Json<Value>, _>(idx)
            .map(|j| j.0)
            .unwrap_or(Value::Null),
        "DATE" => to_text(row.try_get::<NaiveDate, _>(idx)),
        "TIME" => to_text(row.try_get::<NaiveTime, _>(idx)),
        "DATETIME" => to_text(row.try_get::<NaiveDateTime, _>(idx)),
        "TIMESTAMP" => to_text(row.try_get::<DateTime<Utc>, _>(idx)),
        "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            bytes_to_json(row.try_get::<Vec<u8>, _>(idx))
        }
        name => text_or_marker(row.try_get::<String, _>(idx), name),
    }
}

fn sqlite_record(row: &SqliteRow) -> Record {
    let mut record = Record::new();
    for column in row.columns() {
        record.insert(column.name().to_string(), sqlite_value(row, column.ordinal()));
    }
    record
}

// SQLite cells carry their own storage class regardless of the declared type.
fn sqlite_value(row: &SqliteRow, idx: usize) -> Value {
    let Some(type_name) = cell_type(row, idx) else {
        return Value::Null;
    };
    match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => to_json(row.try_get::<i64, _>(idx)),
        "REAL" | "NUMERIC" => to_json(row.try_get::<f64, _>(idx)),
        "BLOB" => bytes_to_json(row.try_get::<Vec<u8>, _>(idx)),
        _ => to_json(row.try_get::<String, _>(idx)),
    }
}
