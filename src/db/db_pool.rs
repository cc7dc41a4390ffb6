use duckdb::Connection;
use r2d2::ManageConnection;
use std::sync::{Mutex, PoisonError};

/// Hands out connections to one in-memory DuckDB database.
///
/// Every pooled connection is a clone of the base connection, so all of them
/// see the dataset loaded through it.
pub struct DuckDBConnectionManager {
    base: Mutex<Connection>,
}

impl DuckDBConnectionManager {
    pub fn new(base: Connection) -> Self {
        Self {
            base: Mutex::new(base),
        }
    }
}

impl ManageConnection for DuckDBConnectionManager {
    type Connection = Connection;
    type Error = duckdb::Error;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        self.base
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_clone()
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.execute_batch("SELECT 1")?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}
