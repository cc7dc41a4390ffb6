use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DataError;

/// The kind of a data source. Selects the backend variant at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DataSourceKind {
    #[serde(alias = "postgresql")]
    #[value(alias = "postgresql")]
    Postgres,
    Mysql,
    Sqlite,
    Csv,
    Excel,
}

impl DataSourceKind {
    pub fn is_relational(&self) -> bool {
        matches!(
            self,
            DataSourceKind::Postgres | DataSourceKind::Mysql | DataSourceKind::Sqlite
        )
    }

    pub fn default_port(&self) -> Option<u16> {
        match self {
            DataSourceKind::Postgres => Some(5432),
            DataSourceKind::Mysql => Some(3306),
            _ => None,
        }
    }
}

impl fmt::Display for DataSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataSourceKind::Postgres => "postgres",
            DataSourceKind::Mysql => "mysql",
            DataSourceKind::Sqlite => "sqlite",
            DataSourceKind::Csv => "csv",
            DataSourceKind::Excel => "excel",
        };
        f.write_str(name)
    }
}

/// Connection parameters for relational sources. For SQLite `database` holds the file path.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationalConnectionParams {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
}

// Never print the password, not even in debug logs.
impl fmt::Debug for RelationalConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationalConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .finish()
    }
}

/// A local file path or a remote URI (`s3://bucket/key`, `https://...`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileLocation(pub String);

impl FileLocation {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The URI scheme, if the location is a URI rather than a local path.
    pub fn scheme(&self) -> Option<&str> {
        let (scheme, _) = self.0.split_once("://")?;
        if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        Some(scheme)
    }

    pub fn is_remote(&self) -> bool {
        self.scheme().is_some()
    }

    /// The final path segment without its extension.
    pub fn file_stem(&self) -> &str {
        let name = self
            .0
            .trim_end_matches('/')
            .rsplit(|c: char| c == '/' || c == '\\')
            .next()
            .unwrap_or_default();
        let name = name.split(|c: char| c == '?' || c == '#').next().unwrap_or_default();
        match name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceConnection {
    Relational(RelationalConnectionParams),
    File(FileLocation),
}

/// Names a data source's kind and how to reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSourceDescriptor {
    pub kind: DataSourceKind,
    pub connection: SourceConnection,
}

impl DataSourceDescriptor {
    pub fn relational(kind: DataSourceKind, params: RelationalConnectionParams) -> Self {
        Self {
            kind,
            connection: SourceConnection::Relational(params),
        }
    }

    pub fn file(kind: DataSourceKind, location: impl Into<String>) -> Self {
        Self {
            kind,
            connection: SourceConnection::File(FileLocation::new(location)),
        }
    }

    /// Checks that the populated connection shape matches `kind` and that
    /// every field the kind needs is present.
    pub fn validate(&self) -> Result<(), DataError> {
        match (&self.connection, self.kind) {
            (SourceConnection::Relational(params), DataSourceKind::Sqlite) => {
                require(&params.database, "database", self.kind)?;
                Ok(())
            }
            (SourceConnection::Relational(params), kind) if kind.is_relational() => {
                require(&params.host, "host", kind)?;
                require(&params.username, "username", kind)?;
                require(&params.database, "database", kind)?;
                Ok(())
            }
            (SourceConnection::File(location), kind) if !kind.is_relational() => {
                if location.as_str().trim().is_empty() {
                    return Err(DataError::Configuration(format!(
                        "a file location is required for {} sources",
                        kind
                    )));
                }
                Ok(())
            }
            (SourceConnection::Relational(_), kind) => Err(DataError::Configuration(format!(
                "{} sources need a file location, not database credentials",
                kind
            ))),
            (SourceConnection::File(_), kind) => Err(DataError::Configuration(format!(
                "{} sources need database credentials, not a file location",
                kind
            ))),
        }
    }
}

fn require(field: &Option<String>, name: &str, kind: DataSourceKind) -> Result<(), DataError> {
    match field {
        Some(value) if !value.trim().is_empty() => Ok(()),
        _ => Err(DataError::Configuration(format!(
            "'{}' is required for {} sources",
            name, kind
        ))),
    }
}
