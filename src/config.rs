use clap::{Args, Parser, Subcommand};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::db::{DataSourceDescriptor, DataSourceKind, RelationalConnectionParams};

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub backend: String, // "remote", "ollama" or "gemini"
    pub model: String,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: "ollama".to_string(),
            model: "llama3".to_string(),
            api_key: None,
            api_url: None,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: String, // "ollama" or "openai"
    pub model: String,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    /// Expected vector length. Checked against every response when set.
    pub dims: Option<usize>,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: "ollama".to_string(),
            model: "nomic-embed-text".to_string(),
            api_url: None,
            api_key: None,
            dims: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct QueryConfig {
    pub top_k: usize,
    pub timeout_secs: u64,
    pub large_schema_threshold: usize,
    pub pool_size: u32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: 15,
            timeout_secs: 30,
            large_schema_threshold: 3000,
            pool_size: 5,
        }
    }
}

/// Credentials for `s3://` file locations.
#[derive(Deserialize, Clone, Default)]
#[serde(default)]
pub struct ObjectStoreConfig {
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub endpoint: Option<String>,
}

impl std::fmt::Debug for ObjectStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("ObjectStoreConfig")
            .field("region", &self.region)
            .field("access_key_id", &redact(&self.access_key_id))
            .field("secret_access_key", &redact(&self.secret_access_key))
            .field("session_token", &redact(&self.session_token))
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub data_dir: String,
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub query: QueryConfig,
    pub object_store: ObjectStoreConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: "data".to_string(),
            llm: LlmConfig::default(),
            embedding: EmbeddingConfig::default(),
            query: QueryConfig::default(),
            object_store: ObjectStoreConfig::default(),
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Ask questions of databases and data files in plain language", long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Directory for the connection store
    #[arg(long, global = true)]
    pub data_dir: Option<String>,

    /// LLM backend to use (remote, ollama or gemini)
    #[arg(long, global = true)]
    pub llm_backend: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Save a data source, discovering its schema
    Connect {
        /// Display name for the connection
        name: String,
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Re-discover the schema of a saved connection
    Refresh { id: String },
    /// List saved connections
    List,
    /// Delete a saved connection
    Remove { id: String },
    /// Print the schema tree of a saved connection as JSON
    Schema { id: String },
    /// Ask a question of a saved connection or an ad-hoc source
    Ask {
        question: String,
        /// Id of a saved connection
        #[arg(long, conflicts_with = "kind")]
        connection: Option<String>,
        #[command(flatten)]
        source: OptionalSourceArgs,
    },
}

/// How to reach a data source on the command line.
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    #[arg(long, value_enum)]
    pub kind: DataSourceKind,
    #[command(flatten)]
    pub location: LocationArgs,
}

#[derive(Args, Debug, Clone)]
pub struct OptionalSourceArgs {
    #[arg(long, value_enum)]
    pub kind: Option<DataSourceKind>,
    #[command(flatten)]
    pub location: LocationArgs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct LocationArgs {
    #[arg(long)]
    pub host: Option<String>,
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(long)]
    pub username: Option<String>,
    /// Prefer QUERAI_PASSWORD over passing this on the command line
    #[arg(long, env = "QUERAI_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
    /// Database name, or the file path for SQLite
    #[arg(long)]
    pub database: Option<String>,
    /// CSV or Excel file path, or an s3:// / https:// URI
    #[arg(long, conflicts_with_all = ["host", "port", "username", "database"])]
    pub file: Option<String>,
}

impl LocationArgs {
    /// Descriptor for `kind` built from whichever flags were given. Shape
    /// problems surface later from [`DataSourceDescriptor::validate`].
    pub fn descriptor(&self, kind: DataSourceKind) -> DataSourceDescriptor {
        if kind.is_relational() {
            DataSourceDescriptor::relational(
                kind,
                RelationalConnectionParams {
                    host: self.host.clone(),
                    port: self.port,
                    username: self.username.clone(),
                    password: self.password.clone(),
                    database: self.database.clone(),
                },
            )
        } else {
            DataSourceDescriptor::file(kind, self.file.clone().unwrap_or_default())
        }
    }
}

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config_builder = Config::builder();

        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
        } else {
            let default_locations = [
                "querai.toml",
                "config/querai.toml",
                "/etc/querai/querai.toml",
            ];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    break;
                }
            }
        }

        // e.g. QUERAI_LLM__API_KEY
        config_builder = config_builder.add_source(
            Environment::with_prefix("QUERAI")
                .prefix_separator("_")
                .separator("__"),
        );

        let mut config: AppConfig = config_builder.build()?.try_deserialize()?;

        if let Some(data_dir) = &args.data_dir {
            config.data_dir = data_dir.clone();
        }
        if let Some(backend) = &args.llm_backend {
            config.llm.backend = backend.clone();
        }

        Ok(config)
    }
}
