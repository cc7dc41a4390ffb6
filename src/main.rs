use anyhow::{Context, bail};
use chrono::Utc;
use clap::Parser;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

use querai::config::{AppConfig, CliArgs, Command};
use querai::db::{DataSourceDescriptor, PoolRegistry};
use querai::embedding::create_embedder;
use querai::llm::LlmManager;
use querai::orchestrator::{
    OrchestrationResponse, OrchestratorSettings, QueryOrchestrator, SourceRef,
};
use querai::schema::{SchemaArtifacts, SchemaDiscoveryService};
use querai::store::{JsonFileStore, StoredConnection};
use querai::util::logging::init_tracing;

#[derive(Serialize, Debug)]
struct ConnectionReport {
    id: String,
    name: String,
    is_large: bool,
    schema_elements: usize,
}

impl ConnectionReport {
    fn new(connection: &StoredConnection, artifacts: &SchemaArtifacts) -> Self {
        Self {
            id: connection.id.clone(),
            name: connection.name.clone(),
            is_large: artifacts.is_large,
            schema_elements: artifacts.flat_elements.len(),
        }
    }
}

/// Discovers and saves a new connection. The report only exists once the
/// connection is on disk.
async fn save_connection(
    store: &JsonFileStore,
    discovery: &SchemaDiscoveryService,
    name: String,
    descriptor: DataSourceDescriptor,
) -> anyhow::Result<ConnectionReport> {
    let artifacts = discovery.discover(&descriptor).await?;
    let mut connection = StoredConnection::new(name, descriptor);
    let report = ConnectionReport::new(&connection, &artifacts);
    connection.artifacts = Some(artifacts);
    connection.refreshed_at = Some(Utc::now());
    store.add(connection).await?;
    Ok(report)
}

/// Discovers an ad-hoc source for `ask`. An unreachable source becomes the
/// error response the user sees; an invalid descriptor is a hard error.
async fn ad_hoc_source(
    discovery: &SchemaDiscoveryService,
    descriptor: DataSourceDescriptor,
) -> anyhow::Result<Result<SourceRef, OrchestrationResponse>> {
    match discovery.discover(&descriptor).await {
        Ok(artifacts) => Ok(Ok(SourceRef::Direct {
            descriptor,
            artifacts: Some(artifacts),
        })),
        Err(e) if e.is_configuration() => Err(e.into()),
        Err(e) => {
            error!("Schema discovery failed: {}", e);
            Ok(Err(OrchestrationResponse::error(e.to_string())))
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_tracing(args.log_json);

    let config = AppConfig::new(&args).context("Failed to load configuration")?;

    let registry = Arc::new(PoolRegistry::new(
        config.query.pool_size,
        config.object_store.clone(),
    ));
    let discovery = SchemaDiscoveryService::new(Arc::clone(&registry))
        .with_large_threshold(config.query.large_schema_threshold);
    let store = Arc::new(
        JsonFileStore::open(&config.data_dir)
            .await
            .with_context(|| format!("Failed to open connection store in {}", config.data_dir))?,
    );

    match args.command {
        Command::Connect { name, source } => {
            let descriptor = source.location.descriptor(source.kind);
            let report = save_connection(&store, &discovery, name, descriptor).await?;
            print_json(&report)?;
        }
        Command::Refresh { id } => {
            let connection = store.get(&id).await?;
            let artifacts = discovery.discover(&connection.descriptor).await?;
            let report = ConnectionReport::new(&connection, &artifacts);
            store.update_artifacts(&id, artifacts).await?;
            print_json(&report)?;
        }
        Command::List => print_json(&store.list().await)?,
        Command::Remove { id } => {
            store.remove(&id).await?;
            println!("Removed {}", id);
        }
        Command::Schema { id } => {
            let connection = store.get(&id).await?;
            let Some(artifacts) = connection.artifacts else {
                bail!("No schema cached for {}; run `querai refresh {}`", id, id);
            };
            print_json(&artifacts.presentation_tree)?;
        }
        Command::Ask {
            question,
            connection,
            source,
        } => {
            let source_ref = match (connection, source.kind) {
                (Some(id), _) => Some(SourceRef::Connection(id)),
                (None, Some(kind)) => {
                    let descriptor = source.location.descriptor(kind);
                    match ad_hoc_source(&discovery, descriptor).await? {
                        Ok(source_ref) => Some(source_ref),
                        Err(response) => return print_json(&response),
                    }
                }
                (None, None) => None,
            };

            info!("Initializing LLM manager with backend: {}", config.llm.backend);
            let llm = Arc::new(LlmManager::new(&config.llm)?);
            let embedder = create_embedder(&config.embedding)?;

            let orchestrator = QueryOrchestrator::new(store, llm, embedder, registry)
                .with_settings(OrchestratorSettings::from_config(&config.query, &config.llm));
            let response = orchestrator.process_query(&question, source_ref).await?;
            print_json(&response)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use querai::db::{DataSourceKind, RelationalConnectionParams};
    use querai::error::OrchestrationError;

    fn discovery() -> SchemaDiscoveryService {
        SchemaDiscoveryService::new(Arc::new(PoolRegistry::default()))
    }

    fn orders_csv(dir: &std::path::Path) -> DataSourceDescriptor {
        let path = dir.join("orders.csv");
        std::fs::write(&path, "id,amount\n1,10.0\n").unwrap();
        DataSourceDescriptor::file(DataSourceKind::Csv, path.to_string_lossy())
    }

    #[tokio::test]
    async fn saved_connection_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("store")).await.unwrap();

        let report = save_connection(&store, &discovery(), "orders".into(), orders_csv(dir.path()))
            .await
            .unwrap();

        assert_eq!(report.schema_elements, 2);
        assert_eq!(store.get(&report.id).await.unwrap().name, "orders");
    }

    #[tokio::test]
    async fn unsaved_connection_has_no_report() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("store")).await.unwrap();
        std::fs::create_dir(store.path().with_extension("json.tmp")).unwrap();

        let result =
            save_connection(&store, &discovery(), "orders".into(), orders_csv(dir.path())).await;

        assert!(result.is_err());
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn unreachable_ad_hoc_source_is_reported_as_such() {
        let dir = tempfile::tempdir().unwrap();
        let descriptor = DataSourceDescriptor::relational(
            DataSourceKind::Sqlite,
            RelationalConnectionParams {
                database: Some(dir.path().join("absent.db").to_string_lossy().into_owned()),
                ..Default::default()
            },
        );

        let response = match ad_hoc_source(&discovery(), descriptor).await.unwrap() {
            Ok(_) => panic!("a missing database file should not resolve"),
            Err(response) => response,
        };

        assert!(response.is_error());
        assert_ne!(
            response.error_message(),
            Some(OrchestrationError::NoSchema.to_string().as_str())
        );
    }

    #[tokio::test]
    async fn invalid_ad_hoc_descriptor_is_a_hard_error() {
        let descriptor = DataSourceDescriptor::file(DataSourceKind::Csv, "  ");
        assert!(ad_hoc_source(&discovery(), descriptor).await.is_err());
    }
}
