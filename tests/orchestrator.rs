mod common;

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use querai::db::{DataSourceDescriptor, DataSourceKind, PoolRegistry};
use querai::llm::{IntentType, QueryIntentResult};
use querai::orchestrator::{OrchestratorSettings, QueryOrchestrator, SourceRef};
use querai::schema::{SchemaArtifacts, SchemaDiscoveryService};
use querai::store::{InMemoryStore, StoredConnection};

use common::{HashEmbedder, ScriptedLlm, create_shop_db, sqlite_descriptor};

struct Harness {
    store: Arc<InMemoryStore>,
    registry: Arc<PoolRegistry>,
    llm: Arc<ScriptedLlm>,
    orchestrator: QueryOrchestrator,
}

fn harness(reply: QueryIntentResult) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let registry = Arc::new(PoolRegistry::default());
    let llm = Arc::new(ScriptedLlm::new(reply));
    let orchestrator = QueryOrchestrator::new(
        store.clone(),
        llm.clone(),
        Arc::new(HashEmbedder),
        registry.clone(),
    );
    Harness {
        store,
        registry,
        llm,
        orchestrator,
    }
}

/// Discovers `descriptor` and saves it, returning the connection id.
async fn save(h: &Harness, descriptor: DataSourceDescriptor) -> String {
    let artifacts = SchemaDiscoveryService::new(h.registry.clone())
        .discover(&descriptor)
        .await
        .unwrap();
    let mut connection = StoredConnection::new("test", descriptor);
    connection.artifacts = Some(artifacts);
    h.store.insert(connection).await
}

#[tokio::test]
async fn counts_orders_in_a_csv_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("orders.csv");
    std::fs::write(&path, "id,amount\n1,10.0\n2,12.5\n3,4.0\n").unwrap();

    let h = harness(QueryIntentResult::sql(
        "SELECT COUNT(*) AS n FROM orders",
        "Counts the orders.",
    ));
    let id = save(
        &h,
        DataSourceDescriptor::file(DataSourceKind::Csv, path.to_string_lossy()),
    )
    .await;

    let response = h
        .orchestrator
        .process_query("how many orders are there", Some(SourceRef::Connection(id)))
        .await
        .unwrap();

    assert_eq!(response.response_type, IntentType::Sql);
    assert_eq!(response.query, "SELECT COUNT(*) AS n FROM orders");
    assert_eq!(response.explanation, "Counts the orders.");
    assert_eq!(response.rows.len(), 1);
    assert_eq!(response.rows[0]["n"], json!(3));
    assert_eq!(
        h.llm.last_schema().as_deref(),
        Some("Table orders has columns: id, amount")
    );
}

#[tokio::test]
async fn answers_from_a_sqlite_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shop.db");
    create_shop_db(&path).await;

    let h = harness(QueryIntentResult::sql(
        "SELECT c.name, SUM(o.amount) AS total FROM orders o JOIN customers c ON c.id = o.customer_id GROUP BY c.name ORDER BY c.name",
        "Totals per customer.",
    ));
    let id = save(&h, sqlite_descriptor(&path)).await;

    let response = h
        .orchestrator
        .process_query("total spent per customer", Some(SourceRef::Connection(id)))
        .await
        .unwrap();

    assert_eq!(response.response_type, IntentType::Sql);
    assert_eq!(
        serde_json::to_value(&response.rows).unwrap(),
        json!([
            {"name": "Ada", "total": 42.5},
            {"name": "Grace", "total": 7.25}
        ])
    );
}

#[tokio::test]
async fn narrowed_schema_keeps_identifier_columns() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shop.db");
    create_shop_db(&path).await;

    let h = harness(QueryIntentResult::meta("ok"));
    let id = save(&h, sqlite_descriptor(&path)).await;
    let orchestrator = QueryOrchestrator::new(
        h.store.clone(),
        h.llm.clone(),
        Arc::new(HashEmbedder),
        h.registry.clone(),
    )
    .with_settings(OrchestratorSettings {
        top_k: 1,
        ..Default::default()
    });

    orchestrator
        .process_query("amount", Some(SourceRef::Connection(id)))
        .await
        .unwrap();

    // "amount" is nearest to main.orders.amount; the keys of orders come along.
    assert_eq!(
        h.llm.last_schema().as_deref(),
        Some("Table main.orders has columns: id, customer_id, amount")
    );
}

#[tokio::test]
async fn empty_schema_never_reaches_the_llm() {
    let h = harness(QueryIntentResult::sql("SELECT 1", "x"));
    let source = SourceRef::Direct {
        descriptor: DataSourceDescriptor::file(DataSourceKind::Csv, "orders.csv"),
        artifacts: Some(SchemaArtifacts::default()),
    };

    let response = h
        .orchestrator
        .process_query("how many orders are there", Some(source))
        .await
        .unwrap();

    assert_eq!(response.response_type, IntentType::Error);
    assert!(response.query.is_empty());
    assert_eq!(response.rows.len(), 1);
    assert!(response.rows[0]["error"].is_string());
    assert_eq!(h.llm.calls(), 0);
}

#[tokio::test]
async fn meta_answers_have_no_query_or_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shop.db");
    create_shop_db(&path).await;

    let h = harness(QueryIntentResult::meta("This database tracks orders."));
    let id = save(&h, sqlite_descriptor(&path)).await;

    let response = h
        .orchestrator
        .process_query("what is this database about?", Some(SourceRef::Connection(id)))
        .await
        .unwrap();

    assert_eq!(response.response_type, IntentType::Meta);
    assert_eq!(response.query, "");
    assert_eq!(response.explanation, "This database tracks orders.");
    assert!(response.rows.is_empty());
}

#[tokio::test]
async fn backend_failure_is_surfaced_as_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shop.db");
    create_shop_db(&path).await;

    let h = harness(QueryIntentResult::sql("SELECT * FROM invoices", "x"));
    let id = save(&h, sqlite_descriptor(&path)).await;

    let response = h
        .orchestrator
        .process_query("list invoices", Some(SourceRef::Connection(id)))
        .await
        .unwrap();

    assert_eq!(response.response_type, IntentType::Error);
    assert!(response.query.is_empty());
    let message = response.error_message().unwrap();
    assert!(message.contains("no such table"), "{}", message);
    assert_eq!(response.explanation, message);
}

#[tokio::test]
async fn direct_descriptor_with_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shop.db");
    create_shop_db(&path).await;

    let h = harness(QueryIntentResult::sql("SELECT COUNT(*) AS n FROM customers", "x"));
    let descriptor = sqlite_descriptor(&path);
    let artifacts = SchemaDiscoveryService::new(h.registry.clone())
        .discover(&descriptor)
        .await
        .unwrap();

    let response = h
        .orchestrator
        .process_query(
            "how many customers",
            Some(SourceRef::Direct {
                descriptor,
                artifacts: Some(artifacts),
            }),
        )
        .await
        .unwrap();

    assert_eq!(response.rows, vec![json!({"n": 2}).as_object().unwrap().clone()]);
}

#[tokio::test]
async fn slow_query_times_out_as_an_error_response() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shop.db");
    create_shop_db(&path).await;

    let h = harness(QueryIntentResult::sql(
        "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c LIMIT 20000000) \
         SELECT count(*) AS n FROM c",
        "Counts a long series.",
    ));
    let id = save(&h, sqlite_descriptor(&path)).await;
    let orchestrator = QueryOrchestrator::new(
        h.store.clone(),
        h.llm.clone(),
        Arc::new(HashEmbedder),
        h.registry.clone(),
    )
    .with_settings(OrchestratorSettings {
        query_timeout: Duration::from_millis(10),
        ..Default::default()
    });

    let response = orchestrator
        .process_query("count a long series", Some(SourceRef::Connection(id)))
        .await
        .unwrap();

    assert_eq!(response.response_type, IntentType::Error);
    assert!(response.query.is_empty());
    let message = response.error_message().unwrap();
    assert!(message.contains("timed out"), "{}", message);
}
