//! Tests against a live Postgres with the wal2json plugin installed and `wal_level = logical`.
//!
//! The server is configured through the `TESTS_DATABASE_*` environment variables.

use std::collections::HashSet;
use std::time::Duration;

use siphon::operator::Operator;
use siphon::plugins::registry::PluginRegistry;
use siphon::replication::client::PgSourceClient;
use siphon::replication::decoding::decode_changes;
use siphon::replication::source::SlotSource;
use siphon::test_utils::notify::within_timeout;
use siphon::types::TableName;
use siphon::workers::registry::WorkerRegistry;
use siphon_config::shared::{JobConfig, LoadType, SlotRetention, SourceConfig};
use siphon_postgres::tokio::test_utils::{PgDatabase, TestServerConfig};
use siphon_telemetry::tracing::init_test_tracing;
use tempfile::TempDir;

fn employee() -> TableName {
    TableName::new("public", "employee")
}

async fn employee_database() -> PgDatabase {
    let database = PgDatabase::new(TestServerConfig::from_env()).await;
    database
        .create_table(
            &employee(),
            &[("id", "integer primary key"), ("name", "character varying(50)")],
        )
        .await
        .unwrap();

    database
}

fn job(database: &PgDatabase, load_type: LoadType, output: &TempDir) -> JobConfig {
    let mut config = JobConfig::new(
        SourceConfig::new(database.connection_string()),
        load_type,
        vec!["public.employee".to_string()],
        output.path().to_string_lossy(),
    );
    config.supervision_interval_ms = 100;
    config.cdc.poll_interval_secs = 0.1;
    config.cdc.slot_name = format!("siphon_test_{}", uuid::Uuid::new_v4().simple());

    config
}

#[tokio::test(flavor = "multi_thread")]
async fn full_load_copies_table_into_single_shard() {
    init_test_tracing();
    let database = employee_database().await;
    database
        .run_sql("insert into public.employee values (1, 'User1'), (2, 'User2')")
        .await
        .unwrap();
    let output = TempDir::new().unwrap();

    let plugins = PluginRegistry::with_known();
    let mut operator = Operator::new(
        job(&database, LoadType::FullLoad, &output),
        &plugins,
        WorkerRegistry::new(),
    )
    .unwrap();
    let report = within_timeout(operator.execute()).await.unwrap();

    assert_eq!(report.notifications.len(), 1);
    assert_eq!(report.notifications[0].error, None);
    let table_dir = output.path().join("full_load/public_employee");
    assert_eq!(
        std::fs::read_to_string(table_dir.join("x00_public.employee.csv")).unwrap(),
        "1\tUser1\n2\tUser2\n"
    );
    assert!(table_dir.join("_success").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_table_is_reported() {
    init_test_tracing();
    let database = employee_database().await;
    let output = TempDir::new().unwrap();

    let plugins = PluginRegistry::with_known();
    let mut operator = Operator::new(
        job(&database, LoadType::FullLoad, &output),
        &plugins,
        WorkerRegistry::new(),
    )
    .unwrap();
    let report = within_timeout(operator.execute()).await.unwrap();

    assert_eq!(
        report.notifications[0].error.as_deref(),
        Some("Table was empty")
    );
    let shard = output
        .path()
        .join("full_load/public_employee/x00_public.employee.csv");
    assert_eq!(std::fs::metadata(shard).unwrap().len(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn cdc_writes_inserted_rows_and_consumes_them() {
    init_test_tracing();
    let database = employee_database().await;
    let output = TempDir::new().unwrap();
    let mut config = job(&database, LoadType::Cdc, &output);
    config.cdc.slot_retention = SlotRetention::Retain;
    let slot_name = config.cdc.slot_name.clone();
    let source = config.source.clone();

    let plugins = PluginRegistry::with_known();
    let mut operator = Operator::new(config, &plugins, WorkerRegistry::new()).unwrap();
    let shutdown_tx = operator.shutdown_tx();
    let execution = tokio::spawn(async move { operator.execute().await });

    let client = PgSourceClient::connect(&source).await.unwrap();
    within_timeout(async {
        while !client.slot_exists(&slot_name).await.unwrap() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;

    database
        .run_sql("insert into public.employee values (3, 'User3')")
        .await
        .unwrap();

    let change_file = output
        .path()
        .join("cdc/public_employee/public.employee_cdc_1.csv");
    within_timeout(async {
        while !change_file.exists() {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;

    shutdown_tx.shutdown().unwrap();
    within_timeout(execution).await.unwrap().unwrap();

    assert_eq!(
        std::fs::read_to_string(&change_file).unwrap(),
        r#"{"kind": "insert", "schema": "public", "table": "employee", "columnnames": ["id", "name"], "columntypes": ["integer", "character varying(50)"], "columnvalues": [3, "User3"]}"#
    );
    let pending = client
        .peek_changes(&slot_name, &[employee()])
        .await
        .unwrap();
    assert!(decode_changes(&pending, &HashSet::from([employee()])).is_empty());

    client.drop_slot(&slot_name).await.unwrap();
}
