use std::path::{Path, PathBuf};

use serde_json::json;
use siphon::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use siphon::error::{ErrorKind, SiphonResult};
use siphon::plugins::base::CdcTask;
use siphon::test_utils::TEST_CONNECTION_STRING;
use siphon::test_utils::memory::{MemorySlotSource, insert_change};
use siphon::test_utils::notify::{wait_until, within_timeout};
use siphon::types::TableName;
use siphon::workers::cdc::{CdcJob, CdcStatus};
use siphon_config::shared::{CdcConfig, SlotCreation, SlotRetention, SourceConfig};
use siphon_telemetry::tracing::init_test_tracing;
use tempfile::TempDir;
use tokio::task::JoinHandle;

const EMPLOYEE_COLUMNS: &[(&str, &str)] = &[("id", "integer"), ("name", "character varying(50)")];

const USER3_RECORD: &str = r#"{"kind": "insert", "schema": "public", "table": "employee", "columnnames": ["id", "name"], "columntypes": ["integer", "character varying(50)"], "columnvalues": [3, "User3"]}"#;

fn employee() -> TableName {
    TableName::new("public", "employee")
}

fn settings() -> CdcConfig {
    CdcConfig {
        poll_interval_secs: 0.01,
        ..CdcConfig::default()
    }
}

fn task(output_dir: &Path, table_names: Vec<TableName>, settings: CdcConfig) -> CdcTask {
    CdcTask {
        output_dir: output_dir.to_path_buf(),
        source: SourceConfig::new(TEST_CONNECTION_STRING),
        table_names,
        settings,
    }
}

fn change_file(output_dir: &Path, table_name: &TableName, index: u64) -> PathBuf {
    output_dir
        .join(table_name.as_path_token())
        .join(format!("{table_name}_cdc_{index}.csv"))
}

fn start(source: &MemorySlotSource, task: CdcTask) -> (ShutdownTx, JoinHandle<SiphonResult<()>>) {
    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let source = source.clone();
    let handle = tokio::spawn(async move { CdcJob::new(task).run(&source, shutdown_rx).await });

    (shutdown_tx, handle)
}

async fn stop(shutdown_tx: ShutdownTx, handle: JoinHandle<SiphonResult<()>>) -> SiphonResult<()> {
    shutdown_tx.shutdown().unwrap();

    within_timeout(handle).await.unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn insert_is_written_and_consumed() {
    init_test_tracing();
    let dir = TempDir::new().unwrap();
    let source = MemorySlotSource::new();
    source.push_insert(&employee(), EMPLOYEE_COLUMNS, vec![json!(3), json!("User3")]);

    let (shutdown_tx, handle) = start(&source, task(dir.path(), vec![employee()], settings()));
    wait_until(|| source.backlog_len() == 0).await;
    stop(shutdown_tx, handle).await.unwrap();

    assert_eq!(
        std::fs::read_to_string(change_file(dir.path(), &employee(), 1)).unwrap(),
        USER3_RECORD
    );
    assert!(!change_file(dir.path(), &employee(), 2).exists());
    assert_eq!(source.confirmed().len(), 1);
    // Created lazily and retained by default.
    assert!(source.has_slot("siphon_slot"));
}

#[tokio::test(flavor = "multi_thread")]
async fn every_cycle_with_changes_writes_a_new_file() {
    init_test_tracing();
    let dir = TempDir::new().unwrap();
    let source = MemorySlotSource::new();
    let sales = TableName::new("sales", "orders");

    let (shutdown_tx, handle) = start(
        &source,
        task(dir.path(), vec![employee(), sales.clone()], settings()),
    );

    source.push_transaction(json!({
        "xid": 10,
        "change": [
            insert_change(&employee(), EMPLOYEE_COLUMNS, vec![json!(1), json!("User1")]),
            insert_change(&employee(), EMPLOYEE_COLUMNS, vec![json!(2), json!("User2")]),
        ]
    }));
    wait_until(|| change_file(dir.path(), &employee(), 1).exists()).await;
    wait_until(|| source.backlog_len() == 0).await;

    source.push_insert(&employee(), EMPLOYEE_COLUMNS, vec![json!(3), json!("User3")]);
    source.push_insert(&sales, &[("id", "integer")], vec![json!(7)]);
    wait_until(|| source.backlog_len() == 0).await;
    stop(shutdown_tx, handle).await.unwrap();

    let first = std::fs::read_to_string(change_file(dir.path(), &employee(), 1)).unwrap();
    let lines: Vec<&str> = first.split('\n').collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains(r#""columnvalues": [1, "User1"]"#));
    assert!(lines[1].contains(r#""columnvalues": [2, "User2"]"#));

    assert_eq!(
        std::fs::read_to_string(change_file(dir.path(), &employee(), 2)).unwrap(),
        USER3_RECORD
    );
    assert!(change_file(dir.path(), &sales, 1).exists());
    assert!(!change_file(dir.path(), &sales, 2).exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn numbering_continues_from_files_on_disk() {
    init_test_tracing();
    let dir = TempDir::new().unwrap();
    let existing = change_file(dir.path(), &employee(), 7);
    std::fs::create_dir_all(existing.parent().unwrap()).unwrap();
    std::fs::write(&existing, "earlier").unwrap();

    let source = MemorySlotSource::new();
    source.push_insert(&employee(), EMPLOYEE_COLUMNS, vec![json!(3), json!("User3")]);

    let (shutdown_tx, handle) = start(&source, task(dir.path(), vec![employee()], settings()));
    wait_until(|| source.backlog_len() == 0).await;
    stop(shutdown_tx, handle).await.unwrap();

    assert_eq!(std::fs::read_to_string(&existing).unwrap(), "earlier");
    assert_eq!(
        std::fs::read_to_string(change_file(dir.path(), &employee(), 8)).unwrap(),
        USER3_RECORD
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn changes_of_other_tables_are_consumed_but_not_written() {
    init_test_tracing();
    let dir = TempDir::new().unwrap();
    let source = MemorySlotSource::new();
    let other = TableName::new("public", "other");
    source.push_insert(&other, &[("id", "integer")], vec![json!(1)]);
    source.push_raw("{not json");

    let (shutdown_tx, handle) = start(&source, task(dir.path(), vec![employee()], settings()));
    wait_until(|| source.backlog_len() == 0).await;
    stop(shutdown_tx, handle).await.unwrap();

    assert!(!dir.path().join(other.as_path_token()).exists());
    assert!(!dir.path().join(employee().as_path_token()).exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn tables_are_discovered_when_none_are_configured() {
    init_test_tracing();
    let dir = TempDir::new().unwrap();
    let source = MemorySlotSource::new().with_tables(vec![employee()]);
    source.push_insert(&employee(), EMPLOYEE_COLUMNS, vec![json!(3), json!("User3")]);
    source.push_insert(&TableName::new("public", "unknown"), &[("id", "integer")], vec![json!(1)]);

    let (shutdown_tx, handle) = start(&source, task(dir.path(), vec![], settings()));
    wait_until(|| source.backlog_len() == 0).await;
    stop(shutdown_tx, handle).await.unwrap();

    assert_eq!(
        std::fs::read_to_string(change_file(dir.path(), &employee(), 1)).unwrap(),
        USER3_RECORD
    );
    assert!(!dir.path().join("public_unknown").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_slot_is_an_error_when_it_must_exist() {
    init_test_tracing();
    let dir = TempDir::new().unwrap();
    let source = MemorySlotSource::new();
    let settings = CdcConfig {
        slot_creation: SlotCreation::RequireExisting,
        ..settings()
    };

    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let job = CdcJob::new(task(dir.path(), vec![employee()], settings));
    let err = job.run(&source, shutdown_rx).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConfigError);
    assert!(!source.has_slot("siphon_slot"));
    assert_eq!(source.peek_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn existing_slot_is_reused_and_dropped_when_configured() {
    init_test_tracing();
    let dir = TempDir::new().unwrap();
    let source = MemorySlotSource::new().with_slot("custom_slot");
    let settings = CdcConfig {
        slot_name: "custom_slot".to_string(),
        slot_creation: SlotCreation::RequireExisting,
        slot_retention: SlotRetention::Drop,
        ..settings()
    };
    source.push_insert(&employee(), EMPLOYEE_COLUMNS, vec![json!(3), json!("User3")]);

    let (shutdown_tx, handle) = start(&source, task(dir.path(), vec![employee()], settings));
    wait_until(|| source.backlog_len() == 0).await;
    stop(shutdown_tx, handle).await.unwrap();

    assert!(!source.has_slot("custom_slot"));
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_confirm_replays_the_batch() {
    init_test_tracing();
    let dir = TempDir::new().unwrap();
    let source = MemorySlotSource::new();
    source.fail_next_confirms(1);
    source.push_insert(&employee(), EMPLOYEE_COLUMNS, vec![json!(3), json!("User3")]);

    let (shutdown_tx, handle) = start(&source, task(dir.path(), vec![employee()], settings()));
    wait_until(|| source.backlog_len() == 0).await;
    stop(shutdown_tx, handle).await.unwrap();

    // Delivery is at least once: the unconfirmed batch is written a second time.
    for index in [1, 2] {
        assert_eq!(
            std::fs::read_to_string(change_file(dir.path(), &employee(), index)).unwrap(),
            USER3_RECORD
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_peek_failures_are_absorbed() {
    init_test_tracing();
    let dir = TempDir::new().unwrap();
    let source = MemorySlotSource::new();
    source.fail_next_peeks(2);
    source.push_insert(&employee(), EMPLOYEE_COLUMNS, vec![json!(3), json!("User3")]);

    let (shutdown_tx, handle) = start(&source, task(dir.path(), vec![employee()], settings()));
    wait_until(|| source.backlog_len() == 0).await;
    stop(shutdown_tx, handle).await.unwrap();

    assert!(source.peek_count() >= 3);
    assert!(change_file(dir.path(), &employee(), 1).exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn too_many_consecutive_failures_stop_the_worker() {
    init_test_tracing();
    let dir = TempDir::new().unwrap();
    let source = MemorySlotSource::new();
    source.fail_next_peeks(100);
    let settings = CdcConfig {
        max_consecutive_cycle_failures: 3,
        ..settings()
    };

    let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let job = CdcJob::new(task(dir.path(), vec![employee()], settings));
    let err = within_timeout(job.run(&source, shutdown_rx))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SourceConnectionFailed);
    assert_eq!(source.peek_count(), 3);
    assert_eq!(job.status(), CdcStatus::Stopped);
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_before_the_first_cycle_stops_cleanly() {
    init_test_tracing();
    let dir = TempDir::new().unwrap();
    let source = MemorySlotSource::new();
    source.push_insert(&employee(), EMPLOYEE_COLUMNS, vec![json!(3), json!("User3")]);

    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    shutdown_tx.shutdown().unwrap();

    let job = CdcJob::new(task(dir.path(), vec![employee()], settings()));
    within_timeout(job.run(&source, shutdown_rx)).await.unwrap();

    assert_eq!(job.status(), CdcStatus::Stopped);
    assert_eq!(source.peek_count(), 0);
    assert_eq!(source.backlog_len(), 1);
}
