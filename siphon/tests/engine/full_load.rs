use std::path::Path;

use bytes::Bytes;
use siphon::error::ErrorKind;
use siphon::plugins::base::{CompletionNotifier, FullLoadTask};
use siphon::sink::SUCCESS_MARKER;
use siphon::test_utils::TEST_CONNECTION_STRING;
use siphon::test_utils::memory::MemorySnapshotSource;
use siphon::types::{NotificationStatus, TableName};
use siphon::workers::full_load::{FullLoadJob, FullLoadStatus};
use siphon_config::shared::SourceConfig;
use siphon_telemetry::tracing::init_test_tracing;
use tempfile::TempDir;

fn employee() -> TableName {
    TableName::new("public", "employee")
}

fn task(output_dir: &Path, split_threshold: u64) -> FullLoadTask {
    FullLoadTask {
        output_dir: output_dir.to_path_buf(),
        source: SourceConfig::new(TEST_CONNECTION_STRING),
        table_name: employee(),
        split_threshold,
    }
}

fn file_names(directory: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(directory)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();

    names
}

#[tokio::test(flavor = "multi_thread")]
async fn small_table_ends_up_in_a_single_shard() {
    init_test_tracing();
    let dir = TempDir::new().unwrap();
    let source = MemorySnapshotSource::new();
    source.add_table(employee(), &[&["1", "User1"], &["2", "User2"]]);
    let (notifier, mut completion_rx) = CompletionNotifier::channel();

    let job = FullLoadJob::new(task(dir.path(), 1_000_000));
    job.execute(&source, &notifier).await.unwrap();

    assert_eq!(
        file_names(dir.path()),
        vec![SUCCESS_MARKER.to_string(), "x00_public.employee.csv".to_string()]
    );
    assert_eq!(
        std::fs::read_to_string(dir.path().join("x00_public.employee.csv")).unwrap(),
        "1\tUser1\n2\tUser2\n"
    );
    assert_eq!(job.status(), FullLoadStatus::Completed);

    let completion = completion_rx.recv().await.unwrap();
    assert_eq!(completion.status, NotificationStatus::Success);
    assert_eq!(completion.table_name, employee());
    assert_eq!(completion.error, None);
    drop(notifier);
    assert!(completion_rx.recv().await.is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn rows_are_split_by_threshold() {
    init_test_tracing();
    let dir = TempDir::new().unwrap();
    let source = MemorySnapshotSource::new();
    // Chunks deliberately cut rows in the middle.
    source.add_table_chunks(
        employee(),
        vec![
            Bytes::from_static(b"1\tUs"),
            Bytes::from_static(b"er1\n2\tUser2\n3"),
            Bytes::from_static(b"\tUser3\n"),
        ],
    );
    let (notifier, _completion_rx) = CompletionNotifier::channel();

    FullLoadJob::new(task(dir.path(), 2))
        .execute(&source, &notifier)
        .await
        .unwrap();

    assert_eq!(
        file_names(dir.path()),
        vec![
            SUCCESS_MARKER.to_string(),
            "x00_public.employee.csv".to_string(),
            "x01_public.employee.csv".to_string(),
        ]
    );
    assert_eq!(
        std::fs::read_to_string(dir.path().join("x00_public.employee.csv")).unwrap(),
        "1\tUser1\n2\tUser2\n"
    );
    assert_eq!(
        std::fs::read_to_string(dir.path().join("x01_public.employee.csv")).unwrap(),
        "3\tUser3\n"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn threshold_of_one_writes_one_row_per_shard() {
    init_test_tracing();
    let dir = TempDir::new().unwrap();
    let source = MemorySnapshotSource::new();
    source.add_table(employee(), &[&["1", "User1"], &["2", "User2"]]);
    let (notifier, _completion_rx) = CompletionNotifier::channel();

    FullLoadJob::new(task(dir.path(), 1))
        .execute(&source, &notifier)
        .await
        .unwrap();

    assert_eq!(
        std::fs::read_to_string(dir.path().join("x00_public.employee.csv")).unwrap(),
        "1\tUser1\n"
    );
    assert_eq!(
        std::fs::read_to_string(dir.path().join("x01_public.employee.csv")).unwrap(),
        "2\tUser2\n"
    );
    assert!(!dir.path().join("public.employee_full.csv").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_table_produces_an_empty_shard() {
    init_test_tracing();
    let dir = TempDir::new().unwrap();
    let source = MemorySnapshotSource::new();
    source.add_table(employee(), &[]);
    let (notifier, mut completion_rx) = CompletionNotifier::channel();

    let job = FullLoadJob::new(task(dir.path(), 1_000_000));
    job.execute(&source, &notifier).await.unwrap();

    let shard = std::fs::metadata(dir.path().join("x00_public.employee.csv")).unwrap();
    assert_eq!(shard.len(), 0);
    assert!(dir.path().join(SUCCESS_MARKER).exists());
    assert_eq!(job.status(), FullLoadStatus::CompletedNoRecords);

    let completion = completion_rx.recv().await.unwrap();
    assert_eq!(completion.status, NotificationStatus::Success);
    assert_eq!(completion.error.as_deref(), Some("Table was empty"));
}

#[tokio::test(flavor = "multi_thread")]
async fn completed_directory_is_not_loaded_again() {
    init_test_tracing();
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(SUCCESS_MARKER), b"").unwrap();
    std::fs::write(dir.path().join("x00_public.employee.csv"), "1\tOld\n").unwrap();
    // The source does not know the table: reading it would fail.
    let source = MemorySnapshotSource::new();
    let (notifier, mut completion_rx) = CompletionNotifier::channel();

    FullLoadJob::new(task(dir.path(), 1_000_000))
        .execute(&source, &notifier)
        .await
        .unwrap();

    assert_eq!(
        std::fs::read_to_string(dir.path().join("x00_public.employee.csv")).unwrap(),
        "1\tOld\n"
    );
    let completion = completion_rx.recv().await.unwrap();
    assert_eq!(completion.status, NotificationStatus::Success);
    assert_eq!(completion.error.as_deref(), Some("Table already loaded"));
}

#[tokio::test(flavor = "multi_thread")]
async fn interrupted_load_is_restarted_from_scratch() {
    init_test_tracing();
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("public.employee_full.csv"), "1\tPartial").unwrap();
    std::fs::write(dir.path().join("x05_public.employee.csv"), "stale\n").unwrap();
    let source = MemorySnapshotSource::new();
    source.add_table(employee(), &[&["1", "User1"]]);
    let (notifier, _completion_rx) = CompletionNotifier::channel();

    FullLoadJob::new(task(dir.path(), 1_000_000))
        .execute(&source, &notifier)
        .await
        .unwrap();

    assert_eq!(
        file_names(dir.path()),
        vec![SUCCESS_MARKER.to_string(), "x00_public.employee.csv".to_string()]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_table_fails_without_marking_completion() {
    init_test_tracing();
    let dir = TempDir::new().unwrap();
    let source = MemorySnapshotSource::new();
    let (notifier, mut completion_rx) = CompletionNotifier::channel();

    let job = FullLoadJob::new(task(dir.path(), 1_000_000));
    let err = job.execute(&source, &notifier).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SourceQueryFailed);
    assert!(!dir.path().join(SUCCESS_MARKER).exists());
    assert_eq!(job.status(), FullLoadStatus::Started);
    drop(notifier);
    assert!(completion_rx.recv().await.is_none());
}
