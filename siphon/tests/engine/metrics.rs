use std::collections::HashMap;
use std::path::Path;

use metrics::with_local_recorder;
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use serde_json::json;
use siphon::concurrency::shutdown::create_shutdown_channel;
use siphon::metrics::{
    SIPHON_CDC_CYCLE_FAILURES_TOTAL, SIPHON_CDC_CYCLES_CONFIRMED_TOTAL,
    SIPHON_CDC_MALFORMED_CHANGES_TOTAL, SIPHON_CDC_RECORDS_WRITTEN_TOTAL,
    SIPHON_FULL_LOAD_ROWS_COPIED_TOTAL, SIPHON_FULL_LOAD_SHARDS_WRITTEN_TOTAL, TABLE_NAME_LABEL,
};
use siphon::plugins::base::{CdcTask, CompletionNotifier, FullLoadTask};
use siphon::test_utils::TEST_CONNECTION_STRING;
use siphon::test_utils::memory::{MemorySlotSource, MemorySnapshotSource};
use siphon::test_utils::notify::wait_until;
use siphon::types::TableName;
use siphon::workers::cdc::CdcJob;
use siphon::workers::full_load::FullLoadJob;
use siphon_config::shared::{CdcConfig, SourceConfig};
use siphon_telemetry::tracing::init_test_tracing;
use tempfile::TempDir;

const EMPLOYEE: &str = "public.employee";

fn employee() -> TableName {
    TableName::new("public", "employee")
}

/// The local recorder is thread bound, so the workers run on a current thread runtime.
fn run_recorded<F: Future>(recorder: &DebuggingRecorder, future: F) -> F::Output {
    with_local_recorder(recorder, || {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(future)
    })
}

/// Counter values keyed by name and table label.
fn counters(snapshotter: &Snapshotter) -> HashMap<(String, Option<String>), u64> {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .filter_map(|(key, _, _, value)| {
            let DebugValue::Counter(count) = value else {
                return None;
            };
            let key = key.key();
            let table = key
                .labels()
                .find(|label| label.key() == TABLE_NAME_LABEL)
                .map(|label| label.value().to_string());

            Some(((key.name().to_string(), table), count))
        })
        .collect()
}

fn counter(
    counters: &HashMap<(String, Option<String>), u64>,
    name: &str,
    table: Option<&str>,
) -> u64 {
    counters
        .get(&(name.to_string(), table.map(str::to_string)))
        .copied()
        .unwrap_or(0)
}

fn cdc_task(output_dir: &Path) -> CdcTask {
    CdcTask {
        output_dir: output_dir.to_path_buf(),
        source: SourceConfig::new(TEST_CONNECTION_STRING),
        table_names: vec![employee()],
        settings: CdcConfig {
            poll_interval_secs: 0.01,
            ..CdcConfig::default()
        },
    }
}

#[test]
fn full_load_counts_rows_and_shards() {
    init_test_tracing();
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    let dir = TempDir::new().unwrap();
    let source = MemorySnapshotSource::new();
    source.add_table(
        employee(),
        &[&["1", "User1"], &["2", "User2"], &["3", "User3"]],
    );

    run_recorded(&recorder, async {
        let (notifier, _completion_rx) = CompletionNotifier::channel();
        let job = FullLoadJob::new(FullLoadTask {
            output_dir: dir.path().to_path_buf(),
            source: SourceConfig::new(TEST_CONNECTION_STRING),
            table_name: employee(),
            split_threshold: 2,
        });
        job.execute(&source, &notifier).await.unwrap();
    });

    let counters = counters(&snapshotter);
    assert_eq!(
        counter(&counters, SIPHON_FULL_LOAD_ROWS_COPIED_TOTAL, Some(EMPLOYEE)),
        3
    );
    assert_eq!(
        counter(&counters, SIPHON_FULL_LOAD_SHARDS_WRITTEN_TOTAL, Some(EMPLOYEE)),
        2
    );
}

#[test]
fn cdc_counts_records_failures_and_confirmed_cycles() {
    init_test_tracing();
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    let dir = TempDir::new().unwrap();
    let source = MemorySlotSource::new();
    source.push_insert(&employee(), &[("id", "integer")], vec![json!(1)]);
    source.push_insert(&employee(), &[("id", "integer")], vec![json!(2)]);
    source.push_raw("{not json");
    // The first cycle writes its records but cannot consume them, so the second one replays.
    source.fail_next_confirms(1);

    run_recorded(&recorder, async {
        let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let job = CdcJob::new(cdc_task(dir.path()));

        let stop = async {
            wait_until(|| source.backlog_len() == 0).await;
            shutdown_tx.shutdown().unwrap();
        };
        let (result, ()) = tokio::join!(job.run(&source, shutdown_rx), stop);
        result.unwrap();
    });

    let counters = counters(&snapshotter);
    assert_eq!(
        counter(&counters, SIPHON_CDC_RECORDS_WRITTEN_TOTAL, Some(EMPLOYEE)),
        4
    );
    assert_eq!(counter(&counters, SIPHON_CDC_MALFORMED_CHANGES_TOTAL, None), 2);
    assert_eq!(counter(&counters, SIPHON_CDC_CYCLE_FAILURES_TOTAL, None), 1);
    assert_eq!(counter(&counters, SIPHON_CDC_CYCLES_CONFIRMED_TOTAL, None), 1);
}
