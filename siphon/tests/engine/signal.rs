use std::future;

use siphon::concurrency::signal::terminate_tracked_workers;
use siphon::test_utils::notify::wait_until;
use siphon::types::{RESERVED_WORKER_PREFIX, TableName};
use siphon::workers::base::{WorkerHandle, WorkerKind, WorkerName, WorkerOutcome};
use siphon::workers::pool::WorkerPool;
use siphon::workers::registry::WorkerRegistry;
use siphon_telemetry::tracing::init_test_tracing;
use tracing::{field, info_span};

#[tokio::test(flavor = "multi_thread")]
async fn prefixed_workers_are_terminated() {
    init_test_tracing();
    let registry = WorkerRegistry::new();
    let mut pool = WorkerPool::new(registry.clone());

    for table in ["employee", "department"] {
        pool.spawn(
            WorkerKind::FullLoad,
            Some(TableName::new("public", table)),
            info_span!("full_load_worker", worker = field::Empty),
            async {
                future::pending::<()>().await;
                Ok(())
            },
        )
        .await;
    }

    // A task tracked under a foreign name is left alone.
    let foreign = tokio::spawn(future::pending::<()>());
    registry
        .register(WorkerHandle::new(
            WorkerName::new("external_task"),
            WorkerKind::Cdc,
            None,
            foreign.abort_handle(),
        ))
        .await;

    let terminated = terminate_tracked_workers(&registry).await;

    assert_eq!(terminated.len(), 2);
    assert!(
        terminated
            .iter()
            .all(|name| name.starts_with(RESERVED_WORKER_PREFIX))
    );

    let mut outcomes = Vec::new();
    while let Some(report) = pool.join_next().await {
        outcomes.push(report.outcome);
    }
    assert_eq!(outcomes.len(), 2);
    assert!(
        outcomes
            .iter()
            .all(|outcome| matches!(outcome, WorkerOutcome::Terminated))
    );

    assert!(!foreign.is_finished());
    assert_eq!(
        registry.live_workers().await,
        vec![WorkerName::new("external_task")]
    );
    foreign.abort();
}

#[tokio::test(flavor = "multi_thread")]
async fn finished_workers_leave_the_registry() {
    init_test_tracing();
    let registry = WorkerRegistry::new();
    let mut pool = WorkerPool::new(registry.clone());

    let handle = pool
        .spawn(
            WorkerKind::Cdc,
            None,
            info_span!("cdc_worker", worker = field::Empty),
            async { Ok(()) },
        )
        .await;

    let report = pool.join_next().await.unwrap();
    assert_eq!(&report.name, handle.name());
    assert!(matches!(report.outcome, WorkerOutcome::Completed));

    wait_until(|| !handle.is_alive()).await;
    assert!(registry.live_workers().await.is_empty());
    assert!(terminate_tracked_workers(&registry).await.is_empty());
}
