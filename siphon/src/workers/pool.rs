use std::future::Future;

use tokio::task::JoinSet;
use tracing::{Instrument, Span, debug, error};

use crate::error::SiphonResult;
use crate::siphon_error;
use crate::types::TableName;
use crate::workers::base::{WorkerHandle, WorkerKind, WorkerName, WorkerOutcome, WorkerReport};
use crate::workers::registry::WorkerRegistry;

/// Workers spawned by one operator run.
///
/// Each worker runs on its own task. A companion task in the join set awaits it and turns the
/// way it ended into a [`WorkerReport`], so panics and aborts are reported with the worker they
/// belong to.
#[derive(Debug)]
pub struct WorkerPool {
    join_set: JoinSet<WorkerReport>,
    workers: Vec<WorkerHandle>,
    registry: WorkerRegistry,
}

impl WorkerPool {
    pub fn new(registry: WorkerRegistry) -> Self {
        Self {
            join_set: JoinSet::new(),
            workers: Vec::new(),
            registry,
        }
    }

    /// Spawns `future` as a worker of `kind`, instrumented with `span`, and tracks it in the
    /// registry.
    ///
    /// `span` must declare an empty `worker` field, which receives the generated name.
    pub async fn spawn<F>(
        &mut self,
        kind: WorkerKind,
        table_name: Option<TableName>,
        span: Span,
        future: F,
    ) -> WorkerHandle
    where
        F: Future<Output = SiphonResult<()>> + Send + 'static,
    {
        let name = WorkerName::generate(kind);
        span.record("worker", name.as_str());

        let task = tokio::spawn(future.instrument(span));
        let handle = WorkerHandle::new(name.clone(), kind, table_name.clone(), task.abort_handle());

        // Registered before the monitor starts so it cannot unregister a worker not yet tracked.
        self.registry.register(handle.clone()).await;

        let registry = self.registry.clone();
        self.join_set.spawn(async move {
            let outcome = match task.await {
                Ok(Ok(())) => WorkerOutcome::Completed,
                Ok(Err(err)) => WorkerOutcome::Failed(err),
                Err(err) if err.is_cancelled() => WorkerOutcome::Terminated,
                Err(err) => WorkerOutcome::Panicked(siphon_error!(
                    kind.panic_error_kind(),
                    "Worker panicked",
                    err
                )),
            };
            registry.unregister(&name).await;

            WorkerReport {
                name,
                kind,
                table_name,
                outcome,
            }
        });

        self.workers.push(handle.clone());

        debug!(worker = %handle.name(), %kind, "worker spawned");

        handle
    }

    /// Number of workers whose report was not yet collected.
    pub fn len(&self) -> usize {
        self.join_set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.join_set.is_empty()
    }

    /// Returns the handles of the workers that are still running.
    pub fn live_workers(&self) -> Vec<&WorkerHandle> {
        self.workers.iter().filter(|handle| handle.is_alive()).collect()
    }

    /// Waits for the next worker to end. Returns `None` once every report was collected.
    pub async fn join_next(&mut self) -> Option<WorkerReport> {
        loop {
            match self.join_set.join_next().await? {
                Ok(report) => {
                    self.workers.retain(|handle| handle.name() != &report.name);
                    return Some(report);
                }
                // The companion tasks are never aborted and do not panic.
                Err(err) => error!(error = %err, "worker monitor task failed"),
            }
        }
    }

    /// Aborts every running worker. Their reports still arrive through
    /// [`WorkerPool::join_next`] as [`WorkerOutcome::Terminated`].
    pub fn terminate_all(&self) {
        for handle in &self.workers {
            handle.terminate();
        }
    }
}
