use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::workers::base::{WorkerHandle, WorkerName};

/// Process wide set of running workers, keyed by name.
///
/// Shared between the operator, which registers the workers it spawns, and the signal
/// handler, which force-terminates them.
#[derive(Debug, Clone, Default)]
pub struct WorkerRegistry {
    inner: Arc<Mutex<HashMap<WorkerName, WorkerHandle>>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, handle: WorkerHandle) {
        debug!(worker = %handle.name(), "worker registered");

        let mut inner = self.inner.lock().await;
        inner.insert(handle.name().clone(), handle);
    }

    pub async fn unregister(&self, name: &WorkerName) -> Option<WorkerHandle> {
        let mut inner = self.inner.lock().await;
        inner.remove(name)
    }

    /// Returns the names of the tracked workers whose task has not finished.
    pub async fn live_workers(&self) -> Vec<WorkerName> {
        let inner = self.inner.lock().await;
        let mut names: Vec<_> = inner
            .values()
            .filter(|handle| handle.is_alive())
            .map(|handle| handle.name().clone())
            .collect();
        names.sort();

        names
    }

    /// Aborts and forgets every worker whose name starts with `prefix`.
    ///
    /// Returns the names of the workers that were still alive.
    pub async fn terminate_with_prefix(&self, prefix: &str) -> Vec<String> {
        let mut inner = self.inner.lock().await;

        let matching: Vec<WorkerName> = inner
            .keys()
            .filter(|name| name.as_str().starts_with(prefix))
            .cloned()
            .collect();

        let mut terminated = Vec::new();
        for name in matching {
            if let Some(handle) = inner.remove(&name)
                && handle.is_alive()
            {
                handle.terminate();
                terminated.push(name.to_string());
            }
        }
        terminated.sort();

        terminated
    }
}
