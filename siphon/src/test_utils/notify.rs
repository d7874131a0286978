use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::timeout;

/// Upper bound of every wait in tests. Nothing in the engine should take longer.
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// [`Notify`] whose waits panic after a timeout instead of hanging the test.
#[derive(Clone)]
pub struct TimedNotify {
    notify: Arc<Notify>,
    timeout_duration: Duration,
}

impl TimedNotify {
    pub fn new(notify: Arc<Notify>) -> Self {
        Self::with_timeout(notify, DEFAULT_NOTIFY_TIMEOUT)
    }

    pub fn with_timeout(notify: Arc<Notify>, timeout_duration: Duration) -> Self {
        Self {
            notify,
            timeout_duration,
        }
    }

    /// Waits for the next notification.
    ///
    /// # Panics
    ///
    /// Panics when no notification arrives within the timeout.
    pub async fn notified(&self) {
        if timeout(self.timeout_duration, self.notify.notified())
            .await
            .is_err()
        {
            panic!(
                "no notification received within {:?}, the awaited state was never reached",
                self.timeout_duration
            );
        }
    }

    pub fn inner(&self) -> &Arc<Notify> {
        &self.notify
    }
}

impl fmt::Debug for TimedNotify {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedNotify")
            .field("timeout_duration", &self.timeout_duration)
            .finish()
    }
}

/// Awaits `future` for at most [`DEFAULT_NOTIFY_TIMEOUT`].
///
/// # Panics
///
/// Panics when the future does not complete in time.
pub async fn within_timeout<F>(future: F) -> F::Output
where
    F: Future,
{
    match timeout(DEFAULT_NOTIFY_TIMEOUT, future).await {
        Ok(output) => output,
        Err(_) => panic!("operation did not complete within {DEFAULT_NOTIFY_TIMEOUT:?}"),
    }
}

/// Polls `condition` until it holds, for at most [`DEFAULT_NOTIFY_TIMEOUT`].
///
/// # Panics
///
/// Panics when the condition does not hold in time.
pub async fn wait_until<F>(mut condition: F)
where
    F: FnMut() -> bool,
{
    within_timeout(async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
}
