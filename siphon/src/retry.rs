//! Restarting of failed runs.

use std::future::Future;
use std::time::Duration;

use siphon_config::shared::JobConfig;
use tracing::{error, info, warn};

use crate::error::SiphonResult;
use crate::workers::policy::{RetryDirective, retry_directive};

/// Starts a run again after operational failures, with a fixed delay between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetrySupervisor {
    max_retries: u32,
    retry_delay: Duration,
}

impl RetrySupervisor {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
        }
    }

    pub fn from_config(config: &JobConfig) -> Self {
        Self::new(config.max_retries, config.retry_delay())
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Runs the future built by `factory` until it succeeds.
    ///
    /// A failure is retried at most `max_retries` times, so the factory is invoked at most
    /// `max_retries + 1` times. Failures classified as [`RetryDirective::FailFast`] are returned
    /// right away. Once retries are exhausted the last error is returned.
    pub async fn run<F, Fut, T>(&self, mut factory: F) -> SiphonResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SiphonResult<T>>,
    {
        let max_attempts = self.max_retries.saturating_add(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            info!(attempt, max_attempts, "starting run");

            let err = match factory().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            error!(attempt, max_attempts, error = %err, "run failed");

            if retry_directive(&err) == RetryDirective::FailFast {
                warn!("failure is not retriable, giving up");
                return Err(err);
            }

            if attempt >= max_attempts {
                warn!(attempts = attempt, "retries exhausted, giving up");
                return Err(err);
            }

            info!(delay_ms = self.retry_delay.as_millis() as u64, "retrying after delay");
            tokio::time::sleep(self.retry_delay).await;
        }
    }
}

/// Shorthand for [`RetrySupervisor::run`].
pub async fn run_with_retries<F, Fut, T>(
    factory: F,
    max_retries: u32,
    retry_delay: Duration,
) -> SiphonResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SiphonResult<T>>,
{
    RetrySupervisor::new(max_retries, retry_delay)
        .run(factory)
        .await
}
