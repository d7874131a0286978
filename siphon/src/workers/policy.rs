use crate::error::{ErrorKind, SiphonError};

/// Whether a failed run is started again.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RetryDirective {
    /// Operational failure, a fresh run may succeed.
    Retry,
    /// Running again cannot succeed until something is changed by hand.
    FailFast,
}

/// Classifies `error`. Any configuration problem, including one among aggregated worker
/// errors, makes the whole failure non retriable.
pub fn retry_directive(error: &SiphonError) -> RetryDirective {
    let fail_fast = error
        .kinds()
        .into_iter()
        .any(|kind| matches!(kind, ErrorKind::ConfigError | ErrorKind::ValidationError));

    if fail_fast {
        RetryDirective::FailFast
    } else {
        RetryDirective::Retry
    }
}
