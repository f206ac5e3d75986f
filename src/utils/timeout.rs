//! Async timeout helpers

use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

use crate::error::{Result, StationError};

/// Upper bound for dialing a covert target or reading a client preamble
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a liveness probe waits for a phantom to answer
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(750);

/// Grace period for tasks to drain after cancellation
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Run a fallible future with a deadline, mapping expiry to `StationError::Timeout`.
pub async fn with_timeout_error<F, T>(fut: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(StationError::Timeout),
    }
}
