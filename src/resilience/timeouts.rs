//! Deadline enforcement for a single upstream attempt.
//!
//! Dropping the attempt's future on expiry cancels it; only that attempt is
//! aborted, never the surrounding retry sequence.

use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;

use crate::error::MediatorError;

/// Run `fut` with a hard deadline, mapping expiry to `MediatorError::Timeout`.
pub async fn with_deadline<F, T>(deadline: Duration, fut: F) -> Result<T, MediatorError>
where
    F: Future<Output = T>,
{
    timeout(deadline, fut)
        .await
        .map_err(|_| MediatorError::Timeout {
            timeout_ms: deadline.as_millis() as u64,
        })
}
