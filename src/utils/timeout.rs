//! Timeout utilities for driver and network operations

use std::future::Future;
use std::time::Duration;

/// Outcome of an operation that ran out of time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elapsed {
    pub after: Duration,
}

/// Wrap an async operation with an explicit timeout
///
/// Separates the timeout case from the operation's own failure so callers can
/// map each onto their error type.
pub async fn with_timeout<F, T>(operation: F, limit: Duration) -> Result<T, Elapsed>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(limit, operation)
        .await
        .map_err(|_| Elapsed { after: limit })
}
