//! Bounded waits for observer probes.
//!
//! Every external condition check goes through one of these so a stuck
//! probe turns into `Error::Timeout` instead of hanging its observer.

use std::future::Future;
use std::time::Duration;

use tokio::task::spawn_blocking;
use tokio::time::timeout;

use crate::{Error, Result};

/// Run a blocking probe (file stat/read) on the blocking pool with a deadline.
pub async fn blocking_with_timeout<F, T>(duration: Duration, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match timeout(duration, spawn_blocking(f)).await {
        Ok(Ok(inner)) => inner,
        Ok(Err(join_err)) => Err(Error::TaskJoin(join_err.to_string())),
        Err(_) => Err(Error::Timeout(duration)),
    }
}

/// Await an async probe with a deadline.
pub async fn with_timeout<F, T>(duration: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    timeout(duration, fut)
        .await
        .unwrap_or(Err(Error::Timeout(duration)))
}
