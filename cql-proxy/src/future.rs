use std::future::Future;
use std::time::Duration;

use crate::{Error, Result};

/// An owned dynamically typed [`Future`] for use in cases where you can't
/// statically type your result or need to add some indirection.
pub type BoxFuture<'a, T> = futures::future::BoxFuture<'a, T>;

/// Runs given future with an optional deadline. An elapsed deadline is reported as
/// [`Error::Timeout`] carrying `what`.
pub async fn with_timeout<T, F>(timeout: Option<Duration>, what: impl FnOnce() -> String, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout {
        Some(timeout) => tokio::time::timeout(timeout, future)
            .await
            .map_err(|_| Error::Timeout(what()))
            .and_then(|result| result),
        None => future.await,
    }
}
