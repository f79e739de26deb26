//! Bounded retry of transient log failures.

use std::future::Future;
use std::time::Duration;

use backon::Retryable;
use event_store::EventStoreError;
use tracing::warn;

use crate::ManagementSettings;

/// Runs a log operation, retrying `Timeout`/`Unavailable` failures with
/// exponential backoff. Each attempt is bounded by `write_timeout`.
///
/// Deterministic failures (`WrongExpectedVersion`, `AccessDenied`, ...) are
/// returned on the first occurrence.
pub async fn retry_transient<T, F, Fut>(
    settings: &ManagementSettings,
    operation: &str,
    mut op: F,
) -> event_store::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = event_store::Result<T>>,
{
    let deadline = settings.write_timeout;
    (|| {
        let attempt = op();
        async move {
            match tokio::time::timeout(deadline, attempt).await {
                Ok(result) => result,
                Err(_) => Err(EventStoreError::Timeout(format!(
                    "{operation} exceeded {deadline:?}"
                ))),
            }
        }
    })
    .retry(settings.backoff())
    .when(|e: &EventStoreError| e.is_transient())
    .notify(|err: &EventStoreError, delay: Duration| {
        metrics::counter!("projection_write_retries_total", "operation" => operation.to_string())
            .increment(1);
        warn!(operation, error = %err, ?delay, "transient log failure, retrying");
    })
    .await
}
