//! Bounded retry for chain queries.

use std::future::Future;
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use backoff::future::retry_notify;
use tracing::warn;

use crate::config::RetryConfig;
use crate::error::{ChainError, ChainResult};
use crate::metrics::record_rpc_retry;

/// Run `op` until it succeeds, fails permanently, or the budget runs out.
///
/// Transient errors ([`ChainError::is_transient`]) are retried with
/// exponential backoff. Running out of budget yields
/// [`ChainError::RetriesExhausted`]; the caller treats that as fatal.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, operation: &str, mut op: F) -> ChainResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ChainResult<T>>,
{
    let policy = ExponentialBackoffBuilder::new()
        .with_initial_interval(config.initial_interval)
        .with_max_interval(config.max_interval)
        .with_max_elapsed_time(Some(config.max_elapsed))
        .build();

    let result = retry_notify(
        policy,
        || {
            let attempt = op();
            async move {
                attempt.await.map_err(|e| {
                    if e.is_transient() {
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        },
        |err: ChainError, wait: Duration| {
            warn!(
                operation,
                error = %err,
                retry_in_ms = wait.as_millis(),
                "⚠️  Chain query failed, retrying..."
            );
            record_rpc_retry(operation);
        },
    )
    .await;

    result.map_err(|e| {
        if e.is_transient() {
            ChainError::RetriesExhausted {
                operation: operation.to_string(),
                last_error: e.to_string(),
            }
        } else {
            e
        }
    })
}
