use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

use crate::{AgentError, AgentResult};

const INITIAL_DELAY: Duration = Duration::from_millis(500);
const MAX_DELAY: Duration = Duration::from_secs(10);

/// Retry helper with exponential backoff for transient operations.
///
/// Only errors reported as transient by [`AgentError::is_transient`] are
/// retried; anything else, or the last transient error once `max_attempts`
/// is reached, is returned unchanged so callers can still match on it.
pub async fn retry_with_backoff<F, Fut, T>(
    operation_name: &str,
    mut operation: F,
    max_attempts: u32,
) -> AgentResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AgentResult<T>>,
{
    let mut attempt = 0;
    let mut delay = INITIAL_DELAY;

    loop {
        attempt += 1;
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) => {
                if attempt >= max_attempts.max(1) {
                    tracing::error!(
                        "{} failed after {} attempts: {}",
                        operation_name,
                        attempt,
                        e
                    );
                    return Err(e);
                }

                tracing::warn!(
                    "{} attempt {} failed: {}. Retrying in {:?}",
                    operation_name,
                    attempt,
                    e,
                    delay
                );
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}

/// Like [`retry_with_backoff`] but folds exhaustion into a single error.
pub async fn retry_or_give_up<F, Fut, T>(
    operation_name: &str,
    operation: F,
    max_attempts: u32,
) -> AgentResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AgentResult<T>>,
{
    retry_with_backoff(operation_name, operation, max_attempts)
        .await
        .map_err(|e| {
            if e.is_transient() {
                AgentError::RetryError(format!(
                    "{} failed after {} attempts: {}",
                    operation_name, max_attempts, e
                ))
            } else {
                e
            }
        })
}
