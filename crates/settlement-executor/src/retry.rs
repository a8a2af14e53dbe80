//! Exponential-backoff retry used by steps 2–4 of the single-chain
//! settlement algorithm.

use std::time::Duration;

use settlement_types::SettlementError;
use tracing::warn;

/// Calls `f` while its error is [`SettlementError::retryable`], up to
/// `max_retries` attempts total, sleeping `base_delay * 2^(attempt-1)`
/// between attempts. A non-retryable error returns immediately after a
/// single attempt.
pub async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    base_delay: Duration,
    mut f: F,
) -> Result<T, SettlementError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, SettlementError>>,
{
    let mut attempt: u32 = 1;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if err.retryable() && attempt < max_retries => {
                let delay = base_delay * 2u32.pow(attempt - 1);
                warn!(attempt, ?delay, error = %err, "retrying after transient error");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
