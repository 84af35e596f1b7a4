use std::future::Future;
use std::time::Duration;

use crate::config::RetryPolicy;

/// Run `op` with bounded exponential-backoff retry.
///
/// Attempt `i` (0-based) that fails sleeps `backoff * 2^i` before the next
/// attempt; `max_retries` extra attempts follow the first. The final failure
/// is propagated unmodified; a success at any attempt returns immediately.
/// Sleeps suspend only the calling session's own task.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> std::result::Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= policy.max_retries {
                    return Err(err);
                }
                tokio::time::sleep(backoff_for(policy, attempt)).await;
                attempt += 1;
            }
        }
    }
}

fn backoff_for(policy: &RetryPolicy, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    policy.backoff.saturating_mul(factor)
}
