use std::time::Duration;

use tokio::time::sleep;
use tokio::time::timeout;
use tracing::warn;

use crate::BackoffPolicy;
use crate::ClientError;
use crate::Error;
use crate::NetworkError;
use crate::Result;

/// Deterministic rejections are not worth another attempt
fn is_permanent(error: &Error) -> bool {
    matches!(error, Error::Client(e) if !matches!(e, ClientError::Unavailable(_)))
}

/// Runs `task` until it succeeds, doubling the delay between attempts up to
/// the policy's cap. Each attempt is bounded by the policy timeout.
pub(crate) async fn task_with_timeout_and_exponential_backoff<F, T, P>(
    task: F,
    policy: BackoffPolicy,
) -> Result<P>
where
    F: Fn() -> T,                               // The type of the async function
    T: std::future::Future<Output = Result<P>>, // The future returned by the async function
{
    let mut delay = Duration::from_millis(policy.base_delay_ms);
    let max_delay = Duration::from_millis(policy.max_delay_ms);
    let timeout_duration = policy.timeout();
    let mut last: Option<Error> = None;

    for attempt in 1..=policy.max_retries {
        match timeout(timeout_duration, task()).await {
            Ok(Ok(r)) => {
                return Ok(r); // Exit on success
            }
            Ok(Err(error)) => {
                if is_permanent(&error) {
                    return Err(error);
                }
                warn!(attempt, "task failed: {}", error);
                last = Some(error);
            }
            Err(_) => {
                warn!(attempt, "task timed out after {:?}", timeout_duration);
                last = Some(NetworkError::RetryTimeoutError(timeout_duration).into());
            }
        };

        if attempt < policy.max_retries {
            sleep(delay).await;
            delay = (delay * 2).min(max_delay);
        }
    }

    warn!("Task failed after {} retries", policy.max_retries);
    Err(last.unwrap_or_else(|| {
        NetworkError::TaskBackoffFailed(format!("task failed after {} retries", policy.max_retries)).into()
    }))
}
