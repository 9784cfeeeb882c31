//! Fixed-attempt retry for network-bound helm repository calls.
//!
//! Only `helm repo add` and `helm repo update` go through here, every other
//! external call fails on its first error.

use std::{future::Future, time::Duration};

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Sleep between two consecutive attempts
    pub backoff: Duration,
}

impl RetryPolicy {
    pub const HELM_REPOSITORY: RetryPolicy = RetryPolicy {
        max_attempts: 3,
        backoff: Duration::from_secs(5),
    };
}

pub async fn retry_fixed<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt >= policy.max_attempts => {
                tracing::error!(
                    operation = %operation_name,
                    attempt,
                    error = %e,
                    "Operation failed after max attempts"
                );
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(
                    operation = %operation_name,
                    attempt,
                    error = %e,
                    backoff_secs = policy.backoff.as_secs(),
                    "Operation failed, retrying"
                );
                tokio::time::sleep(policy.backoff).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            backoff: Duration::ZERO,
            ..RetryPolicy::HELM_REPOSITORY
        }
    }

    #[tokio::test]
    async fn stops_after_first_success() {
        for succeed_at in 1..=3u32 {
            let calls = Cell::new(0u32);

            let result: Result<u32, String> = retry_fixed(&policy(), "repo add", || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < succeed_at {
                        Err(format!("attempt {n} failed"))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

            assert_eq!(result, Ok(succeed_at));
            assert_eq!(calls.get(), succeed_at);
        }
    }

    #[tokio::test]
    async fn gives_up_after_exactly_three_attempts() {
        let calls = Cell::new(0u32);

        let result: Result<(), &str> = retry_fixed(&policy(), "repo update", || {
            calls.set(calls.get() + 1);
            async { Err::<(), _>("network unreachable") }
        })
        .await;

        assert_eq!(result, Err("network unreachable"));
        assert_eq!(calls.get(), 3);
    }
}
