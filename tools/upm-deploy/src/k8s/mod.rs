pub mod conditions;

use std::{future::Future, time::Duration};

use tokio::time::{sleep, Instant};

use crate::error::DeployError;

pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Polls `check` until it returns true. Running out of time is fatal, and so
/// is any error from `check` itself.
pub async fn wait_until<F, Fut>(
    what: &str,
    limit: Duration,
    interval: Duration,
    mut check: F,
) -> anyhow::Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<bool>>,
{
    let deadline = Instant::now() + limit;

    loop {
        match check().await {
            Ok(true) => {
                tracing::info!("{what} is ready");
                return Ok(());
            }
            Ok(false) => tracing::debug!("{what} not ready yet"),
            Err(e) => return Err(e.context(format!("Checking {what} failed"))),
        }

        if Instant::now() + interval > deadline {
            return Err(DeployError::ReadinessTimeout {
                what: what.to_string(),
                timeout: limit,
            }
            .into());
        }

        sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[tokio::test]
    async fn returns_once_ready() {
        let polls = Cell::new(0);

        wait_until("pods", Duration::from_secs(5), Duration::from_millis(1), || {
            polls.set(polls.get() + 1);
            let ready = polls.get() >= 3;
            async move { Ok::<_, anyhow::Error>(ready) }
        })
        .await
        .unwrap();

        assert_eq!(polls.get(), 3);
    }

    #[tokio::test]
    async fn times_out_with_a_readiness_error() {
        let err = wait_until("pods", Duration::from_millis(20), Duration::from_millis(5), || async {
            Ok::<_, anyhow::Error>(false)
        })
        .await
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<DeployError>(),
            Some(DeployError::ReadinessTimeout { .. })
        ));
    }

    #[tokio::test]
    async fn check_errors_fail_on_the_first_call() {
        let polls = Cell::new(0);

        let err = wait_until("nodes", Duration::from_secs(5), Duration::from_millis(1), || {
            polls.set(polls.get() + 1);
            async { Err::<bool, _>(anyhow::anyhow!("nodes is forbidden")) }
        })
        .await
        .unwrap_err();

        assert_eq!(polls.get(), 1);
        assert!(err.downcast_ref::<DeployError>().is_none());
        assert!(format!("{err:#}").contains("nodes is forbidden"));
    }
}
