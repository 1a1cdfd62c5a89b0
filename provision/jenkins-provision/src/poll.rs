//! Bounded polling and retry primitives
//!
//! Jenkins restarts several times during bootstrap, so most stages wait on
//! something: the HTTP endpoint coming up, a plugin install surviving a
//! restart. Both helpers log every attempt and give up at a hard bound
//! instead of hanging the instance forever.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

/// Run `probe` every `interval` until it returns true or `deadline` passes.
pub async fn poll_until<F, Fut>(
    what: &str,
    interval: Duration,
    deadline: Duration,
    mut probe: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let started = tokio::time::Instant::now();
    loop {
        if probe().await {
            info!("✓ {} ready after {:?}", what, started.elapsed());
            return Ok(());
        }
        // Do not sleep past the deadline just to fail on wakeup
        if started.elapsed() + interval > deadline {
            anyhow::bail!("{} not ready within {:?}", what, deadline);
        }
        tokio::time::sleep(interval).await;
    }
}

/// Run `op` up to `max_attempts` times with a fixed delay between attempts.
///
/// Returns the first success, or the last error annotated with the attempt
/// budget once it is exhausted.
pub async fn retry_fixed<T, F, Fut>(
    what: &str,
    max_attempts: u32,
    interval: Duration,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = None;
    for attempt in 1..=max_attempts {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    info!("✓ {} succeeded on attempt {}/{}", what, attempt, max_attempts);
                }
                return Ok(value);
            }
            Err(e) => {
                warn!("{} failed (attempt {}/{}): {:#}", what, attempt, max_attempts, e);
                last_err = Some(e);
                if attempt < max_attempts {
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }

    match last_err {
        Some(e) => Err(e.context(format!("{} failed after {} attempts", what, max_attempts))),
        None => anyhow::bail!("{} failed with a zero attempt budget", what),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_succeeds_on_later_probe() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = poll_until(
            "jenkins",
            Duration::from_secs(30),
            Duration::from_secs(100),
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move { n >= 4 }
            },
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_until_respects_deadline() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = poll_until(
            "jenkins",
            Duration::from_secs(30),
            Duration::from_secs(100),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { false }
            },
        )
        .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("not ready within"));
        // Probes at 0s, 30s, 60s and 90s; a fifth would land past the deadline
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_fixed_recovers_after_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let value = retry_fixed("plugin install", 5, Duration::from_secs(30), move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    anyhow::bail!("connection refused");
                }
                Ok(n)
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_fixed_reports_exhausted_budget() {
        let result: Result<()> = retry_fixed(
            "plugin install",
            5,
            Duration::from_secs(30),
            || async { anyhow::bail!("service unavailable") },
        )
        .await;

        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("after 5 attempts"));
        assert!(message.contains("service unavailable"));
    }
}
