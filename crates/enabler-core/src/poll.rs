//! Fixed-interval readiness polling
//!
//! Used while waiting for a restarted cluster to answer again. The wait is
//! deliberately simple: a fixed number of attempts at a fixed interval, no
//! backoff and no jitter. Sleeping goes through [`Sleeper`] so tests can
//! run the loop without waiting.

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// How long and how often to poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Total number of checks, the first one included
    pub max_attempts: u32,
    /// Pause between two checks
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            interval: Duration::from_secs(30),
        }
    }
}

/// Outcome of a polling run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Condition met on the given attempt (1-based)
    Ready { attempts: u32 },
    /// Every attempt came back negative
    Exhausted { attempts: u32 },
}

impl PollOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, PollOutcome::Ready { .. })
    }
}

/// Blocks the current task for a while
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real sleeper backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Call `check` until it reports `true` or the policy runs out.
///
/// Stops as soon as the condition holds. There is no sleep after the last
/// failed attempt. An error from `check` ends polling immediately.
pub async fn poll_until<F, Fut, E>(
    policy: &PollPolicy,
    sleeper: &dyn Sleeper,
    mut check: F,
) -> Result<PollOutcome, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    for attempt in 1..=max_attempts {
        if check().await? {
            return Ok(PollOutcome::Ready { attempts: attempt });
        }
        if attempt < max_attempts {
            debug!(
                attempt,
                max_attempts,
                interval_secs = policy.interval.as_secs(),
                "Not ready yet, waiting"
            );
            sleeper.sleep(policy.interval).await;
        }
    }
    Ok(PollOutcome::Exhausted {
        attempts: max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingSleeper;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn ready_on(n: u32, count: Arc<AtomicU32>) -> impl FnMut() -> std::future::Ready<Result<bool, ()>> {
        move || {
            let call = count.fetch_add(1, Ordering::SeqCst) + 1;
            std::future::ready(Ok(call >= n))
        }
    }

    #[tokio::test]
    async fn test_stops_as_soon_as_ready() {
        let count = Arc::new(AtomicU32::new(0));
        let sleeper = RecordingSleeper::default();

        let outcome = poll_until(&PollPolicy::default(), &sleeper, ready_on(4, count.clone()))
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::Ready { attempts: 4 });
        assert_eq!(count.load(Ordering::SeqCst), 4);
        assert_eq!(sleeper.sleeps(), vec![Duration::from_secs(30); 3]);
    }

    #[tokio::test]
    async fn test_ready_immediately_never_sleeps() {
        let count = Arc::new(AtomicU32::new(0));
        let sleeper = RecordingSleeper::default();

        let outcome = poll_until(&PollPolicy::default(), &sleeper, ready_on(1, count.clone()))
            .await
            .unwrap();

        assert!(outcome.is_ready());
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(sleeper.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_exhausts_after_max_attempts() {
        let count = Arc::new(AtomicU32::new(0));
        let sleeper = RecordingSleeper::default();

        let outcome = poll_until(&PollPolicy::default(), &sleeper, ready_on(u32::MAX, count.clone()))
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::Exhausted { attempts: 10 });
        assert_eq!(count.load(Ordering::SeqCst), 10);
        assert_eq!(sleeper.sleeps().len(), 9);
    }

    #[tokio::test]
    async fn test_check_error_aborts() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let sleeper = RecordingSleeper::default();

        let result: Result<PollOutcome, &str> = poll_until(&PollPolicy::default(), &sleeper, || {
            c.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Err("kubectl missing"))
        })
        .await;

        assert_eq!(result, Err("kubectl missing"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
