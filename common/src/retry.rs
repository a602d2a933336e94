//! Bounded confirmation polling for asynchronous provider operations.

use crate::error::{ComputeError, Result};
use std::future::Future;
use std::time::Duration;

/// What to do when a poll runs out of attempts while still in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exhaustion {
    /// Report success and assume the operation finishes eventually.
    AssumeSuccess,
    /// Report a provider error.
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
    pub on_exhausted: Exhaustion,
}

impl RetryPolicy {
    /// Instance actions: 10 polls one second apart, optimistic on timeout.
    pub const ACTION: RetryPolicy = RetryPolicy {
        max_attempts: 10,
        interval: Duration::from_secs(1),
        on_exhausted: Exhaustion::AssumeSuccess,
    };

    /// Detached floating IP association.
    pub const FLOATING_IP: RetryPolicy = RetryPolicy {
        max_attempts: 6,
        interval: Duration::from_secs(4),
        on_exhausted: Exhaustion::Fail,
    };

    /// Server-side tasks whose result the caller depends on.
    pub const TASK: RetryPolicy = RetryPolicy {
        max_attempts: 60,
        interval: Duration::from_secs(2),
        on_exhausted: Exhaustion::Fail,
    };

    pub const fn new(max_attempts: u32, interval: Duration, on_exhausted: Exhaustion) -> Self {
        Self {
            max_attempts,
            interval,
            on_exhausted,
        }
    }

    pub const fn with_interval(self, interval: Duration) -> Self {
        Self { interval, ..self }
    }

    /// Number of attempts to make; a zero bound still tries once.
    pub const fn attempts(&self) -> u32 {
        if self.max_attempts == 0 {
            1
        } else {
            self.max_attempts
        }
    }
}

/// Outcome of one probe of an asynchronous operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    Completed,
    InProgress,
    Failed(String),
}

/// Polls `probe` until it reports a terminal status or `policy` runs out.
///
/// Probe errors propagate immediately; `Failed` becomes a provider error.
pub async fn confirm<F, Fut>(policy: &RetryPolicy, label: &str, mut probe: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollStatus>>,
{
    let attempts = policy.attempts();
    for attempt in 1..=attempts {
        match probe().await? {
            PollStatus::Completed => {
                tracing::debug!("{} completed after {} poll(s)", label, attempt);
                return Ok(());
            }
            PollStatus::Failed(status) => {
                return Err(ComputeError::provider(
                    None,
                    format!("{} failed: {}", label, status),
                ));
            }
            PollStatus::InProgress => {}
        }

        if attempt < attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    match policy.on_exhausted {
        Exhaustion::AssumeSuccess => {
            tracing::warn!(
                "{} still in progress after {} polls, assuming it completes",
                label, attempts
            );
            Ok(())
        }
        Exhaustion::Fail => Err(ComputeError::provider(
            None,
            format!(
                "{} did not complete within {} polls",
                label, attempts
            ),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(policy: RetryPolicy) -> RetryPolicy {
        policy.with_interval(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_in_progress_beyond_bound_assumes_success() {
        let polls = AtomicU32::new(0);
        let counter = &polls;
        // the stub would keep reporting in-progress for 15 polls
        let result = confirm(&fast(RetryPolicy::ACTION), "power off", move || async move {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(if n <= 15 {
                PollStatus::InProgress
            } else {
                PollStatus::Completed
            })
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(polls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_failed_status_stops_immediately() {
        let polls = AtomicU32::new(0);
        let counter = &polls;
        let err = confirm(&fast(RetryPolicy::ACTION), "reboot", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(PollStatus::Failed("errored".to_string()))
        })
        .await
        .unwrap_err();

        assert_eq!(polls.load(Ordering::SeqCst), 1);
        assert_eq!(err.kind(), ErrorKind::Provider);
        assert!(err.to_string().contains("reboot failed: errored"));
    }

    #[tokio::test]
    async fn test_completed_after_some_polls() {
        let polls = AtomicU32::new(0);
        let counter = &polls;
        confirm(&fast(RetryPolicy::TASK), "clone", move || async move {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(if n < 3 {
                PollStatus::InProgress
            } else {
                PollStatus::Completed
            })
        })
        .await
        .unwrap();
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fail_policy_reports_timeout() {
        let policy = RetryPolicy::new(3, Duration::from_millis(5), Exhaustion::Fail);
        let err = confirm(&policy, "task", || async { Ok(PollStatus::InProgress) })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("did not complete within 3 polls"));
    }

    #[tokio::test]
    async fn test_probe_error_propagates() {
        let err = confirm(&RetryPolicy::ACTION, "start", || async {
            Err::<PollStatus, _>(ComputeError::transport("timeout"))
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn test_zero_bound_still_polls_once() {
        let polls = AtomicU32::new(0);
        let counter = &polls;
        let policy = RetryPolicy::new(0, Duration::from_millis(1), Exhaustion::AssumeSuccess);
        assert_eq!(policy.attempts(), 1);

        let err = confirm(&policy, "rebuild", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(PollStatus::Failed("errored".to_string()))
        })
        .await
        .unwrap_err();
        assert!(err.to_string().contains("rebuild failed: errored"));
        assert_eq!(polls.load(Ordering::SeqCst), 1);
    }
}
