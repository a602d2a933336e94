//! Detached best-effort work whose outcome no caller observes.

use crate::error::Result;
use crate::retry::RetryPolicy;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

pub trait TaskSpawner: Send + Sync {
    /// Runs `task` without joining it.
    fn spawn(&self, label: &str, task: BoxFuture<'static, ()>);
}

/// Spawns onto the ambient tokio runtime and drops the handle.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSpawner;

impl TaskSpawner for TokioSpawner {
    fn spawn(&self, label: &str, task: BoxFuture<'static, ()>) {
        tracing::debug!("Spawning detached task {}", label);
        drop(tokio::spawn(task));
    }
}

pub fn tokio_spawner() -> Arc<dyn TaskSpawner> {
    Arc::new(TokioSpawner)
}

/// Runs `attempt` in the background, sleeping `policy.interval` before each
/// try and stopping at the first success. Failures are only logged.
pub fn retry_detached<F, Fut>(spawner: &dyn TaskSpawner, policy: RetryPolicy, label: &str, mut attempt: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let task_label = label.to_string();
    spawner.spawn(
        label,
        Box::pin(async move {
            let attempts = policy.attempts();
            for n in 1..=attempts {
                tokio::time::sleep(policy.interval).await;
                match attempt().await {
                    Ok(()) => {
                        tracing::debug!("{} succeeded on attempt {}", task_label, n);
                        return;
                    }
                    Err(e) => tracing::debug!("{} attempt {} failed: {}", task_label, n, e),
                }
            }
            tracing::warn!("{} gave up after {} attempts", task_label, attempts);
        }),
    );
}
