use crate::error::{ComputeError, Result};
use std::future::Future;
use std::sync::{Arc, Mutex};

/// Receives failures of compensating actions (partial-create deletes,
/// temporary key removal). These never replace the primary result.
pub trait CleanupReporter: Send + Sync {
    fn cleanup_failed(&self, action: &str, resource: &str, error: &ComputeError);
}

/// Reports cleanup failures as warnings.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl CleanupReporter for LogReporter {
    fn cleanup_failed(&self, action: &str, resource: &str, error: &ComputeError) {
        tracing::warn!("Cleanup {} of {} failed: {}", action, resource, error);
    }
}

pub fn log_reporter() -> Arc<dyn CleanupReporter> {
    Arc::new(LogReporter)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupEvent {
    pub action: String,
    pub resource: String,
    pub error: ComputeError,
}

/// Keeps cleanup failures in memory so tests can assert on them.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<CleanupEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<CleanupEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl CleanupReporter for RecordingReporter {
    fn cleanup_failed(&self, action: &str, resource: &str, error: &ComputeError) {
        LogReporter.cleanup_failed(action, resource, error);
        let event = CleanupEvent {
            action: action.to_string(),
            resource: resource.to_string(),
            error: error.clone(),
        };
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Runs a compensating action, reporting and swallowing its failure.
pub async fn best_effort<F>(reporter: &dyn CleanupReporter, action: &str, resource: &str, cleanup: F)
where
    F: Future<Output = Result<()>>,
{
    tracing::debug!("Running cleanup {} of {}", action, resource);
    if let Err(e) = cleanup.await {
        reporter.cleanup_failed(action, resource, &e);
    }
}
