//! Submission lifecycle events
//!
//! Observers are registered once, when the service is built, and are called
//! synchronously after the registry lock has been released. An observer must
//! not block; hand work off to a task if it needs to.

use std::sync::Arc;

use farmhand_core::domain::job::Job;
use farmhand_core::domain::record::StateChange;
use farmhand_core::domain::submission::SubmissionResult;
use tracing::{info, warn};

/// Hooks around submission and state tracking
///
/// Every method has an empty default so observers implement only what they
/// care about.
pub trait SubmissionObserver: Send + Sync {
    /// Called once the job has moved to `Submitting`, before the first farm call
    fn before_submit(&self, _job: &Job) {}

    /// Called with the final outcome of a submission, retries included
    fn after_submit(&self, _job: &Job, _result: &SubmissionResult) {}

    /// Called for every job state change
    fn on_status_change(&self, _change: &StateChange) {}
}

/// Fan-out to the registered observers
#[derive(Clone, Default)]
pub struct EventBus {
    observers: Arc<Vec<Arc<dyn SubmissionObserver>>>,
}

impl EventBus {
    pub fn new(observers: Vec<Arc<dyn SubmissionObserver>>) -> Self {
        Self {
            observers: Arc::new(observers),
        }
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    pub fn before_submit(&self, job: &Job) {
        for observer in self.observers.iter() {
            observer.before_submit(job);
        }
    }

    pub fn after_submit(&self, job: &Job, result: &SubmissionResult) {
        for observer in self.observers.iter() {
            observer.after_submit(job, result);
        }
    }

    pub fn status_changed(&self, changes: &[StateChange]) {
        for change in changes {
            for observer in self.observers.iter() {
                observer.on_status_change(change);
            }
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.observers.len())
            .finish()
    }
}

/// Observer that writes every event to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SubmissionObserver for TracingObserver {
    fn before_submit(&self, job: &Job) {
        info!("Submitting job '{}' ({}) to pool '{}'", job.name, job.id, job.pool);
    }

    fn after_submit(&self, job: &Job, result: &SubmissionResult) {
        if result.success {
            info!(
                "Job '{}' accepted by farm after {} attempt(s): {}",
                job.name, result.attempts, result.message
            );
        } else {
            warn!(
                "Job '{}' not submitted after {} attempt(s): {}",
                job.name, result.attempts, result.message
            );
        }
    }

    fn on_status_change(&self, change: &StateChange) {
        info!("Job {}: {} -> {}", change.job_id, change.from, change.to);
    }
}
