//! Status poller
//!
//! Watches submitted jobs on the farm. Each job gets its own task that polls
//! on a fixed interval until the job reaches a terminal state. Updates are
//! stamped with a sequence number from a single counter, so the tracker can
//! tell a late reply from a fresh one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use farmhand_core::domain::job::JobId;
use farmhand_core::dto::status::StatusUpdate;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::broker::SubmissionBroker;
use crate::error::SubmitError;
use crate::registry::JobRegistry;
use crate::tracker::{JobStateTracker, Transition};

/// Polls the farm for the status of submitted jobs
#[derive(Debug)]
pub struct StatusPoller {
    interval: Duration,
    broker: Arc<SubmissionBroker>,
    registry: Arc<JobRegistry>,
    tracker: JobStateTracker,
    sequence: AtomicU64,
    watches: Mutex<HashMap<JobId, JoinHandle<()>>>,
}

impl StatusPoller {
    pub fn new(
        interval: Duration,
        broker: Arc<SubmissionBroker>,
        registry: Arc<JobRegistry>,
        tracker: JobStateTracker,
    ) -> Self {
        Self {
            interval,
            broker,
            registry,
            tracker,
            sequence: AtomicU64::new(0),
            watches: Mutex::new(HashMap::new()),
        }
    }

    /// Starts watching a job; does nothing if it is already watched
    pub fn watch(self: &Arc<Self>, job_id: JobId) {
        let mut watches = self.watches.lock().unwrap_or_else(PoisonError::into_inner);
        watches.retain(|_, handle| !handle.is_finished());
        if watches.contains_key(&job_id) {
            return;
        }

        debug!("Watching job {} every {:?}", job_id, self.interval);
        let poller = Arc::clone(self);
        let handle = tokio::spawn(async move { poller.run(job_id).await });
        watches.insert(job_id, handle);
    }

    /// Stops watching a job
    pub fn unwatch(&self, job_id: JobId) {
        let handle = self
            .watches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&job_id);
        if let Some(handle) = handle {
            handle.abort();
        }
    }

    /// Number of jobs with a live watch
    pub fn watching(&self) -> usize {
        self.watches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Stops every watch
    pub fn shutdown(&self) {
        let mut watches = self.watches.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, handle) in watches.drain() {
            handle.abort();
        }
    }

    async fn run(&self, job_id: JobId) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            match self.poll_once(job_id).await {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => warn!("Status poll for job {} failed: {}", job_id, e),
            }
        }

        info!(
            "Job {} finished as {:?}",
            job_id,
            self.registry.state(job_id)
        );
    }

    /// Polls one job once and applies the result
    ///
    /// # Returns
    /// Whether the job is finished and needs no further polling
    pub async fn poll_once(&self, job_id: JobId) -> Result<bool, SubmitError> {
        let Some(record) = self.registry.get(job_id) else {
            return Ok(true);
        };
        if record.state().is_terminal() {
            return Ok(true);
        }
        let Some(remote_id) = record.remote_id().cloned() else {
            return Ok(false);
        };

        let transition = match self.broker.query_status(&remote_id).await {
            Ok(snapshot) => {
                let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
                self.tracker.apply(&StatusUpdate::new(remote_id, sequence, snapshot))
            }
            Err(SubmitError::FarmJobMissing(missing)) => {
                warn!("Job {} vanished from the farm as {}", job_id, missing);
                self.tracker.farm_job_missing(&missing)
            }
            Err(e) => return Err(e),
        };
        self.cancel_orphans(&transition).await;

        Ok(self
            .registry
            .state(job_id)
            .is_none_or(|state| state.is_terminal()))
    }

    async fn cancel_orphans(&self, transition: &Transition) {
        for remote_id in &transition.orphaned {
            if let Err(e) = self.broker.cancel_remote(remote_id).await {
                warn!("Could not cancel orphaned farm job {}: {}", remote_id, e);
            }
        }
    }
}
