//! Submission service
//!
//! Wires the registry, resolver, broker, tracker and poller together and
//! drives a batch of jobs from parameters to farm completion.

use std::sync::Arc;

use farmhand_client::FarmConnector;
use farmhand_core::builder;
use farmhand_core::domain::job::{Job, JobId, JobState};
use farmhand_core::domain::record::{JobRecord, StateChange};
use farmhand_core::domain::submission::SubmissionResult;
use farmhand_core::dto::submit::SubmitParams;
use farmhand_core::error::GraphError;
use farmhand_core::planner;
use tracing::{debug, error, info, warn};

use crate::broker::SubmissionBroker;
use crate::config::BrokerConfig;
use crate::error::{RegisterError, SubmitError};
use crate::events::{EventBus, SubmissionObserver};
use crate::registry::JobRegistry;
use crate::resolver::SharedResolver;
use crate::scheduler::StatusPoller;
use crate::tracker::{JobStateTracker, Transition};

/// Outcome of one job in a batch submission
pub type BatchOutcome = (JobId, Result<SubmissionResult, SubmitError>);

/// Entry point for registering and submitting jobs
#[derive(Debug, Clone)]
pub struct SubmissionService {
    registry: Arc<JobRegistry>,
    resolver: Arc<SharedResolver>,
    broker: Arc<SubmissionBroker>,
    tracker: JobStateTracker,
    poller: Arc<StatusPoller>,
    events: EventBus,
}

impl SubmissionService {
    pub fn new(
        config: BrokerConfig,
        connector: Arc<dyn FarmConnector>,
        observers: Vec<Arc<dyn SubmissionObserver>>,
    ) -> Self {
        let events = EventBus::new(observers);
        let registry = Arc::new(JobRegistry::new());
        let tracker = JobStateTracker::new(Arc::clone(&registry), events.clone());
        let poll_interval = config.poll_interval;
        let broker = Arc::new(SubmissionBroker::new(
            config,
            connector,
            Arc::clone(&registry),
            tracker.clone(),
            events.clone(),
        ));
        let poller = Arc::new(StatusPoller::new(
            poll_interval,
            Arc::clone(&broker),
            Arc::clone(&registry),
            tracker.clone(),
        ));

        Self {
            registry,
            resolver: Arc::new(SharedResolver::new()),
            broker,
            tracker,
            poller,
            events,
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn broker(&self) -> &Arc<SubmissionBroker> {
        &self.broker
    }

    pub fn tracker(&self) -> &JobStateTracker {
        &self.tracker
    }

    pub fn poller(&self) -> &Arc<StatusPoller> {
        &self.poller
    }

    // =============================================================================
    // Registration
    // =============================================================================

    /// Builds, plans and registers the jobs described by `params`
    ///
    /// One job is registered per scene path. Nothing is registered if any
    /// of them fails.
    pub async fn register(&self, params: &SubmitParams) -> Result<Vec<JobId>, RegisterError> {
        let jobs = builder::build_all(params)?;

        let mut planned = Vec::with_capacity(jobs.len());
        for job in jobs {
            let tasks = planner::plan(job.id, job.frame_range, job.chunk_size)?;
            planned.push(JobRecord::new(job, tasks));
        }

        let mut ids = Vec::with_capacity(planned.len());
        for record in &planned {
            if let Err(e) = self.resolver.register(&record.job).await {
                for id in &ids {
                    self.resolver.remove(*id).await;
                }
                return Err(e.into());
            }
            ids.push(record.id());
        }

        for record in planned {
            info!(
                "Registered job '{}' ({}): frames {}, {} task(s)",
                record.job.name,
                record.id(),
                record.job.frame_range,
                record.tasks.len()
            );
            self.registry.insert(record);
        }
        Ok(ids)
    }

    /// Registers a job that was built elsewhere
    pub async fn register_job(&self, job: Job) -> Result<JobId, RegisterError> {
        let tasks = planner::plan(job.id, job.frame_range, job.chunk_size)?;
        self.resolver.register(&job).await?;
        let id = job.id;
        self.registry.insert(JobRecord::new(job, tasks));
        Ok(id)
    }

    // =============================================================================
    // Submission
    // =============================================================================

    /// Submits every registered job that has not been submitted yet
    ///
    /// Jobs are started in dependency order and run concurrently; each waits
    /// for its upstream jobs as needed. Results come back in that order.
    pub async fn submit_pending(&self) -> Result<Vec<BatchOutcome>, GraphError> {
        let pending = self
            .registry
            .ids_in(&[JobState::Draft, JobState::Validated]);
        let order = self.resolver.resolve_submission_order(&pending).await?;
        info!("Submitting {} job(s)", order.len());

        let handles: Vec<_> = order
            .into_iter()
            .map(|job_id| {
                let service = self.clone();
                (
                    job_id,
                    tokio::spawn(async move { service.submit_when_ready(job_id).await }),
                )
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (job_id, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Submission task for job {} stopped: {}", job_id, e);
                    Err(SubmitError::Interrupted(job_id))
                }
            };
            outcomes.push((job_id, outcome));
        }
        Ok(outcomes)
    }

    /// Submits one job, waiting for its upstream jobs first
    ///
    /// On success the job is watched until it finishes on the farm.
    pub async fn submit_when_ready(&self, job_id: JobId) -> Result<SubmissionResult, SubmitError> {
        let mut changes = self.registry.subscribe();

        loop {
            match self.broker.submit(job_id).await {
                Err(SubmitError::DependenciesPending { waiting, .. }) => {
                    debug!("Job {} waiting on {} upstream job(s)", job_id, waiting.len());
                    if changes.changed().await.is_err() {
                        return Err(SubmitError::Interrupted(job_id));
                    }
                }
                Ok(result) => {
                    if result.success {
                        self.poller.watch(job_id);
                    }
                    return Ok(result);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Waits until `job_id` reaches a terminal state
    pub async fn wait_for(&self, job_id: JobId) -> Option<JobState> {
        let mut changes = self.registry.subscribe();
        loop {
            let state = self.registry.state(job_id)?;
            if state.is_terminal() {
                return Some(state);
            }
            if changes.changed().await.is_err() {
                return self.registry.state(job_id);
            }
        }
    }

    // =============================================================================
    // Caller Requests
    // =============================================================================

    /// Cancels a job and fails its dependents
    ///
    /// Farm jobs that no longer have a reason to run are removed on a best
    /// effort basis.
    ///
    /// # Returns
    /// `false` if the job is unknown or already finished
    pub async fn cancel(&self, job_id: JobId) -> bool {
        let Some(transition) = self.tracker.cancel(job_id) else {
            return false;
        };
        self.finish_cancel(&transition).await;
        true
    }

    async fn finish_cancel(&self, transition: &Transition) {
        for change in &transition.changes {
            self.poller.unwatch(change.job_id);
        }
        for remote_id in &transition.orphaned {
            if let Err(e) = self.broker.cancel_remote(remote_id).await {
                warn!("Could not cancel farm job {}: {}", remote_id, e);
            }
        }
    }

    /// Returns a failed or cancelled job to `Validated` so it can be
    /// submitted again
    pub fn reset(&self, job_id: JobId) -> Result<StateChange, SubmitError> {
        self.tracker.reset(job_id)
    }

    // =============================================================================
    // Persistence
    // =============================================================================

    /// Copies every job record, oldest first
    pub fn snapshot(&self) -> Vec<JobRecord> {
        self.registry.snapshot()
    }

    /// Loads job records saved by [`SubmissionService::snapshot`]
    ///
    /// Dependency edges to jobs missing from the snapshot are dropped, and
    /// jobs that were running on the farm are watched again.
    pub async fn restore(&self, mut records: Vec<JobRecord>) -> Vec<StateChange> {
        records.sort_by_key(|r| (r.job.created_at, r.id()));

        for record in &records {
            let mut job = record.job.clone();
            job.dependencies.retain(|d| {
                let known = records.iter().any(|r| r.id() == d.upstream);
                if !known {
                    warn!(
                        "Job {} depends on {}, which is not in the snapshot",
                        record.id(),
                        d.upstream
                    );
                }
                known
            });
            if let Err(e) = self.resolver.register(&job).await {
                warn!("Could not restore dependencies of job {}: {}", job.id, e);
            }
        }

        let watch: Vec<JobId> = records
            .iter()
            .filter(|r| r.state() == JobState::Submitted && r.remote_id().is_some())
            .map(JobRecord::id)
            .collect();

        let changes = self.registry.restore(records);
        self.events.status_changed(&changes);
        for job_id in watch {
            self.poller.watch(job_id);
        }
        info!("Restored {} job(s)", self.registry.len());
        changes
    }

    /// Stops polling and closes the farm session
    pub async fn shutdown(&self) {
        self.poller.shutdown();
        self.broker.shutdown().await;
        info!("Submission service stopped");
    }
}
