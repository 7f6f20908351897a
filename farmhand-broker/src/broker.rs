//! Farm Submission Broker
//!
//! The only component that calls the farm client. A submission makes at most
//! `max_retries + 1` farm calls: transient failures are retried with capped
//! exponential backoff, while rejections and a missing client fail at once.
//! Each call holds a permit from a shared semaphore and is bounded by the
//! attempt timeout.

use std::future::Future;
use std::sync::Arc;

use farmhand_client::{ClientError, FarmClient, FarmConnector};
use farmhand_core::domain::job::{JobId, RemoteJobId};
use farmhand_core::domain::submission::{ErrorKind, SubmissionResult};
use farmhand_core::dto::descriptor::FarmJobDescriptor;
use farmhand_core::dto::status::StatusSnapshot;
use tokio::sync::Semaphore;
use tokio::time;
use tracing::{debug, error, info, warn};

use crate::config::BrokerConfig;
use crate::error::SubmitError;
use crate::events::EventBus;
use crate::registry::JobRegistry;
use crate::session::FarmSession;
use crate::tracker::JobStateTracker;

/// Submits jobs to the farm and relays other farm calls
#[derive(Debug)]
pub struct SubmissionBroker {
    config: BrokerConfig,
    session: FarmSession,
    registry: Arc<JobRegistry>,
    tracker: JobStateTracker,
    events: EventBus,
    permits: Semaphore,
}

impl SubmissionBroker {
    pub fn new(
        config: BrokerConfig,
        connector: Arc<dyn FarmConnector>,
        registry: Arc<JobRegistry>,
        tracker: JobStateTracker,
        events: EventBus,
    ) -> Self {
        let permits = Semaphore::new(config.max_concurrent_farm_calls);
        Self {
            config,
            session: FarmSession::new(connector),
            registry,
            tracker,
            events,
            permits,
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Submits a registered job once its dependencies allow it
    ///
    /// Requests the broker cannot act on come back as errors: an unknown job,
    /// a job already in flight or past submission, unmet dependencies. Once
    /// the job reaches the farm client the outcome is always a
    /// [`SubmissionResult`], which has also been applied to the job's state.
    pub async fn submit(&self, job_id: JobId) -> Result<SubmissionResult, SubmitError> {
        let ticket = match self.registry.begin_submission(job_id) {
            Ok(ticket) => ticket,
            Err(SubmitError::DependencyFailed {
                job_id,
                upstream,
                state,
            }) => {
                self.tracker.fail_blocked(job_id, upstream, state);
                return Err(SubmitError::DependencyFailed {
                    job_id,
                    upstream,
                    state,
                });
            }
            Err(e) => return Err(e),
        };

        self.events.status_changed(&[ticket.change]);
        self.events.before_submit(&ticket.job);

        let descriptor = FarmJobDescriptor::new(&ticket.job, &ticket.tasks, &ticket.upstream);
        let result = self.submit_with_retry(&descriptor).await;

        let transition = self.tracker.record_submission(job_id, &result);
        for remote_id in &transition.orphaned {
            self.cancel_orphan(remote_id).await;
        }

        self.events.after_submit(&ticket.job, &result);
        Ok(result)
    }

    /// Sends a descriptor, retrying transient failures
    async fn submit_with_retry(&self, descriptor: &FarmJobDescriptor) -> SubmissionResult {
        let client = match self.session.acquire().await {
            Ok(client) => client,
            Err(e) => {
                error!("Cannot submit '{}': {}", descriptor.name, e);
                return SubmissionResult::failed(ErrorKind::ClientUnavailable, e.to_string(), 0);
            }
        };

        let max_attempts = self.config.max_retries.saturating_add(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.call(client.submit_job(descriptor)).await {
                Ok(remote_id) => {
                    if attempt > 1 {
                        info!(
                            "Job '{}' accepted as {} after {} attempt(s)",
                            descriptor.name, remote_id, attempt
                        );
                    }
                    return SubmissionResult::accepted(remote_id, attempt);
                }
                Err(e) if e.kind().is_retryable() && attempt < max_attempts => {
                    let delay = self.config.backoff_for(attempt);
                    warn!(
                        "Submitting '{}' failed (attempt {}/{}): {}. Retrying in {:?}...",
                        descriptor.name, attempt, max_attempts, e, delay
                    );
                    time::sleep(delay).await;
                }
                Err(e) => {
                    let kind = e.kind();
                    let message = if kind.is_retryable() {
                        format!("gave up after {} attempt(s): {}", attempt, e)
                    } else {
                        e.to_string()
                    };
                    error!("Submitting '{}' failed: {}", descriptor.name, message);
                    return SubmissionResult::failed(kind, message, attempt);
                }
            }
        }
    }

    // =============================================================================
    // Other Farm Calls
    // =============================================================================

    /// Fetches the farm's view of a submitted job
    ///
    /// A job the farm no longer knows comes back as
    /// [`SubmitError::FarmJobMissing`].
    pub async fn query_status(&self, remote_id: &RemoteJobId) -> Result<StatusSnapshot, SubmitError> {
        let client = self.client().await?;
        self.call(client.query_status(remote_id))
            .await
            .map_err(|e| match e {
                ClientError::JobNotFound(missing) => SubmitError::FarmJobMissing(missing),
                other => farm_error(other),
            })
    }

    /// Removes a job from the farm
    pub async fn cancel_remote(&self, remote_id: &RemoteJobId) -> Result<(), SubmitError> {
        let client = self.client().await?;
        self.call(client.cancel_job(remote_id))
            .await
            .map_err(farm_error)?;
        info!("Cancelled farm job {}", remote_id);
        Ok(())
    }

    /// Pool names the farm offers
    pub async fn list_pools(&self) -> Result<Vec<String>, SubmitError> {
        let client = self.client().await?;
        self.call(client.list_pools()).await.map_err(farm_error)
    }

    /// Closes the farm session
    pub async fn shutdown(&self) {
        self.permits.close();
        self.session.shutdown().await;
    }

    async fn cancel_orphan(&self, remote_id: &RemoteJobId) {
        if let Err(e) = self.cancel_remote(remote_id).await {
            warn!("Could not cancel orphaned farm job {}: {}", remote_id, e);
        }
    }

    async fn client(&self) -> Result<Arc<dyn FarmClient>, SubmitError> {
        self.session
            .acquire()
            .await
            .map_err(|e| SubmitError::farm(ErrorKind::ClientUnavailable, e.to_string()))
    }

    /// Runs one farm call under a permit and the attempt timeout
    ///
    /// An elapsed timeout comes back as [`ClientError::Timeout`].
    async fn call<T>(
        &self,
        request: impl Future<Output = Result<T, ClientError>>,
    ) -> Result<T, ClientError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ClientError::Unavailable("broker is shut down".to_string()))?;

        match time::timeout(self.config.attempt_timeout, request).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                debug!("Farm call failed: {}", e);
                Err(e)
            }
            Err(_) => Err(ClientError::Timeout(format!(
                "no answer within {:?}",
                self.config.attempt_timeout
            ))),
        }
    }
}

fn farm_error(e: ClientError) -> SubmitError {
    SubmitError::farm(e.kind(), e.to_string())
}
