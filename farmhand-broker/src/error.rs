//! Broker error types
//!
//! Farm outcomes are not errors here: a submission that the farm refused or
//! that ran out of retries comes back as a failed
//! [`SubmissionResult`](farmhand_core::domain::submission::SubmissionResult).
//! These errors describe requests the broker could not act on at all.

use farmhand_core::domain::job::{JobId, JobState, RemoteJobId};
use farmhand_core::domain::submission::ErrorKind;
use farmhand_core::error::{GraphError, PlanError, ValidationError};
use thiserror::Error;

/// Why a submission request was not sent to the farm
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// Another submission of the same job is in flight
    #[error("Job {0} is already being submitted")]
    AlreadySubmitting(JobId),

    #[error("Job {job_id} cannot be submitted while {state}")]
    NotSubmittable { job_id: JobId, state: JobState },

    #[error("Job {0} is not registered")]
    UnknownJob(JobId),

    /// Upstream jobs have not progressed far enough yet
    #[error("Job {job_id} is waiting on {} upstream job(s)", waiting.len())]
    DependenciesPending { job_id: JobId, waiting: Vec<JobId> },

    /// An upstream ended in a state the job can never proceed from
    #[error("Job {job_id} cannot run: upstream {upstream} is {state}")]
    DependencyFailed {
        job_id: JobId,
        upstream: JobId,
        state: JobState,
    },

    #[error(
        "Job {job_id}: frame offset {offset} is out of range for upstream {upstream} with {upstream_tasks} task(s)"
    )]
    InvalidDependencyOffset {
        job_id: JobId,
        upstream: JobId,
        offset: i64,
        upstream_tasks: usize,
    },

    /// A farm call other than submission failed
    #[error("{kind}: {message}")]
    Farm { kind: ErrorKind, message: String },

    /// The farm no longer holds a job it accepted earlier
    #[error("Farm job {0} is no longer on the farm")]
    FarmJobMissing(RemoteJobId),

    /// The task driving the submission stopped before reporting back
    #[error("Submission of job {0} was interrupted")]
    Interrupted(JobId),
}

impl SubmitError {
    pub fn farm(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Farm {
            kind,
            message: message.into(),
        }
    }
}

/// Why submission parameters could not be turned into registered jobs
#[derive(Debug, Error)]
pub enum RegisterError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}
