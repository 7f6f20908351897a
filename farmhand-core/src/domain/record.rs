//! Persisted job record
//!
//! A job together with its tasks and tracking state. This is the unit the
//! broker's registry stores and the unit written to disk, as JSON.

use serde::{Deserialize, Serialize};

use crate::domain::job::{Job, JobId, JobState, RemoteJobId};
use crate::domain::submission::FailureCause;
use crate::domain::task::{Task, TaskStatus};
use crate::error::RecordError;

/// A job, its tasks and what the broker knows about them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub job: Job,
    pub tasks: Vec<Task>,
    pub last_error: Option<FailureCause>,
    /// Sequence of the last status update applied
    pub last_sequence: Option<u64>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// A state change of one job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub job_id: JobId,
    pub from: JobState,
    pub to: JobState,
}

/// Attempted a transition the lifecycle does not allow
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Job {job_id} cannot move from {from} to {to}")]
pub struct InvalidTransition {
    pub job_id: JobId,
    pub from: JobState,
    pub to: JobState,
}

impl JobRecord {
    pub fn new(job: Job, tasks: Vec<Task>) -> Self {
        Self {
            job,
            tasks,
            last_error: None,
            last_sequence: None,
            updated_at: chrono::Utc::now(),
        }
    }

    pub fn id(&self) -> JobId {
        self.job.id
    }

    pub fn state(&self) -> JobState {
        self.job.state
    }

    pub fn remote_id(&self) -> Option<&RemoteJobId> {
        self.job.remote_id.as_ref()
    }

    /// Moves the job to `to` if the lifecycle allows it
    pub fn transition(&mut self, to: JobState) -> Result<StateChange, InvalidTransition> {
        let from = self.job.state;
        if !from.can_transition_to(to) {
            return Err(InvalidTransition {
                job_id: self.job.id,
                from,
                to,
            });
        }

        self.job.state = to;
        self.updated_at = chrono::Utc::now();
        Ok(StateChange {
            job_id: self.job.id,
            from,
            to,
        })
    }

    /// Moves the job to `Failed`, retaining the cause
    pub fn fail(&mut self, cause: FailureCause) -> Result<StateChange, InvalidTransition> {
        let change = self.transition(JobState::Failed)?;
        self.last_error = Some(cause);
        Ok(change)
    }

    /// Returns a failed or cancelled job to `Validated` for resubmission
    pub fn reset(&mut self) -> Result<StateChange, InvalidTransition> {
        let from = self.job.state;
        if !from.can_reset() {
            return Err(InvalidTransition {
                job_id: self.job.id,
                from,
                to: JobState::Validated,
            });
        }

        self.job.state = JobState::Validated;
        self.job.remote_id = None;
        self.last_error = None;
        self.last_sequence = None;
        for task in &mut self.tasks {
            task.status = TaskStatus::Pending;
        }
        self.updated_at = chrono::Utc::now();

        Ok(StateChange {
            job_id: self.job.id,
            from,
            to: JobState::Validated,
        })
    }

    pub fn to_json(&self) -> Result<String, RecordError> {
        serde_json::to_string_pretty(self).map_err(RecordError::Encode)
    }

    pub fn from_json(json: &str) -> Result<Self, RecordError> {
        serde_json::from_str(json).map_err(RecordError::Decode)
    }
}
