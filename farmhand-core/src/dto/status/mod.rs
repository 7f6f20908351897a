//! Farm status DTOs

use serde::{Deserialize, Serialize};

use crate::domain::job::RemoteJobId;
use crate::domain::task::TaskStatus;

/// Job-level status as the farm reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FarmJobStatus {
    Queued,
    Running,
    Offline,
    Done,
    /// The farm considers the job itself failed
    Error,
}

/// Progress of one task, by task index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskProgress {
    pub index: usize,
    pub status: TaskStatus,
}

/// What the farm knows about a job at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub job_status: FarmJobStatus,
    pub tasks: Vec<TaskProgress>,
}

/// A status snapshot addressed to a job, ordered by `sequence`
///
/// Updates with a sequence at or below the last applied one are stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub remote_id: RemoteJobId,
    pub sequence: u64,
    pub snapshot: StatusSnapshot,
    pub observed_at: chrono::DateTime<chrono::Utc>,
}

impl StatusUpdate {
    pub fn new(remote_id: RemoteJobId, sequence: u64, snapshot: StatusSnapshot) -> Self {
        Self {
            remote_id,
            sequence,
            snapshot,
            observed_at: chrono::Utc::now(),
        }
    }
}
