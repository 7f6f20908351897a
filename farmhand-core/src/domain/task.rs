//! Task domain types

use serde::{Deserialize, Serialize};

use crate::domain::job::{FrameRange, JobId};

/// Execution status of one task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Dispatched,
    Running,
    Done,
    Error,
    Skipped,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Error | TaskStatus::Skipped)
    }

    /// Whether downstream work may treat this task as finished
    pub fn is_satisfied(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Skipped)
    }
}

/// One frame-chunk of a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Back-reference to the owning job
    pub job_id: JobId,
    /// Position within the job's task list
    pub index: usize,
    pub frame_start: i64,
    pub frame_end: i64,
    pub status: TaskStatus,
}

impl Task {
    pub fn frames(&self) -> FrameRange {
        FrameRange {
            start: self.frame_start,
            end: self.frame_end,
        }
    }
}
