//! Frame Range Planner
//!
//! Splits a job's frame range into contiguous chunks, one task per chunk.

use crate::domain::job::{FrameRange, JobId};
use crate::domain::task::{Task, TaskStatus};
use crate::error::PlanError;

/// Most tasks a single job may be split into
pub const MAX_TASKS: u64 = 100_000;

/// Number of tasks a range produces for a chunk size
pub fn task_count(range: FrameRange, chunk_size: u32) -> Result<usize, PlanError> {
    validate(range, chunk_size)?;
    let chunks = range.len().div_ceil(u64::from(chunk_size));
    if chunks > MAX_TASKS {
        return Err(PlanError::TooManyTasks {
            tasks: chunks,
            max: MAX_TASKS,
        });
    }
    usize::try_from(chunks).map_err(|_| PlanError::TooManyTasks {
        tasks: chunks,
        max: MAX_TASKS,
    })
}

/// Plans the tasks of `job_id` covering `range` in chunks of `chunk_size` frames
///
/// Tasks come out in ascending frame order. Every task spans exactly
/// `chunk_size` frames except possibly the last.
pub fn plan(job_id: JobId, range: FrameRange, chunk_size: u32) -> Result<Vec<Task>, PlanError> {
    let count = task_count(range, chunk_size)?;
    let chunk = i64::from(chunk_size);

    let mut tasks = Vec::with_capacity(count);
    let mut start = range.start;
    for index in 0..count {
        // saturating: the last chunk of a range ending at i64::MAX
        let end = start.saturating_add(chunk - 1).min(range.end);
        tasks.push(Task {
            job_id,
            index,
            frame_start: start,
            frame_end: end,
            status: TaskStatus::Pending,
        });
        start = end.saturating_add(1);
    }

    Ok(tasks)
}

fn validate(range: FrameRange, chunk_size: u32) -> Result<(), PlanError> {
    if range.start > range.end {
        return Err(PlanError::InvalidRange {
            start: range.start,
            end: range.end,
        });
    }
    if chunk_size < 1 {
        return Err(PlanError::ChunkSize(i64::from(chunk_size)));
    }
    Ok(())
}
