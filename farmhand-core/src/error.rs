//! Error types for the core crate

use std::fmt;

use thiserror::Error;

use crate::domain::job::JobId;

/// Errors raised by the frame range planner
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// The range start lies after its end
    #[error("Invalid frame range: start {start} is after end {end}")]
    InvalidRange { start: i64, end: i64 },

    /// Chunk size below one frame
    #[error("Invalid chunk size {0}: must be at least 1")]
    ChunkSize(i64),

    /// The range splits into more tasks than one farm block may hold
    #[error("Range splits into {tasks} tasks, at most {max} allowed")]
    TooManyTasks { tasks: u64, max: u64 },
}

/// Submission parameter fields, in the order the builder checks them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Name,
    Pool,
    Priority,
    FrameRange,
    ChunkSize,
    ScenePath,
    Environment,
    HostMask,
    ExcludeHostMask,
    DependMask,
    GlobalDependMask,
    MaxRunningTasks,
    ConcurrentTasks,
    GpusPerTask,
    Dependencies,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Name => "name",
            Field::Pool => "pool",
            Field::Priority => "priority",
            Field::FrameRange => "frame_range",
            Field::ChunkSize => "chunk_size",
            Field::ScenePath => "scene_path",
            Field::Environment => "environment",
            Field::HostMask => "host_mask",
            Field::ExcludeHostMask => "exclude_host_mask",
            Field::DependMask => "depend_mask",
            Field::GlobalDependMask => "global_depend_mask",
            Field::MaxRunningTasks => "max_running_tasks",
            Field::ConcurrentTasks => "concurrent_tasks",
            Field::GpusPerTask => "gpus_per_task",
            Field::Dependencies => "dependencies",
        };
        f.write_str(name)
    }
}

/// A submission parameter violated a job invariant
///
/// Names the first failing field so callers can point the user at it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {field}: {reason}")]
pub struct ValidationError {
    pub field: Field,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: Field, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

/// Adding an edge would close a cycle in the dependency graph
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Dependency {from} -> {to} would create a cycle")]
pub struct CycleError {
    pub from: JobId,
    pub to: JobId,
}

/// Errors raised by the dependency graph
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("Job {0} is not registered in the dependency graph")]
    UnknownJob(JobId),

    #[error("Job {0} is already registered in the dependency graph")]
    DuplicateJob(JobId),

    #[error(transparent)]
    Cycle(#[from] CycleError),
}

/// Errors raised while encoding or decoding persisted job records
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("Failed to encode job record: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode job record: {0}")]
    Decode(#[source] serde_json::Error),
}
