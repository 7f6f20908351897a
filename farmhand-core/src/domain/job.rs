//! Job domain types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::dependency::JobDependency;
use crate::domain::environment::Environment;
use crate::domain::options::SubmitOptions;
use crate::error::PlanError;

/// Local identifier of a job, assigned when the job is built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier the farm assigned to an accepted job
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteJobId(pub String);

impl RemoteJobId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RemoteJobId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Inclusive frame interval `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRange {
    pub start: i64,
    pub end: i64,
}

impl FrameRange {
    /// Creates a validated range
    pub fn new(start: i64, end: i64) -> Result<Self, PlanError> {
        if start > end {
            return Err(PlanError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// A range holding exactly one frame
    pub fn single(frame: i64) -> Self {
        Self {
            start: frame,
            end: frame,
        }
    }

    /// Number of frames in the range, zero when malformed
    ///
    /// The full `i64` range holds one frame more than `u64` can count and
    /// reports `u64::MAX`.
    pub fn len(&self) -> u64 {
        if self.start > self.end {
            0
        } else {
            self.end.abs_diff(self.start).saturating_add(1)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, frame: i64) -> bool {
        self.start <= frame && frame <= self.end
    }
}

impl fmt::Display for FrameRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl FromStr for FrameRange {
    type Err = String;

    /// Parses `"start-end"` or a single frame such as `"42"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty frame range".to_string());
        }

        // A leading '-' belongs to a negative start frame
        let split_at = s
            .char_indices()
            .skip(1)
            .find(|(_, c)| *c == '-')
            .map(|(idx, _)| idx);

        let parse = |part: &str| {
            part.trim()
                .parse::<i64>()
                .map_err(|e| format!("invalid frame '{}': {}", part.trim(), e))
        };

        match split_at {
            Some(idx) => {
                let start = parse(&s[..idx])?;
                let end = parse(&s[idx + 1..])?;
                FrameRange::new(start, end).map_err(|e| e.to_string())
            }
            None => Ok(FrameRange::single(parse(s)?)),
        }
    }
}

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    Draft,
    Validated,
    Submitting,
    Submitted,
    Done,
    PartiallyFailed,
    Failed,
    Cancelled,
}

impl JobState {
    /// Terminal states never change again without an explicit reset
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Done | JobState::PartiallyFailed | JobState::Failed | JobState::Cancelled
        )
    }

    /// Whether the lifecycle allows moving from `self` to `next`
    ///
    /// Resets out of a failed state are not covered here; they go through
    /// [`JobState::can_reset`].
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;

        match (self, next) {
            (Draft, Validated) => true,
            (Draft | Validated, Submitting) => true,
            (Submitting, Submitted) => true,
            (Submitted, Done | PartiallyFailed) => true,
            // Failed: retry exhaustion, farm failure or a failed upstream
            (Draft | Validated | Submitting | Submitted, Failed) => true,
            (Draft | Validated | Submitting | Submitted, Cancelled) => true,
            _ => false,
        }
    }

    /// States a caller may explicitly reset back to `Validated`
    pub fn can_reset(self) -> bool {
        matches!(
            self,
            JobState::Failed | JobState::Cancelled | JobState::PartiallyFailed
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One logical unit of farm work
///
/// Built by [`crate::builder`]; after that only the broker's registry changes
/// `state` and `remote_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Assigned by the farm on successful submission
    pub remote_id: Option<RemoteJobId>,
    pub name: String,
    pub pool: String,
    pub priority: u8,
    pub frame_range: FrameRange,
    pub chunk_size: u32,
    /// Path of the exported scene the farm renders
    pub scene_path: String,
    pub environment: Environment,
    pub dependencies: Vec<JobDependency>,
    pub options: SubmitOptions,
    pub state: JobState,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
