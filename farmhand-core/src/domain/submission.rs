//! Submission outcome types

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::job::{JobId, RemoteJobId};

/// Why a submission or a job failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Network or availability problem, retried with backoff
    Transient,
    /// The farm explicitly refused the job
    Rejected,
    /// The farm client integration is missing or misconfigured
    ClientUnavailable,
    /// An upstream job failed or was cancelled
    DependencyFailed,
    /// The farm reported the job or its tasks as failed
    FarmFailure,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transient)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ErrorKind::Transient => "farm unreachable",
            ErrorKind::Rejected => "rejected by farm",
            ErrorKind::ClientUnavailable => "farm client unavailable",
            ErrorKind::DependencyFailed => "dependency failed",
            ErrorKind::FarmFailure => "failed on farm",
        };
        f.write_str(text)
    }
}

/// Outcome of one broker submission
///
/// Created once by the broker and consumed by the state tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionResult {
    pub success: bool,
    pub remote_job_id: Option<RemoteJobId>,
    pub error_kind: Option<ErrorKind>,
    pub message: String,
    /// Farm client calls made, retries included
    pub attempts: u32,
}

impl SubmissionResult {
    pub fn accepted(remote_job_id: RemoteJobId, attempts: u32) -> Self {
        Self {
            message: format!("Accepted as {}", remote_job_id),
            success: true,
            remote_job_id: Some(remote_job_id),
            error_kind: None,
            attempts,
        }
    }

    pub fn failed(kind: ErrorKind, message: impl Into<String>, attempts: u32) -> Self {
        Self {
            success: false,
            remote_job_id: None,
            error_kind: Some(kind),
            message: message.into(),
            attempts,
        }
    }
}

/// Last error retained on a failed job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureCause {
    pub kind: ErrorKind,
    pub message: String,
    /// The upstream job whose failure cascaded here
    pub upstream: Option<JobId>,
}

impl FailureCause {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            upstream: None,
        }
    }

    pub fn dependency(upstream: JobId, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::DependencyFailed,
            message: message.into(),
            upstream: Some(upstream),
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
