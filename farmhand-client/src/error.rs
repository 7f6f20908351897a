//! Error types for the farm client

use farmhand_core::domain::job::RemoteJobId;
use farmhand_core::domain::submission::ErrorKind;
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to the farm
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The farm server could not be reached
    #[error("Farm server unreachable: {0}")]
    Unreachable(String),

    /// The farm did not answer in time
    #[error("Farm request timed out: {0}")]
    Timeout(String),

    /// The farm explicitly refused the request
    #[error("Farm rejected the request: {0}")]
    Rejected(String),

    /// The farm holds no job with this id
    #[error("Farm job {0} not found")]
    JobNotFound(RemoteJobId),

    /// The farm client integration is missing or misconfigured
    #[error("Farm client unavailable: {0}")]
    Unavailable(String),

    /// API returned an error status code
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

impl ClientError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    /// Check if this error is a client error (4xx status)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::ApiError { status, .. } if *status >= 400 && *status < 500)
    }

    /// Check if this error is a server error (5xx status)
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::ApiError { status, .. } if *status >= 500)
    }

    /// Classifies the error for retry decisions
    ///
    /// An unparseable reply counts as rejected: the farm may have accepted the
    /// job, so retrying could submit it twice.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RequestFailed(err) if err.is_builder() => ErrorKind::ClientUnavailable,
            Self::RequestFailed(err) if err.is_decode() => ErrorKind::Rejected,
            Self::RequestFailed(err) => match err.status() {
                Some(status) if status.is_client_error() => ErrorKind::Rejected,
                _ => ErrorKind::Transient,
            },
            Self::Unreachable(_) | Self::Timeout(_) => ErrorKind::Transient,
            Self::Rejected(_) | Self::JobNotFound(_) | Self::ParseError(_) => ErrorKind::Rejected,
            Self::Unavailable(_) => ErrorKind::ClientUnavailable,
            Self::ApiError { .. } if self.is_client_error() => ErrorKind::Rejected,
            Self::ApiError { .. } => ErrorKind::Transient,
        }
    }
}
