//! Error types for the homecam-stream crate.

use homecam_api::{AlarmState, ApiError};

use crate::types::SessionId;

/// Errors raised by stream negotiation, supervision and snapshots.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The cloud client is currently throttled
    #[error("Request blocked: rate limited by upstream")]
    RateLimited,

    /// The media host could not be resolved and no address was cached
    #[error("Failed to resolve media host {host}: {message}")]
    ResolutionFailure {
        /// The hostname that was looked up
        host: String,
        /// Lookup failure detail
        message: String,
    },

    /// The privacy shutter is configured closed for the current alarm state
    #[error("Privacy shutter closed while alarm is {0:?}")]
    PrivacyBlocked(AlarmState),

    /// The transcoder binary could not be started
    #[error("Failed to spawn transcoder: {0}")]
    ProcessSpawn(String),

    /// The transcoder exited abnormally before producing output
    #[error("Transcoder exited with code {code} before stream start")]
    ProcessExit {
        /// Exit code reported by the process
        code: i32,
    },

    /// The transcoder exited abnormally while streaming
    #[error("Transcoder for session {session_id} exited with code {code} while streaming")]
    ProcessRuntime {
        /// Session that was torn down
        session_id: SessionId,
        /// Exit code reported by the process
        code: i32,
    },

    /// The termination signal could not be delivered
    #[error("Failed to terminate transcoder for session {session_id}: {message}")]
    Termination {
        session_id: SessionId,
        message: String,
    },

    /// Snapshot transport or decode failure
    #[error("Network error{}: {message}", status_suffix(.status))]
    Network {
        /// HTTP status code, when one was received
        status: Option<u16>,
        message: String,
    },

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Cloud client failure other than throttling
    #[error("Cloud API error: {0}")]
    Api(ApiError),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl From<ApiError> for StreamError {
    fn from(error: ApiError) -> Self {
        match error {
            ApiError::RateLimited { .. } => StreamError::RateLimited,
            other => StreamError::Api(other),
        }
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(error: reqwest::Error) -> Self {
        StreamError::Network {
            status: error.status().map(|s| s.as_u16()),
            message: error.to_string(),
        }
    }
}

/// Convenience type alias for Results using StreamError.
pub type Result<T> = std::result::Result<T, StreamError>;
