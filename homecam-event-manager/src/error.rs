use homecam_api::ApiError;
use thiserror::Error;

/// Errors that can occur in the event subscription manager
#[derive(Error, Debug)]
pub enum EventManagerError {
    /// The cloud client refused or failed the subscription
    #[error("Event subscription failed: {0}")]
    Subscription(#[from] ApiError),

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The background task did not stop cleanly
    #[error("Shutdown error: {0}")]
    Shutdown(String),
}

/// Result type for event manager operations
pub type Result<T> = std::result::Result<T, EventManagerError>;
