use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors surfaced by the cloud client boundary
///
/// Implementations of [`CloudClient`](crate::CloudClient) map their transport
/// failures onto these variants so the streaming and event layers can make
/// retry decisions without knowing how the cloud is reached.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Upstream throttling
    ///
    /// Returned when the cloud refuses a request because the account is
    /// currently rate limited. `next_attempt` is the earliest time a new
    /// request is expected to succeed, when the cloud reported one.
    #[error("Rate limited by upstream{}", retry_hint(.next_attempt))]
    RateLimited { next_attempt: Option<DateTime<Utc>> },

    /// Network communication error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Response parsing error
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Authentication was rejected or the access token is unavailable
    #[error("Authentication error: {0}")]
    AuthError(String),

    /// The event subscription could not be opened
    #[error("Subscription error: {0}")]
    SubscriptionError(String),
}

impl ApiError {
    /// Create a rate limited error without a known retry time
    pub fn rate_limited() -> Self {
        Self::RateLimited { next_attempt: None }
    }

    /// Whether this error is the distinguished upstream throttling error
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

fn retry_hint(next_attempt: &Option<DateTime<Utc>>) -> String {
    next_attempt
        .map(|t| format!(" until {}", t.to_rfc3339()))
        .unwrap_or_default()
}

/// Type alias for results that can return an ApiError
pub type Result<T> = std::result::Result<T, ApiError>;
