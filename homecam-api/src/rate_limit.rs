//! Upstream rate-limit state shared by every network-facing operation.

use chrono::{DateTime, Utc};

use crate::error::{ApiError, Result};

/// Snapshot of the cloud client's throttling state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitState {
    /// Whether the client has been told to back off
    pub is_blocked: bool,
    /// Earliest time the next request may be issued
    pub next_attempt: Option<DateTime<Utc>>,
}

impl RateLimitState {
    /// State of a client that is free to issue requests
    pub fn open() -> Self {
        Self::default()
    }

    /// State of a client blocked until `next_attempt`
    pub fn blocked_until(next_attempt: DateTime<Utc>) -> Self {
        Self {
            is_blocked: true,
            next_attempt: Some(next_attempt),
        }
    }

    /// Whether a request issued at `now` must fail fast
    ///
    /// A blocked client with no known retry time stays blocked.
    pub fn is_blocked_at(&self, now: DateTime<Utc>) -> bool {
        self.is_blocked && self.next_attempt.map_or(true, |next| now < next)
    }

    /// Fail fast with [`ApiError::RateLimited`] when blocked right now
    pub fn check(&self) -> Result<()> {
        if self.is_blocked_at(Utc::now()) {
            return Err(ApiError::RateLimited {
                next_attempt: self.next_attempt,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_open_state_passes() {
        assert!(RateLimitState::open().check().is_ok());
    }

    #[test]
    fn test_blocked_until_future_fails() {
        let state = RateLimitState::blocked_until(Utc::now() + Duration::minutes(5));
        let err = state.check().unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[test]
    fn test_block_expires() {
        let state = RateLimitState::blocked_until(Utc::now() - Duration::seconds(1));
        assert!(state.check().is_ok());
    }

    #[test]
    fn test_blocked_without_next_attempt() {
        let state = RateLimitState {
            is_blocked: true,
            next_attempt: None,
        };
        assert!(state.is_blocked_at(Utc::now()));
    }
}
