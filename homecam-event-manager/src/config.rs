//! Configuration for the event subscription manager

use std::time::Duration;

use crate::error::{EventManagerError, Result};

/// Timing of the event subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventManagerConfig {
    /// Delay before reconnecting after a lost connection, and the base of the
    /// rate-limit backoff
    /// Default: 5 seconds
    pub reconnect_base: Duration,

    /// How long motion stays active after the last motion event
    /// Default: 5 seconds
    pub motion_window: Duration,

    /// Time to wait for the background task on shutdown
    /// Default: 5 seconds
    pub shutdown_timeout: Duration,
}

impl Default for EventManagerConfig {
    fn default() -> Self {
        Self {
            reconnect_base: Duration::from_secs(5),
            motion_window: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl EventManagerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reconnect_base(mut self, base: Duration) -> Self {
        self.reconnect_base = base;
        self
    }

    pub fn with_motion_window(mut self, window: Duration) -> Self {
        self.motion_window = window;
        self
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<()> {
        if self.reconnect_base.is_zero() {
            return Err(EventManagerError::Configuration(
                "reconnect_base must be greater than 0".to_string(),
            ));
        }

        if self.motion_window.is_zero() {
            return Err(EventManagerError::Configuration(
                "motion_window must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
