//! # homecam-event-manager
//!
//! Keeps a camera's real-time event subscription alive and turns device events
//! into accessory updates.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use homecam_api::{CameraId, MotionFlag};
//! use homecam_event_manager::{EventDispatcher, EventManagerConfig, EventSubscriptionManager};
//!
//! let config = EventManagerConfig::default();
//! let dispatcher = EventDispatcher::new(
//!     CameraId::new("a1b2c3"),
//!     sink,
//!     MotionFlag::new(),
//!     config.motion_window,
//! );
//! let manager = EventSubscriptionManager::start(client, dispatcher, config)?;
//!
//! // ...
//! manager.shutdown().await?;
//! ```
//!
//! ## Reconnect behavior
//!
//! - `CONNECTED` resets the rate-limit failure counter
//! - `DISCONNECT` is passive; the feed is expected to reconnect on its own
//! - `CONNECTION_LOST` or a closed feed re-subscribes after the base interval
//! - A rate-limited subscribe retries after `base * 2^failures`, forever
//! - Any other subscribe failure retries after the base interval

pub mod backoff;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod manager;

pub use backoff::BackoffState;
pub use config::EventManagerConfig;
pub use dispatch::{EventDispatcher, EventSink};
pub use error::{EventManagerError, Result};
pub use manager::{ConnectionState, EventSubscriptionManager};
