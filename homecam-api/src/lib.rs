//! # homecam-api
//!
//! Boundary types for the camera cloud service consumed by `homecam-sdk`.
//!
//! This crate does not talk to the network itself. It defines the
//! [`CloudClient`] trait implemented by the host application's authenticated
//! client, together with the data the streaming and event layers need:
//! camera details and settings, alarm state, real-time events and the
//! upstream rate-limit state.
//!
//! ```rust,ignore
//! use homecam_api::{CloudClient, RateLimitState};
//!
//! async fn alarm(client: &dyn CloudClient) -> homecam_api::Result<()> {
//!     client.rate_limit().check()?;
//!     let state = client.alarm_state().await?;
//!     println!("alarm is {:?}", state);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod events;
pub mod rate_limit;
pub mod types;

pub use client::{CloudClient, EventSender};
pub use error::{ApiError, Result};
pub use events::{CloudEvent, EventKind, EventPayload, InternalPayload};
pub use rate_limit::RateLimitState;
pub use types::{
    AlarmState, CameraDetails, CameraId, CameraSettings, CameraStatus, MotionFlag,
    SHUTTER_EQUIPPED_MODEL, SHUTTER_OPEN,
};
