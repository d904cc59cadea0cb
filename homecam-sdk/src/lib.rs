//! # homecam-sdk
//!
//! Streaming, snapshots and real-time events for cloud-connected security
//! cameras, exposed through one [`CameraAccessory`] per camera.
//!
//! The host application supplies an authenticated
//! [`CloudClient`](homecam_api::CloudClient) and the camera's details; the SDK
//! takes care of:
//!
//! - negotiating SRTP sessions with viewers and supervising the `ffmpeg`
//!   process that relays the live feed to them
//! - serving snapshots, refusing them while the privacy shutter is closed
//! - keeping the real-time event feed connected through disconnects and
//!   rate limiting, and turning motion and doorbell events into
//!   [`AccessoryEvent`]s
//!
//! ```rust,ignore
//! use homecam_sdk::{AccessoryEvent, CameraAccessory, CameraOptions};
//!
//! homecam_sdk::logging::init_logging_from_env()?;
//!
//! let options = CameraOptions::from_json(&config_json)?;
//! let camera = CameraAccessory::new(
//!     details,
//!     client,
//!     options.stream_config(homecam_sdk::config::detect_sandbox()),
//!     Default::default(),
//! )?;
//!
//! let mut events = camera.subscribe();
//! while let Ok(event) = events.recv().await {
//!     match event {
//!         AccessoryEvent::DoorbellPressed => ring(),
//!         AccessoryEvent::MotionChanged(active) => set_motion(active),
//!         AccessoryEvent::StreamForceStopped { session_id, .. } => close(session_id),
//!     }
//! }
//! ```

mod camera;
pub mod config;
mod error;
pub mod logging;
mod state;

pub use camera::{CameraAccessory, StreamAck, StreamingOptions, SwitchEvent, SRTP_SUITE};
pub use config::CameraOptions;
pub use error::SdkError;
pub use state::{AccessoryEvent, AccessoryState};

// Re-export the types hosts need to drive a camera
pub use homecam_api::{
    AlarmState, ApiError, CameraDetails, CameraId, CameraSettings, CameraStatus, CloudClient,
    CloudEvent, EventKind, EventPayload, EventSender, RateLimitState,
};
pub use homecam_event_manager::{ConnectionState, EventManagerConfig};
pub use homecam_stream::{
    AudioCodec, AudioRequest, MediaRequest, PrepareRequest, PrepareResponse, SessionId,
    StartOutcome, StartRequest, StreamConfig, StreamError, StreamRequest, VideoRequest,
};
