//! # homecam-stream
//!
//! Live streaming and snapshots for a cloud camera.
//!
//! A viewer session goes through three steps:
//!
//! 1. [`SessionNegotiator::prepare`] allocates SSRCs and records the viewer's
//!    SRTP destination as a pending session.
//! 2. [`StreamSupervisor::start`] resolves the media host, composes the
//!    transcoder arguments with [`ArgumentBuilder`] and spawns the transcoder,
//!    resolving once its first stderr line arrives.
//! 3. [`StreamSupervisor::stop`] kills the transcoder, or discards the session
//!    if it never started.
//!
//! [`SnapshotFetcher`] serves still images from the same media host, gated by
//! the camera's privacy shutter.

pub mod args;
pub mod config;
mod error;
pub mod overrides;
pub mod resolver;
pub mod session;
pub mod snapshot;
pub mod supervisor;
mod types;

#[cfg(test)]
mod testing;

pub use args::{ArgumentBuilder, EffectiveParams, PipelineArgs, PipelineInput};
pub use config::StreamConfig;
pub use error::*;
pub use overrides::{ArgumentOverrides, OverrideMap, OverrideValue};
pub use resolver::{AddressResolver, HostLookup, SystemLookup};
pub use session::{PendingSession, SessionNegotiator, SessionPhase, SessionStore};
pub use snapshot::SnapshotFetcher;
pub use supervisor::{LogTeardown, SessionTeardown, StartOutcome, StreamSupervisor};
pub use types::*;
