//! Core camera and alarm types returned by the cloud.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Model identifier of cameras fitted with a physical privacy shutter.
pub const SHUTTER_EQUIPPED_MODEL: &str = "SS001";

/// Shutter setting value that allows capture.
pub const SHUTTER_OPEN: &str = "open";

/// Unique identifier (serial/uuid) of a camera.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CameraId(pub String);

impl CameraId {
    /// Create a new camera ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the camera ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CameraId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for CameraId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for CameraId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Arm state of the alarm system the camera belongs to.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlarmState {
    Off,
    Home,
    Away,
}

/// Device-side settings reported by the cloud for a camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraSettings {
    /// Configured capture frame rate
    pub fps: u32,
    /// Bitrate ceiling in kbit/s
    pub bit_rate: u32,
    /// Resolution ceiling, e.g. "1080p", "720p", "480p"
    pub resolution: String,
    /// Shutter setting while the alarm is off
    #[serde(default = "default_shutter")]
    pub shutter_off: String,
    /// Shutter setting while armed home
    #[serde(default = "default_shutter")]
    pub shutter_home: String,
    /// Shutter setting while armed away
    #[serde(default = "default_shutter")]
    pub shutter_away: String,
}

fn default_shutter() -> String {
    SHUTTER_OPEN.to_string()
}

impl CameraSettings {
    /// Shutter setting that applies for the given alarm state
    pub fn shutter_for(&self, state: AlarmState) -> &str {
        match state {
            AlarmState::Off => &self.shutter_off,
            AlarmState::Home => &self.shutter_home,
            AlarmState::Away => &self.shutter_away,
        }
    }

    /// Whether the shutter is configured open for the given alarm state
    pub fn shutter_open_for(&self, state: AlarmState) -> bool {
        self.shutter_for(state) == SHUTTER_OPEN
    }
}

/// Camera description as returned by the cloud.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraDetails {
    /// Camera serial, also used as its media path identifier
    pub id: CameraId,
    /// Friendly name
    pub name: String,
    /// Hardware model, e.g. "SS001" (indoor, shutter) or "SS002" (doorbell)
    pub model: String,
    /// Device settings
    pub settings: CameraSettings,
}

impl CameraDetails {
    /// Whether this model has a physical privacy shutter
    pub fn has_privacy_shutter(&self) -> bool {
        self.model == SHUTTER_EQUIPPED_MODEL
    }
}

/// Entry of the camera list endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraStatus {
    pub id: CameraId,
    pub status: String,
}

impl CameraStatus {
    pub fn is_online(&self) -> bool {
        self.status.eq_ignore_ascii_case("online")
    }
}

/// Transient "motion active" flag shared between the event subscription and
/// the snapshot privacy gate.
///
/// Each activation bumps a generation counter so that only the timer armed by
/// the most recent motion event clears the flag.
#[derive(Debug, Clone, Default)]
pub struct MotionFlag {
    active: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
}

impl MotionFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a motion window is currently open
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Open a motion window and return its generation
    pub fn activate(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.active.store(true, Ordering::Release);
        generation
    }

    /// Close the window opened with `generation`
    ///
    /// Returns `false` (and leaves the flag untouched) when a newer window has
    /// been opened since.
    pub fn clear(&self, generation: u64) -> bool {
        if self.generation.load(Ordering::Acquire) != generation {
            return false;
        }
        self.active.store(false, Ordering::Release);
        true
    }
}
