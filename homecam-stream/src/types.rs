//! Core types for the homecam-stream crate.

use std::net::IpAddr;

use homecam_api::CameraDetails;

/// Opaque identifier of a viewer session, chosen by the viewer's client.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct SessionId(pub String);

impl SessionId {
    /// Create a new session ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the session ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Media type of an SRTP stream.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum MediaKind {
    Video,
    Audio,
}

/// Per-media parameters sent by the viewer in a prepare request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRequest {
    /// Port the viewer listens on
    pub port: u16,
    /// SRTP master key
    pub srtp_key: Vec<u8>,
    /// SRTP master salt
    pub srtp_salt: Vec<u8>,
}

/// Prepare request for a new viewer session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareRequest {
    pub session_id: SessionId,
    /// Viewer address the media is sent to
    pub target_address: IpAddr,
    pub video: Option<MediaRequest>,
    pub audio: Option<MediaRequest>,
}

/// Address family of the local bind address.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum AddressFamily {
    V4,
    V6,
}

impl AddressFamily {
    pub fn of(address: &IpAddr) -> Self {
        match address {
            IpAddr::V4(_) => Self::V4,
            IpAddr::V6(_) => Self::V6,
        }
    }
}

/// Per-media parameters returned to the viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaResponse {
    pub port: u16,
    /// Synchronization source identifier, top byte always zero
    pub ssrc: u32,
    pub srtp_key: Vec<u8>,
    pub srtp_salt: Vec<u8>,
}

/// Response to a prepare request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrepareResponse {
    /// Local address the media will be sent from
    pub address: IpAddr,
    pub address_family: AddressFamily,
    pub video: Option<MediaResponse>,
    pub audio: Option<MediaResponse>,
}

/// Audio codec requested by the viewer.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Default)]
pub enum AudioCodec {
    #[default]
    AacEld,
    Opus,
}

/// Video parameters of a start request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRequest {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Bitrate ceiling in kbit/s
    pub max_bit_rate: u32,
    pub payload_type: u8,
    /// Maximum transport unit requested by the viewer
    pub mtu: Option<u32>,
}

impl Default for VideoRequest {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            max_bit_rate: 299,
            payload_type: 99,
            mtu: None,
        }
    }
}

/// Audio parameters of a start request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioRequest {
    pub codec: AudioCodec,
    /// Sample rate in kHz
    pub sample_rate: u32,
    /// Bitrate ceiling in kbit/s
    pub max_bit_rate: u32,
    pub payload_type: u8,
}

impl Default for AudioRequest {
    fn default() -> Self {
        Self {
            codec: AudioCodec::AacEld,
            sample_rate: 16,
            max_bit_rate: 24,
            payload_type: 110,
        }
    }
}

/// Start request for a prepared session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartRequest {
    pub video: VideoRequest,
    pub audio: AudioRequest,
}

/// Stream control request from the viewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamRequest {
    Start {
        session_id: SessionId,
        request: StartRequest,
    },
    Reconfigure {
        session_id: SessionId,
        video: VideoRequest,
    },
    Stop {
        session_id: SessionId,
    },
}

impl StreamRequest {
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::Start { session_id, .. }
            | Self::Reconfigure { session_id, .. }
            | Self::Stop { session_id } => session_id,
        }
    }
}

/// Width/height pair.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Ceiling for a device resolution label such as "1080p"
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "480p" => Self::new(640, 480),
            "720p" => Self::new(1280, 720),
            _ => Self::new(1920, 1080),
        }
    }

    fn fits_within(&self, ceiling: &Resolution) -> bool {
        self.width <= ceiling.width && self.height <= ceiling.height
    }
}

/// H.264 profiles advertised to viewers.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum H264Profile {
    Baseline,
    Main,
    High,
}

/// H.264 levels advertised to viewers.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum H264Level {
    Level3_1,
    Level3_2,
    Level4_0,
}

/// Resolution/frame-rate combinations a viewer may request.
const ADVERTISED_RESOLUTIONS: [(u32, u32, u32); 11] = [
    (320, 180, 30),
    (320, 240, 15),
    (320, 240, 30),
    (480, 270, 30),
    (480, 360, 30),
    (640, 360, 30),
    (640, 480, 30),
    (1280, 720, 30),
    (1280, 960, 30),
    (1920, 1080, 30),
    (1600, 1200, 30),
];

/// Device capability snapshot used while negotiating a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaOptions {
    pub fps: u32,
    /// Bitrate ceiling in kbit/s
    pub max_bit_rate: u32,
    pub max_resolution: Resolution,
    pub profiles: Vec<H264Profile>,
    pub levels: Vec<H264Level>,
}

impl MediaOptions {
    /// Capabilities of the camera described by `details`
    pub fn from_details(details: &CameraDetails) -> Self {
        Self {
            fps: details.settings.fps,
            max_bit_rate: details.settings.bit_rate,
            max_resolution: Resolution::from_label(&details.settings.resolution),
            profiles: vec![H264Profile::Baseline, H264Profile::Main, H264Profile::High],
            levels: vec![H264Level::Level3_1, H264Level::Level3_2, H264Level::Level4_0],
        }
    }

    /// Advertised resolutions that fit under the device ceiling, as
    /// `(width, height, fps)` triples
    pub fn supported_resolutions(&self) -> Vec<(u32, u32, u32)> {
        ADVERTISED_RESOLUTIONS
            .iter()
            .copied()
            .filter(|(w, h, _)| Resolution::new(*w, *h).fits_within(&self.max_resolution))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use homecam_api::{CameraId, CameraSettings};

    fn details(resolution: &str) -> CameraDetails {
        CameraDetails {
            id: CameraId::new("cam"),
            name: "Porch".to_string(),
            model: "SS002".to_string(),
            settings: CameraSettings {
                fps: 20,
                bit_rate: 900,
                resolution: resolution.to_string(),
                shutter_off: "open".to_string(),
                shutter_home: "open".to_string(),
                shutter_away: "open".to_string(),
            },
        }
    }

    #[test]
    fn test_resolution_labels() {
        assert_eq!(Resolution::from_label("720p"), Resolution::new(1280, 720));
        assert_eq!(Resolution::from_label("480P"), Resolution::new(640, 480));
        assert_eq!(Resolution::from_label("unknown"), Resolution::new(1920, 1080));
    }

    #[test]
    fn test_supported_resolutions_respect_ceiling() {
        let options = MediaOptions::from_details(&details("720p"));
        let resolutions = options.supported_resolutions();
        assert!(resolutions.contains(&(1280, 720, 30)));
        assert!(!resolutions.contains(&(1280, 960, 30)));
        assert!(!resolutions.contains(&(1920, 1080, 30)));
        assert_eq!(options.fps, 20);
        assert_eq!(options.max_bit_rate, 900);
    }

    #[test]
    fn test_stream_request_session_id() {
        let request = StreamRequest::Stop {
            session_id: SessionId::new("abc"),
        };
        assert_eq!(request.session_id().as_str(), "abc");
    }
}
