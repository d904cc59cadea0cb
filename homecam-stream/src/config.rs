//! Configuration types for the homecam-stream crate
//!
//! This module defines the configuration that controls how transcoder
//! pipelines are composed and where media is fetched from.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::StreamError;
use crate::overrides::ArgumentOverrides;

/// Default media server hostname
pub const DEFAULT_MEDIA_HOST: &str = "media.homecam.io";

/// Configuration for stream negotiation and transcoder supervision
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Hostname of the media server serving live feeds and snapshots
    /// Default: "media.homecam.io"
    pub media_host: String,

    /// URL scheme used to reach the media server
    /// Default: "https"
    pub media_scheme: String,

    /// Explicit media server port, scheme default when `None`
    /// Default: None
    pub media_port: Option<u16>,

    /// User-configured transcoder binary
    /// Default: None
    pub ffmpeg_path: Option<PathBuf>,

    /// Transcoder binary used when no custom path is configured
    /// Default: "ffmpeg"
    pub default_binary: PathBuf,

    /// Running inside a constrained container with the bundled binary
    /// Default: false
    pub sandboxed: bool,

    /// Width ceiling applied when sandboxed with the default binary
    /// Default: 1280
    pub sandbox_max_width: u32,

    /// Enable hardware accelerated decode/encode
    /// Default: false
    pub hardware_acceleration: bool,

    /// User overrides merged into the argument groups
    pub overrides: ArgumentOverrides,

    /// Audio bitrate in kbit/s used unless the viewer asks for less
    /// Default: 32
    pub default_audio_bit_rate: u32,

    /// Audio sample rate in kHz used unless the viewer asks for less
    /// Default: 24
    pub default_audio_sample_rate: u32,

    /// Video RTP packet size used unless the viewer's MTU is smaller
    /// Default: 1316
    pub default_packet_size: u32,

    /// Audio RTP packet size
    /// Default: 188
    pub audio_packet_size: u32,

    /// Timeout for a snapshot request
    /// Default: 10 seconds
    pub snapshot_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            media_host: DEFAULT_MEDIA_HOST.to_string(),
            media_scheme: "https".to_string(),
            media_port: None,
            ffmpeg_path: None,
            default_binary: PathBuf::from("ffmpeg"),
            sandboxed: false,
            sandbox_max_width: 1280,
            hardware_acceleration: false,
            overrides: ArgumentOverrides::default(),
            default_audio_bit_rate: 32,
            default_audio_sample_rate: 24,
            default_packet_size: 1316,
            audio_packet_size: 188,
            snapshot_timeout: Duration::from_secs(10),
        }
    }
}

impl StreamConfig {
    /// Create a new StreamConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Binary that will be spawned for a stream
    pub fn binary(&self) -> &Path {
        self.ffmpeg_path.as_deref().unwrap_or(&self.default_binary)
    }

    /// Whether the user configured their own transcoder binary
    pub fn uses_custom_binary(&self) -> bool {
        self.ffmpeg_path.is_some()
    }

    /// Whether the sandbox width ceiling applies
    pub fn clamps_width(&self) -> bool {
        self.sandboxed && !self.uses_custom_binary()
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), StreamError> {
        if self.media_host.trim().is_empty() {
            return Err(StreamError::Configuration(
                "Media host must not be empty".to_string(),
            ));
        }

        if !matches!(self.media_scheme.as_str(), "http" | "https") {
            return Err(StreamError::Configuration(format!(
                "Unsupported media scheme: {}",
                self.media_scheme
            )));
        }

        if self.sandbox_max_width == 0 {
            return Err(StreamError::Configuration(
                "Sandbox width ceiling must be greater than 0".to_string(),
            ));
        }

        if self.default_packet_size == 0 || self.audio_packet_size == 0 {
            return Err(StreamError::Configuration(
                "Packet sizes must be greater than 0".to_string(),
            ));
        }

        if self.snapshot_timeout == Duration::ZERO {
            return Err(StreamError::Configuration(
                "Snapshot timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_media_server(
        mut self,
        scheme: impl Into<String>,
        host: impl Into<String>,
        port: Option<u16>,
    ) -> Self {
        self.media_scheme = scheme.into();
        self.media_host = host.into();
        self.media_port = port;
        self
    }

    pub fn with_ffmpeg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg_path = Some(path.into());
        self
    }

    pub fn with_sandboxed(mut self, sandboxed: bool) -> Self {
        self.sandboxed = sandboxed;
        self
    }

    pub fn with_hardware_acceleration(mut self, enabled: bool) -> Self {
        self.hardware_acceleration = enabled;
        self
    }

    pub fn with_overrides(mut self, overrides: ArgumentOverrides) -> Self {
        self.overrides = overrides;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StreamConfig::default();
        assert_eq!(config.binary(), Path::new("ffmpeg"));
        assert!(!config.uses_custom_binary());
        assert!(!config.clamps_width());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sandbox_clamp_only_with_default_binary() {
        let config = StreamConfig::new().with_sandboxed(true);
        assert!(config.clamps_width());

        let config = config.with_ffmpeg_path("/opt/ffmpeg/bin/ffmpeg");
        assert!(!config.clamps_width());
        assert_eq!(config.binary(), Path::new("/opt/ffmpeg/bin/ffmpeg"));
    }

    #[test]
    fn test_config_validation() {
        let invalid = StreamConfig::new().with_media_server("ftp", "media", None);
        assert!(invalid.validate().is_err());

        let invalid = StreamConfig {
            media_host: " ".to_string(),
            ..Default::default()
        };
        assert!(invalid.validate().is_err());

        let invalid = StreamConfig {
            snapshot_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(invalid.validate().is_err());
    }
}
