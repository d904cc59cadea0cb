//! Per-camera options as they appear in the host's configuration file.
//!
//! ```json
//! {
//!   "ffmpegPath": "/usr/local/bin/ffmpeg",
//!   "enableHwaccelRpi": false,
//!   "sourceOptions": "-rtbufsize 1M",
//!   "videoOptions": { "-preset": false, "-g": 60 },
//!   "audioOptions": {}
//! }
//! ```

use std::path::{Path, PathBuf};

use homecam_stream::{ArgumentOverrides, StreamConfig};
use serde::Deserialize;

use crate::error::SdkError;

/// User options for one camera
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraOptions {
    /// Custom transcoder binary
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Use the hardware H.264 decoder/encoder
    #[serde(default, rename = "enableHwaccelRpi")]
    pub hardware_acceleration: bool,

    /// Argument overrides for the source, video and audio groups
    #[serde(flatten)]
    pub overrides: ArgumentOverrides,
}

impl CameraOptions {
    /// Parse options from a JSON document
    pub fn from_json(json: &str) -> Result<Self, SdkError> {
        serde_json::from_str(json).map_err(|e| SdkError::InvalidOptions(e.to_string()))
    }

    /// Parse options from a JSON value, as found inside a larger document
    pub fn from_value(value: serde_json::Value) -> Result<Self, SdkError> {
        serde_json::from_value(value).map_err(|e| SdkError::InvalidOptions(e.to_string()))
    }

    /// Stream configuration for these options on a host that is or is not
    /// sandboxed
    pub fn stream_config(&self, sandboxed: bool) -> StreamConfig {
        let mut config = StreamConfig::new()
            .with_sandboxed(sandboxed)
            .with_hardware_acceleration(self.hardware_acceleration)
            .with_overrides(self.overrides.clone());

        if let Some(path) = self.ffmpeg_path.as_ref().filter(|p| !p.as_os_str().is_empty()) {
            config = config.with_ffmpeg_path(path);
        }

        config
    }
}

/// Whether this process runs inside a container
pub fn detect_sandbox() -> bool {
    if Path::new("/.dockerenv").exists() {
        return true;
    }

    match std::fs::read_to_string("/proc/1/cgroup") {
        Ok(cgroup) => cgroup_indicates_container(&cgroup),
        Err(_) => false,
    }
}

fn cgroup_indicates_container(cgroup: &str) -> bool {
    const MARKERS: [&str; 4] = ["docker", "kubepods", "containerd", "lxc"];
    cgroup
        .lines()
        .any(|line| MARKERS.iter().any(|marker| line.contains(marker)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use homecam_stream::OverrideValue;

    #[test]
    fn test_full_options() {
        let options = CameraOptions::from_json(
            r#"{
                "ffmpegPath": "/opt/ffmpeg",
                "enableHwaccelRpi": true,
                "sourceOptions": "-rtbufsize 1M",
                "videoOptions": { "-preset": false, "-g": 60 }
            }"#,
        )
        .unwrap();

        assert_eq!(options.ffmpeg_path, Some(PathBuf::from("/opt/ffmpeg")));
        assert!(options.hardware_acceleration);
        assert_eq!(
            options.overrides.source.get("-rtbufsize"),
            Some(&OverrideValue::Set("1M".to_string()))
        );
        assert_eq!(options.overrides.video.get("-preset"), Some(&OverrideValue::Remove));
        assert!(options.overrides.audio.is_empty());

        let config = options.stream_config(true);
        assert!(config.uses_custom_binary());
        assert!(!config.clamps_width());
        assert!(config.hardware_acceleration);
    }

    #[test]
    fn test_empty_options() {
        let options = CameraOptions::from_json("{}").unwrap();
        assert_eq!(options, CameraOptions::default());

        let config = options.stream_config(true);
        assert!(config.clamps_width());
    }

    #[test]
    fn test_empty_ffmpeg_path_uses_default_binary() {
        let options = CameraOptions::from_json(r#"{ "ffmpegPath": "" }"#).unwrap();
        assert!(!options.stream_config(false).uses_custom_binary());
    }

    #[test]
    fn test_invalid_options() {
        let err = CameraOptions::from_json(r#"{ "videoOptions": [1, 2] }"#).unwrap_err();
        assert!(matches!(err, SdkError::InvalidOptions(_)));
    }

    #[test]
    fn test_from_value_keeps_override_order() {
        let options = CameraOptions::from_value(serde_json::json!({
            "videoOptions": { "-z": "1", "-a": "2", "-m": "3" }
        }))
        .unwrap();
        let flags: Vec<&str> = options.overrides.video.iter().map(|(flag, _)| flag).collect();
        assert_eq!(flags, vec!["-z", "-a", "-m"]);
    }

    #[test]
    fn test_cgroup_markers() {
        assert!(cgroup_indicates_container("12:pids:/docker/3f2a9c"));
        assert!(cgroup_indicates_container("0::/kubepods/besteffort/pod1"));
        assert!(!cgroup_indicates_container("0::/init.scope"));
    }
}
