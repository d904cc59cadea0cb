//! Transcoder argument composition.
//!
//! [`ArgumentBuilder::build`] turns a negotiated session, the device
//! capabilities and the viewer's start request into three ordered argument
//! groups: the source (input) group, the video output group and the audio
//! output group. The builder is pure: it never spawns processes and never
//! touches session state.

use std::net::IpAddr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use homecam_api::CameraId;

use crate::config::StreamConfig;
use crate::overrides::{OverrideMap, OverrideValue};
use crate::session::{PendingSession, SrtpTarget};
use crate::types::{AudioCodec, MediaOptions, StartRequest};

const SRTP_SUITE: &str = "AES_CM_128_HMAC_SHA1_80";
const AAC_QUERY: &str = "&audioEncoding=AAC";
const HWACCEL_DECODER: &str = "h264_mmal";
const HWACCEL_ENCODER: &str = "h264_omx";

/// One flag and its optional value.
///
/// Positional arguments such as the SRTP output URL are stored as a flag
/// without value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arg {
    pub flag: String,
    pub value: Option<String>,
}

impl Arg {
    pub fn new(flag: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            flag: flag.into(),
            value: Some(value.into()),
        }
    }

    pub fn bare(flag: impl Into<String>) -> Self {
        Self {
            flag: flag.into(),
            value: None,
        }
    }
}

/// Where flags that are new to a group are placed when merging overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Prepend,
    Append,
}

/// Ordered argument group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgGroup {
    args: Vec<Arg>,
}

impl ArgGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, flag: &str, value: impl Into<String>) -> Self {
        self.args.push(Arg::new(flag, value));
        self
    }

    pub fn with_bare(mut self, flag: impl Into<String>) -> Self {
        self.args.push(Arg::bare(flag));
        self
    }

    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn position(&self, flag: &str) -> Option<usize> {
        self.args.iter().position(|arg| arg.flag == flag)
    }

    pub fn contains(&self, flag: &str) -> bool {
        self.position(flag).is_some()
    }

    /// Value of the first occurrence of `flag`
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .find(|arg| arg.flag == flag)
            .and_then(|arg| arg.value.as_deref())
    }

    /// Replace the value of the first occurrence of `flag`
    pub fn set(&mut self, flag: &str, value: impl Into<String>) -> bool {
        match self.args.iter_mut().find(|arg| arg.flag == flag) {
            Some(arg) => {
                arg.value = Some(value.into());
                true
            }
            None => false,
        }
    }

    /// Remove every occurrence of `flag`
    pub fn remove(&mut self, flag: &str) {
        self.args.retain(|arg| arg.flag != flag);
    }

    /// Insert `arg` right before the first occurrence of `anchor`, or at the
    /// end when the anchor is missing
    pub fn insert_before(&mut self, anchor: &str, arg: Arg) {
        let index = self.position(anchor).unwrap_or(self.args.len());
        self.args.insert(index, arg);
    }

    /// Merge user overrides into this group
    ///
    /// Existing flags take the override value, or are removed when the
    /// override is the removal marker. New flags are inserted one by one at
    /// the front (`Prepend`) or back (`Append`); removal markers for absent
    /// flags are ignored. Merging the same map twice is a no-op the second
    /// time.
    pub fn merge(&mut self, overrides: &OverrideMap, placement: Placement) {
        for (flag, value) in overrides.iter() {
            match value {
                OverrideValue::Remove => self.remove(flag),
                OverrideValue::Set(value) => {
                    if self.set(flag, value.as_str()) {
                        continue;
                    }
                    let arg = Arg::new(flag, value.as_str());
                    match placement {
                        Placement::Prepend => self.args.insert(0, arg),
                        Placement::Append => self.args.push(arg),
                    }
                }
            }
        }
    }

    /// Flatten into a command-line vector; empty values are omitted
    pub fn to_args(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.args.len() * 2);
        for arg in &self.args {
            out.push(arg.flag.trim().to_string());
            if let Some(value) = arg.value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                out.push(value.to_string());
            }
        }
        out
    }
}

/// The three argument groups handed to the transcoder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineArgs {
    pub source: ArgGroup,
    pub video: ArgGroup,
    pub audio: ArgGroup,
}

impl PipelineArgs {
    /// Full argument vector: source, then video, then audio
    pub fn to_command_args(&self) -> Vec<String> {
        let mut args = self.source.to_args();
        args.extend(self.video.to_args());
        args.extend(self.audio.to_args());
        args
    }
}

/// Effective media parameters after applying device and viewer limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveParams {
    pub width: u32,
    pub fps: u32,
    /// kbit/s
    pub video_bit_rate: u32,
    /// kbit/s
    pub audio_bit_rate: u32,
    /// kHz
    pub audio_sample_rate: u32,
    pub packet_size: u32,
}

impl EffectiveParams {
    /// The viewer's value wins only when it is tighter than the device or
    /// configured default
    pub fn derive(capabilities: &MediaOptions, request: &StartRequest, config: &StreamConfig) -> Self {
        let mut width = request.video.width.min(capabilities.max_resolution.width);
        if config.clamps_width() && width > config.sandbox_max_width {
            tracing::debug!(
                "Clamping width {} to {} for sandboxed transcoder",
                width,
                config.sandbox_max_width
            );
            width = config.sandbox_max_width;
        }

        Self {
            width,
            fps: request.video.fps.min(capabilities.fps),
            video_bit_rate: request.video.max_bit_rate.min(capabilities.max_bit_rate),
            audio_bit_rate: request.audio.max_bit_rate.min(config.default_audio_bit_rate),
            audio_sample_rate: request.audio.sample_rate.min(config.default_audio_sample_rate),
            packet_size: request
                .video
                .mtu
                .map_or(config.default_packet_size, |mtu| mtu.min(config.default_packet_size)),
        }
    }
}

/// Everything the builder reads for one start request.
#[derive(Debug, Clone, Copy)]
pub struct PipelineInput<'a> {
    pub camera_id: &'a CameraId,
    pub access_token: &'a str,
    /// Resolved media server address
    pub media_address: IpAddr,
    pub session: &'a PendingSession,
    pub capabilities: &'a MediaOptions,
    pub request: &'a StartRequest,
}

/// Builds transcoder arguments from a [`StreamConfig`].
#[derive(Debug, Clone, Copy)]
pub struct ArgumentBuilder<'a> {
    config: &'a StreamConfig,
}

impl<'a> ArgumentBuilder<'a> {
    pub fn new(config: &'a StreamConfig) -> Self {
        Self { config }
    }

    /// Compose the argument groups for one start request
    pub fn build(&self, input: &PipelineInput<'_>) -> PipelineArgs {
        let params = EffectiveParams::derive(input.capabilities, input.request, self.config);

        let mut args = PipelineArgs {
            source: self.source_group(input, &params),
            video: input
                .session
                .video
                .as_ref()
                .map(|target| self.video_group(input, target, &params))
                .unwrap_or_default(),
            audio: input
                .session
                .audio
                .as_ref()
                .map(|target| self.audio_group(input, target, &params))
                .unwrap_or_default(),
        };

        if input.request.audio.codec != AudioCodec::AacEld {
            Self::use_opus(&mut args);
        }

        if self.config.hardware_acceleration {
            Self::use_hardware_acceleration(&mut args);
        }

        let overrides = &self.config.overrides;
        args.source.merge(&overrides.source, Placement::Prepend);
        args.video.merge(&overrides.video, Placement::Append);
        args.audio.merge(&overrides.audio, Placement::Append);

        args
    }

    fn source_group(&self, input: &PipelineInput<'_>, params: &EffectiveParams) -> ArgGroup {
        let url = format!(
            "{}/v1/{}/flv?x={}{}",
            self.media_base(input.media_address),
            input.camera_id,
            params.width,
            AAC_QUERY
        );

        ArgGroup::new()
            .with_bare("-re")
            .with("-headers", format!("Authorization: Bearer {}", input.access_token))
            .with("-i", url)
    }

    fn video_group(
        &self,
        input: &PipelineInput<'_>,
        target: &SrtpTarget,
        params: &EffectiveParams,
    ) -> ArgGroup {
        ArgGroup::new()
            .with("-map", "0:0")
            .with("-vcodec", "libx264")
            .with("-tune", "zerolatency")
            .with("-preset", "superfast")
            .with("-pix_fmt", "yuv420p")
            .with("-r", params.fps.to_string())
            .with("-vf", format!("scale={}:-2", params.width))
            .with("-b:v", format!("{}k", params.video_bit_rate))
            .with("-bufsize", format!("{}k", 2 * params.video_bit_rate))
            .with("-maxrate", format!("{}k", params.video_bit_rate))
            .with("-payload_type", input.request.video.payload_type.to_string())
            .with("-ssrc", target.ssrc.to_string())
            .with("-f", "rtp")
            .with("-srtp_out_suite", SRTP_SUITE)
            .with("-srtp_out_params", BASE64.encode(&target.keying))
            .with_bare(srtp_url(input.session.target_address, target.port, params.packet_size))
    }

    fn audio_group(
        &self,
        input: &PipelineInput<'_>,
        target: &SrtpTarget,
        params: &EffectiveParams,
    ) -> ArgGroup {
        ArgGroup::new()
            .with("-map", "0:1")
            .with("-acodec", "libfdk_aac")
            .with("-profile:a", "aac_eld")
            .with("-flags", "+global_header")
            .with("-ac", "1")
            .with("-ar", format!("{}k", params.audio_sample_rate))
            .with("-b:a", format!("{}k", params.audio_bit_rate))
            .with("-bufsize", format!("{}k", 2 * params.audio_bit_rate))
            .with("-payload_type", input.request.audio.payload_type.to_string())
            .with("-ssrc", target.ssrc.to_string())
            .with("-f", "rtp")
            .with("-srtp_out_suite", SRTP_SUITE)
            .with("-srtp_out_params", BASE64.encode(&target.keying))
            .with_bare(srtp_url(
                input.session.target_address,
                target.port,
                self.config.audio_packet_size,
            ))
    }

    fn use_opus(args: &mut PipelineArgs) {
        if let Some(url) = args.source.value_of("-i").map(|url| url.replace(AAC_QUERY, "")) {
            args.source.set("-i", url);
        }
        args.audio.set("-acodec", "libopus");
        args.audio.remove("-profile:a");
    }

    fn use_hardware_acceleration(args: &mut PipelineArgs) {
        args.source
            .insert_before("-i", Arg::new("-vcodec", HWACCEL_DECODER));
        args.video.set("-vcodec", HWACCEL_ENCODER);
        args.video.remove("-tune");
        args.video.remove("-preset");
    }

    fn media_base(&self, address: IpAddr) -> String {
        match self.config.media_port {
            Some(port) => format!("{}://{}:{}", self.config.media_scheme, url_host(address), port),
            None => format!("{}://{}", self.config.media_scheme, url_host(address)),
        }
    }
}

/// Host part of a URL for an IP literal
pub(crate) fn url_host(address: IpAddr) -> String {
    match address {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => format!("[{v6}]"),
    }
}

fn srtp_url(address: IpAddr, port: u16, packet_size: u32) -> String {
    format!(
        "srtp://{}:{port}?rtcpport={port}&localrtcpport={port}&pkt_size={packet_size}",
        url_host(address)
    )
}
