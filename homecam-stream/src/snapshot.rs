//! Still-image snapshots from the media server.

use std::sync::Arc;

use bytes::Bytes;
use homecam_api::{CameraDetails, CloudClient, MotionFlag};
use url::Url;

use crate::args::url_host;
use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::resolver::AddressResolver;

/// Fetches JPEG snapshots for one camera, honoring the privacy shutter.
pub struct SnapshotFetcher {
    camera: CameraDetails,
    client: Arc<dyn CloudClient>,
    resolver: Arc<AddressResolver>,
    config: Arc<StreamConfig>,
    motion: MotionFlag,
    http: reqwest::Client,
}

impl SnapshotFetcher {
    pub fn new(
        camera: CameraDetails,
        client: Arc<dyn CloudClient>,
        resolver: Arc<AddressResolver>,
        config: Arc<StreamConfig>,
        motion: MotionFlag,
    ) -> Result<Self> {
        // The media server is addressed by IP, so its certificate never matches
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(config.snapshot_timeout)
            .build()
            .map_err(|e| StreamError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            camera,
            client,
            resolver,
            config,
            motion,
            http,
        })
    }

    /// Fetch a snapshot scaled to `width`
    ///
    /// Fails fast when rate limited and refuses with
    /// [`StreamError::PrivacyBlocked`] when the shutter is closed for the
    /// current alarm state; neither case touches the network.
    pub async fn fetch(&self, width: u32, height: u32) -> Result<Bytes> {
        self.client.rate_limit().check()?;
        self.check_privacy().await?;

        let address = self.resolver.resolve(&self.config.media_host).await?;
        let url = self.snapshot_url(address, width)?;

        tracing::debug!("Fetching {}x{} snapshot for {}", width, height, self.camera.id);

        let response = self
            .http
            .get(url)
            .bearer_auth(self.client.access_token())
            .send()
            .await?
            .error_for_status()?;

        let image = response.bytes().await?;
        tracing::debug!("Snapshot for {} is {} bytes", self.camera.id, image.len());
        Ok(image)
    }

    async fn check_privacy(&self) -> Result<()> {
        // Motion implies the shutter is open
        if !self.camera.has_privacy_shutter() || self.motion.is_active() {
            return Ok(());
        }

        let alarm = self.client.alarm_state().await?;
        if self.camera.settings.shutter_open_for(alarm) {
            Ok(())
        } else {
            tracing::debug!(
                "Privacy shutter for {} is {} while alarm is {:?}",
                self.camera.id,
                self.camera.settings.shutter_for(alarm),
                alarm
            );
            Err(StreamError::PrivacyBlocked(alarm))
        }
    }

    fn snapshot_url(&self, address: std::net::IpAddr, width: u32) -> Result<Url> {
        let base = format!("{}://{}", self.config.media_scheme, url_host(address));
        let mut url = Url::parse(&base)
            .map_err(|e| StreamError::Configuration(format!("Invalid media URL {base}: {e}")))?;

        if url.set_port(self.config.media_port).is_err() {
            return Err(StreamError::Configuration(format!(
                "Cannot set port on media URL {base}"
            )));
        }

        url.set_path(&format!("/v1/{}/mjpg", self.camera.id));
        url.query_pairs_mut()
            .append_pair("x", &width.to_string())
            .append_pair("fr", "1");
        Ok(url)
    }
}

impl std::fmt::Debug for SnapshotFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotFetcher")
            .field("camera", &self.camera.id)
            .field("media_host", &self.config.media_host)
            .finish()
    }
}
