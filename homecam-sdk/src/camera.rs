//! CameraAccessory - the accessory-facing surface of one camera

use std::sync::Arc;

use bytes::Bytes;
use homecam_api::{CameraDetails, CloudClient, MotionFlag};
use homecam_event_manager::{
    ConnectionState, EventDispatcher, EventManagerConfig, EventSubscriptionManager,
};
use homecam_stream::{
    AddressResolver, AudioCodec, H264Level, H264Profile, MediaOptions, PrepareRequest,
    PrepareResponse, SessionNegotiator, SessionStore, SnapshotFetcher, StartOutcome, StreamConfig,
    StreamRequest, StreamSupervisor,
};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};

use crate::error::SdkError;
use crate::state::{AccessoryEvent, AccessoryState};

/// SRTP crypto suite used for every stream
pub const SRTP_SUITE: &str = "AES_CM_128_HMAC_SHA1_80";

/// Result of a stream control request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamAck {
    Started(StartOutcome),
    Reconfigured,
    Stopped,
}

/// Event of the doorbell's programmable switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchEvent {
    SinglePress,
}

/// Stream capabilities advertised to viewers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamingOptions {
    /// `(width, height, fps)` triples under the device ceiling
    pub resolutions: Vec<(u32, u32, u32)>,
    pub profiles: Vec<H264Profile>,
    pub levels: Vec<H264Level>,
    pub srtp_suite: &'static str,
    pub audio_codecs: Vec<AudioCodec>,
}

/// One camera exposed as an accessory
///
/// Must be created inside a tokio runtime: construction starts the camera's
/// event subscription.
///
/// # Example
///
/// ```rust,ignore
/// use homecam_sdk::{CameraAccessory, CameraOptions};
///
/// let options = CameraOptions::from_json(r#"{ "videoOptions": { "-g": 60 } }"#)?;
/// let camera = CameraAccessory::new(
///     details,
///     client,
///     options.stream_config(homecam_sdk::config::detect_sandbox()),
///     Default::default(),
/// )?;
///
/// let image = camera.handle_snapshot_request(640, 360).await?;
/// ```
pub struct CameraAccessory {
    details: CameraDetails,
    client: Arc<dyn CloudClient>,
    capabilities: MediaOptions,
    state: Arc<AccessoryState>,
    negotiator: SessionNegotiator,
    supervisor: StreamSupervisor,
    snapshots: SnapshotFetcher,
    events: Mutex<Option<EventSubscriptionManager>>,
    connection: watch::Receiver<ConnectionState>,
}

impl CameraAccessory {
    pub fn new(
        details: CameraDetails,
        client: Arc<dyn CloudClient>,
        stream_config: StreamConfig,
        event_config: EventManagerConfig,
    ) -> Result<Self, SdkError> {
        stream_config.validate()?;

        let config = Arc::new(stream_config);
        let capabilities = MediaOptions::from_details(&details);
        let state = Arc::new(AccessoryState::new());
        let motion = MotionFlag::new();
        let sessions = Arc::new(SessionStore::new());
        let resolver = Arc::new(AddressResolver::new());

        let supervisor = StreamSupervisor::new(
            details.id.clone(),
            capabilities.clone(),
            Arc::clone(&client),
            Arc::clone(&config),
            Arc::clone(&sessions),
            Arc::clone(&resolver),
        )
        .with_teardown(state.clone());

        let snapshots = SnapshotFetcher::new(
            details.clone(),
            Arc::clone(&client),
            resolver,
            config,
            motion.clone(),
        )?;

        let dispatcher = EventDispatcher::new(
            details.id.clone(),
            state.clone(),
            motion,
            event_config.motion_window,
        );
        let events = EventSubscriptionManager::start(Arc::clone(&client), dispatcher, event_config)?;
        let connection = events.subscribe_state();

        tracing::info!("Camera accessory ready: {} ({})", details.name, details.id);

        Ok(Self {
            details,
            client,
            capabilities,
            state,
            negotiator: SessionNegotiator::new(sessions),
            supervisor,
            snapshots,
            events: Mutex::new(Some(events)),
            connection,
        })
    }

    pub fn details(&self) -> &CameraDetails {
        &self.details
    }

    /// Subscribe to accessory notifications
    pub fn subscribe(&self) -> broadcast::Receiver<AccessoryEvent> {
        self.state.subscribe()
    }

    /// Current event feed connection state
    pub fn connection_state(&self) -> ConnectionState {
        *self.connection.borrow()
    }

    /// Negotiate a new viewer session
    pub async fn prepare_stream(&self, request: PrepareRequest) -> Result<PrepareResponse, SdkError> {
        Ok(self.negotiator.prepare(request).await)
    }

    /// Start, reconfigure or stop a viewer session
    pub async fn start_or_stop_stream(&self, request: StreamRequest) -> Result<StreamAck, SdkError> {
        match request {
            StreamRequest::Start {
                session_id,
                request,
            } => {
                let outcome = self.supervisor.start(&session_id, &request).await?;
                Ok(StreamAck::Started(outcome))
            }
            StreamRequest::Reconfigure { session_id, video } => {
                tracing::debug!(
                    session_id = %session_id,
                    "Reconfigure to {}x{}@{} acknowledged without change",
                    video.width,
                    video.height,
                    video.fps
                );
                Ok(StreamAck::Reconfigured)
            }
            StreamRequest::Stop { session_id } => {
                self.supervisor.stop(&session_id);
                Ok(StreamAck::Stopped)
            }
        }
    }

    /// Fetch a still image
    pub async fn handle_snapshot_request(&self, width: u32, height: u32) -> Result<Bytes, SdkError> {
        Ok(self.snapshots.fetch(width, height).await?)
    }

    /// Current value of the motion sensor
    pub async fn get_motion_state(&self) -> Result<bool, SdkError> {
        Ok(self.state.motion_active())
    }

    /// Read side of the doorbell switch
    ///
    /// Presses reach the host only as [`AccessoryEvent::DoorbellPressed`]
    /// through [`subscribe`](Self::subscribe). A switch event is momentary, so
    /// a read never replays one and always reports `None`.
    pub async fn get_doorbell_state(&self) -> Result<Option<SwitchEvent>, SdkError> {
        Ok(None)
    }

    pub async fn identify(&self) -> Result<(), SdkError> {
        tracing::info!("Identify requested for {} ({})", self.details.name, self.details.id);
        Ok(())
    }

    /// Stream capabilities to advertise for this camera
    pub fn streaming_options(&self) -> StreamingOptions {
        StreamingOptions {
            resolutions: self.capabilities.supported_resolutions(),
            profiles: self.capabilities.profiles.clone(),
            levels: self.capabilities.levels.clone(),
            srtp_suite: SRTP_SUITE,
            audio_codecs: vec![AudioCodec::AacEld, AudioCodec::Opus],
        }
    }

    /// Whether the cloud reports this camera online
    pub async fn is_reachable(&self) -> Result<bool, SdkError> {
        self.client.rate_limit().check()?;

        let cameras = self.client.camera_list().await?;
        let camera = cameras
            .iter()
            .find(|camera| camera.id == self.details.id)
            .ok_or_else(|| SdkError::CameraNotFound(self.details.id.to_string()))?;

        Ok(camera.is_online())
    }

    /// Stop the event subscription and every running stream
    pub async fn shutdown(&self) -> Result<(), SdkError> {
        self.supervisor.shutdown();

        let events = self.events.lock().take();
        if let Some(events) = events {
            events.shutdown().await?;
        }

        tracing::info!("Camera accessory {} shut down", self.details.id);
        Ok(())
    }
}

impl std::fmt::Debug for CameraAccessory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraAccessory")
            .field("camera", &self.details.id)
            .field("model", &self.details.model)
            .field("connection", &self.connection_state())
            .finish()
    }
}
