//! In-crate fakes shared by unit tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use homecam_api::{
    AlarmState, ApiError, CameraDetails, CameraId, CameraSettings, CameraStatus, CloudClient,
    EventSender, RateLimitState,
};
use parking_lot::Mutex;

/// Cloud client with scripted answers and call counters.
#[derive(Debug, Clone)]
pub struct FakeCloud {
    pub rate_limit: Arc<Mutex<RateLimitState>>,
    pub alarm: Arc<Mutex<Result<AlarmState, String>>>,
    pub alarm_queries: Arc<AtomicU32>,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self {
            rate_limit: Arc::new(Mutex::new(RateLimitState::open())),
            alarm: Arc::new(Mutex::new(Ok(AlarmState::Off))),
            alarm_queries: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn blocked() -> Self {
        let cloud = Self::new();
        *cloud.rate_limit.lock() =
            RateLimitState::blocked_until(chrono::Utc::now() + chrono::Duration::minutes(10));
        cloud
    }

    pub fn with_alarm(self, state: AlarmState) -> Self {
        *self.alarm.lock() = Ok(state);
        self
    }

    pub fn alarm_queries(&self) -> u32 {
        self.alarm_queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CloudClient for FakeCloud {
    fn access_token(&self) -> String {
        "test-token".to_string()
    }

    fn rate_limit(&self) -> RateLimitState {
        *self.rate_limit.lock()
    }

    async fn camera_list(&self) -> homecam_api::Result<Vec<CameraStatus>> {
        Ok(Vec::new())
    }

    async fn alarm_state(&self) -> homecam_api::Result<AlarmState> {
        self.alarm_queries.fetch_add(1, Ordering::SeqCst);
        self.alarm.lock().clone().map_err(ApiError::NetworkError)
    }

    async fn subscribe_to_events(&self, _sink: EventSender) -> homecam_api::Result<()> {
        Ok(())
    }
}

pub fn camera(model: &str, shutter_home: &str) -> CameraDetails {
    CameraDetails {
        id: CameraId::new("cam-1"),
        name: "Front Door".to_string(),
        model: model.to_string(),
        settings: CameraSettings {
            fps: 30,
            bit_rate: 1000,
            resolution: "1080p".to_string(),
            shutter_off: "open".to_string(),
            shutter_home: shutter_home.to_string(),
            shutter_away: "closed".to_string(),
        },
    }
}
