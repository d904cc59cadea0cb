use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::events::CloudEvent;
use crate::rate_limit::RateLimitState;
use crate::types::{AlarmState, CameraStatus};
use crate::Result;

/// Sender half handed to [`CloudClient::subscribe_to_events`]
pub type EventSender = mpsc::UnboundedSender<CloudEvent>;

/// Boundary to the cloud service that owns cameras, alarm state and the
/// real-time event feed
///
/// Authentication and token refresh live behind this trait; callers only read
/// the current token and throttling state. Every network-facing operation in
/// this workspace calls [`RateLimitState::check`] on [`CloudClient::rate_limit`]
/// before issuing a request.
///
/// # Event delivery
///
/// `subscribe_to_events` resolves once the feed has been opened. From then on
/// the implementation pushes every event, including the `CONNECTED`,
/// `DISCONNECT` and `CONNECTION_LOST` lifecycle events, into `sink` for as
/// long as the feed lives. A refused subscription because of throttling must
/// be reported as [`ApiError::RateLimited`](crate::ApiError::RateLimited).
#[async_trait]
pub trait CloudClient: Send + Sync {
    /// Current bearer token
    fn access_token(&self) -> String;

    /// Current throttling state
    fn rate_limit(&self) -> RateLimitState;

    /// List cameras on the account with their connectivity status
    async fn camera_list(&self) -> Result<Vec<CameraStatus>>;

    /// Current arm state of the alarm system
    async fn alarm_state(&self) -> Result<AlarmState>;

    /// Open the real-time event feed, delivering events into `sink`
    async fn subscribe_to_events(&self, sink: EventSender) -> Result<()>;
}
