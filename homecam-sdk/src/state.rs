//! Accessory-visible state fed by the event subscription and the supervisor.

use homecam_event_manager::EventSink;
use homecam_stream::{SessionId, SessionTeardown, StreamError};
use tokio::sync::{broadcast, watch};

/// Capacity of the accessory event channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Notification pushed to the host's accessory layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessoryEvent {
    /// The motion sensor characteristic changed
    MotionChanged(bool),
    /// Single press of the doorbell's programmable switch
    DoorbellPressed,
    /// A running stream died and its viewer session must be closed
    StreamForceStopped { session_id: SessionId, reason: String },
}

/// Shared accessory state.
#[derive(Debug)]
pub struct AccessoryState {
    motion_tx: watch::Sender<bool>,
    events_tx: broadcast::Sender<AccessoryEvent>,
}

impl AccessoryState {
    pub fn new() -> Self {
        let (motion_tx, _) = watch::channel(false);
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            motion_tx,
            events_tx,
        }
    }

    /// Current value of the motion characteristic
    pub fn motion_active(&self) -> bool {
        *self.motion_tx.borrow()
    }

    pub fn watch_motion(&self) -> watch::Receiver<bool> {
        self.motion_tx.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AccessoryEvent> {
        self.events_tx.subscribe()
    }

    fn publish(&self, event: AccessoryEvent) {
        // No receivers is fine: the host may not listen for every event
        let _ = self.events_tx.send(event);
    }
}

impl Default for AccessoryState {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for AccessoryState {
    fn motion_detected(&self, active: bool) {
        self.motion_tx.send_replace(active);
        self.publish(AccessoryEvent::MotionChanged(active));
    }

    fn doorbell_pressed(&self) {
        self.publish(AccessoryEvent::DoorbellPressed);
    }
}

impl SessionTeardown for AccessoryState {
    fn force_stop(&self, session_id: &SessionId, reason: StreamError) {
        tracing::warn!(session_id = %session_id, "Closing viewer session: {}", reason);
        self.publish(AccessoryEvent::StreamForceStopped {
            session_id: session_id.clone(),
            reason: reason.to_string(),
        });
    }
}
