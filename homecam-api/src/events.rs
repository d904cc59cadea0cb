//! Real-time events delivered by the cloud event feed.

use serde::{Deserialize, Serialize};

use crate::types::CameraId;

/// Kind of an event received from the real-time feed
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The feed connection is established
    Connected,
    /// The feed was closed deliberately by the transport
    Disconnect,
    /// The feed connection dropped unexpectedly
    ConnectionLost,
    /// A camera detected motion
    CameraMotion,
    /// A doorbell button was pressed
    Doorbell,
    /// Any event type this crate does not act on
    Other(String),
}

impl EventKind {
    /// Parse the wire name used by the event feed
    pub fn from_wire(name: &str) -> Self {
        match name {
            "CONNECTED" => Self::Connected,
            "DISCONNECT" => Self::Disconnect,
            "CONNECTION_LOST" => Self::ConnectionLost,
            "CAMERA_MOTION" => Self::CameraMotion,
            "DOORBELL" => Self::Doorbell,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether this is a connection lifecycle event rather than a device event
    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Self::Connected | Self::Disconnect | Self::ConnectionLost)
    }
}

/// Nested payload carried by events relayed through a base station
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalPayload {
    #[serde(default)]
    pub main_camera: Option<String>,
}

/// Payload of a device event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    /// Serial of the sensor that raised the event
    #[serde(default)]
    pub sensor_serial: Option<String>,
    #[serde(default)]
    pub internal: Option<InternalPayload>,
}

impl EventPayload {
    /// Whether this payload originates from (or is attributed to) `camera`
    pub fn concerns(&self, camera: &CameraId) -> bool {
        if self.sensor_serial.as_deref() == Some(camera.as_str()) {
            return true;
        }
        self.internal
            .as_ref()
            .and_then(|internal| internal.main_camera.as_deref())
            .is_some_and(|main| main == camera.as_str())
    }
}

/// Event delivered to subscribers of the real-time feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudEvent {
    pub kind: EventKind,
    pub payload: Option<EventPayload>,
}

impl CloudEvent {
    pub fn new(kind: EventKind, payload: Option<EventPayload>) -> Self {
        Self { kind, payload }
    }

    /// Lifecycle event without payload
    pub fn lifecycle(kind: EventKind) -> Self {
        Self::new(kind, None)
    }

    /// Build an event from its wire name and JSON payload
    pub fn from_wire(name: &str, payload: Option<serde_json::Value>) -> crate::Result<Self> {
        let payload = payload
            .map(serde_json::from_value::<EventPayload>)
            .transpose()
            .map_err(|e| crate::ApiError::ParseError(format!("Invalid event payload: {e}")))?;
        Ok(Self::new(EventKind::from_wire(name), payload))
    }

    /// Whether this event concerns `camera`
    pub fn concerns(&self, camera: &CameraId) -> bool {
        self.payload
            .as_ref()
            .is_some_and(|payload| payload.concerns(camera))
    }
}
