//! Routing of device events to the accessory.

use std::sync::Arc;
use std::time::Duration;

use homecam_api::{CameraId, CloudEvent, EventKind, MotionFlag};

/// Receiver of the accessory-visible effects of device events.
pub trait EventSink: Send + Sync {
    /// Motion became active, or the motion window expired
    fn motion_detected(&self, active: bool);

    /// The doorbell button was pressed
    fn doorbell_pressed(&self);
}

/// Applies device events for one camera.
#[derive(Clone)]
pub struct EventDispatcher {
    camera_id: CameraId,
    sink: Arc<dyn EventSink>,
    motion: MotionFlag,
    motion_window: Duration,
}

impl EventDispatcher {
    pub fn new(
        camera_id: CameraId,
        sink: Arc<dyn EventSink>,
        motion: MotionFlag,
        motion_window: Duration,
    ) -> Self {
        Self {
            camera_id,
            sink,
            motion,
            motion_window,
        }
    }

    pub fn camera_id(&self) -> &CameraId {
        &self.camera_id
    }

    /// Apply one device event; events for other cameras are ignored
    ///
    /// Must be called from within a tokio runtime: motion arms a timer task
    /// that closes the window.
    pub fn dispatch(&self, event: &CloudEvent) {
        if !event.concerns(&self.camera_id) {
            return;
        }

        match &event.kind {
            EventKind::CameraMotion => self.open_motion_window(),
            EventKind::Doorbell => {
                tracing::info!("Doorbell pressed on {}", self.camera_id);
                self.sink.doorbell_pressed();
            }
            other => {
                tracing::trace!("Ignoring {:?} event for {}", other, self.camera_id);
            }
        }
    }

    fn open_motion_window(&self) {
        let generation = self.motion.activate();
        tracing::debug!("Motion detected on {} (window {})", self.camera_id, generation);
        self.sink.motion_detected(true);

        let motion = self.motion.clone();
        let sink = Arc::clone(&self.sink);
        let window = self.motion_window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            // Only the most recent window may clear the flag
            if motion.clear(generation) {
                sink.motion_detected(false);
            }
        });
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("camera_id", &self.camera_id)
            .field("motion_active", &self.motion.is_active())
            .field("motion_window", &self.motion_window)
            .finish()
    }
}
