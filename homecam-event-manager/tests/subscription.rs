//! Subscription lifecycle tests against a scripted cloud client
//!
//! All tests run on paused time, so backoff delays are observed exactly as
//! the virtual clock advances.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use homecam_api::{
    AlarmState, ApiError, CameraId, CameraStatus, CloudClient, CloudEvent, EventKind, EventPayload,
    EventSender, MotionFlag, RateLimitState,
};
use homecam_event_manager::{
    ConnectionState, EventDispatcher, EventManagerConfig, EventSink, EventSubscriptionManager,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

// ============================================================================
// Test doubles
// ============================================================================

/// Cloud client answering subscribe calls from a script; once the script is
/// exhausted every subscribe succeeds
struct ScriptedCloud {
    script: Mutex<VecDeque<Result<(), ApiError>>>,
    rate_limit: Mutex<RateLimitState>,
    calls: mpsc::UnboundedSender<(Instant, EventSender)>,
}

#[async_trait]
impl CloudClient for ScriptedCloud {
    fn access_token(&self) -> String {
        "token".to_string()
    }

    fn rate_limit(&self) -> RateLimitState {
        *self.rate_limit.lock()
    }

    async fn camera_list(&self) -> homecam_api::Result<Vec<CameraStatus>> {
        Ok(Vec::new())
    }

    async fn alarm_state(&self) -> homecam_api::Result<AlarmState> {
        Ok(AlarmState::Off)
    }

    async fn subscribe_to_events(&self, sink: EventSender) -> homecam_api::Result<()> {
        let _ = self.calls.send((Instant::now(), sink));
        self.script.lock().pop_front().unwrap_or(Ok(()))
    }
}

/// Sink forwarding every effect to the test
struct ChannelSink {
    tx: mpsc::UnboundedSender<&'static str>,
}

impl EventSink for ChannelSink {
    fn motion_detected(&self, active: bool) {
        let _ = self.tx.send(if active { "motion" } else { "motion-cleared" });
    }

    fn doorbell_pressed(&self) {
        let _ = self.tx.send("doorbell");
    }
}

struct Harness {
    cloud: Arc<ScriptedCloud>,
    calls: mpsc::UnboundedReceiver<(Instant, EventSender)>,
    effects: mpsc::UnboundedReceiver<&'static str>,
    manager: EventSubscriptionManager,
}

fn rate_limited() -> Result<(), ApiError> {
    Err(ApiError::rate_limited())
}

fn start(script: Vec<Result<(), ApiError>>) -> Harness {
    let (calls_tx, calls) = mpsc::unbounded_channel();
    let (effects_tx, effects) = mpsc::unbounded_channel();

    let cloud = Arc::new(ScriptedCloud {
        script: Mutex::new(script.into()),
        rate_limit: Mutex::new(RateLimitState::open()),
        calls: calls_tx,
    });

    let config = EventManagerConfig::default();
    let dispatcher = EventDispatcher::new(
        CameraId::new("cam-1"),
        Arc::new(ChannelSink { tx: effects_tx }),
        MotionFlag::new(),
        config.motion_window,
    );
    let manager = EventSubscriptionManager::start(cloud.clone(), dispatcher, config).unwrap();

    Harness {
        cloud,
        calls,
        effects,
        manager,
    }
}

impl Harness {
    async fn next_call(&mut self) -> (Instant, EventSender) {
        self.calls.recv().await.expect("cloud dropped")
    }

    async fn wait_for_state(&self, expected: ConnectionState) {
        let mut state = self.manager.subscribe_state();
        state
            .wait_for(|state| *state == expected)
            .await
            .expect("manager stopped");
    }
}

fn device_event(kind: EventKind, serial: &str) -> CloudEvent {
    CloudEvent::new(
        kind,
        Some(EventPayload {
            sensor_serial: Some(serial.to_string()),
            internal: None,
        }),
    )
}

fn assert_gap(earlier: Instant, later: Instant, secs: u64) {
    let gap = later - earlier;
    let expected = Duration::from_secs(secs);
    assert!(
        gap >= expected && gap < expected + Duration::from_millis(100),
        "expected a gap of {expected:?}, got {gap:?}"
    );
}

// ============================================================================
// Backoff
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_rate_limited_backoff_doubles() {
    let mut harness = start(vec![rate_limited(), rate_limited(), rate_limited()]);

    let mut times = Vec::new();
    for _ in 0..4 {
        times.push(harness.next_call().await.0);
    }

    assert_gap(times[0], times[1], 5);
    assert_gap(times[1], times[2], 10);
    assert_gap(times[2], times[3], 20);
    assert_eq!(harness.manager.failure_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_connected_resets_backoff() {
    let mut harness = start(vec![
        rate_limited(),
        rate_limited(),
        Ok(()),
        rate_limited(),
        Ok(()),
    ]);

    harness.next_call().await;
    harness.next_call().await;
    let (connected_at, sink) = harness.next_call().await;
    assert_eq!(harness.manager.failure_count(), 2);

    sink.send(CloudEvent::lifecycle(EventKind::Connected)).unwrap();
    harness.wait_for_state(ConnectionState::Connected).await;
    assert_eq!(harness.manager.failure_count(), 0);

    sink.send(CloudEvent::lifecycle(EventKind::ConnectionLost)).unwrap();
    let (limited_at, _) = harness.next_call().await;
    assert_gap(connected_at, limited_at, 5);

    // The counter started over, so the first retry waits the base interval
    let (retried_at, _) = harness.next_call().await;
    assert_gap(limited_at, retried_at, 5);
    assert_eq!(harness.manager.failure_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_other_errors_do_not_grow_backoff() {
    let mut harness = start(vec![
        Err(ApiError::NetworkError("socket closed".to_string())),
        rate_limited(),
    ]);

    let (first, _) = harness.next_call().await;
    let (second, _) = harness.next_call().await;
    let (third, _) = harness.next_call().await;

    assert_gap(first, second, 5);
    assert_gap(second, third, 5);
    assert_eq!(harness.manager.failure_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_client_side_rate_limit_counts_as_failure() {
    let mut harness = start(Vec::new());
    *harness.cloud.rate_limit.lock() = RateLimitState {
        is_blocked: true,
        next_attempt: None,
    };

    tokio::time::sleep(Duration::from_secs(16)).await;
    assert!(harness.calls.try_recv().is_err());
    assert_eq!(harness.manager.failure_count(), 3);

    *harness.cloud.rate_limit.lock() = RateLimitState::open();
    harness.next_call().await;
}

// ============================================================================
// Connection lifecycle
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_disconnect_is_passive() {
    let mut harness = start(Vec::new());
    let (_, sink) = harness.next_call().await;

    sink.send(CloudEvent::lifecycle(EventKind::Connected)).unwrap();
    harness.wait_for_state(ConnectionState::Connected).await;

    sink.send(CloudEvent::lifecycle(EventKind::Disconnect)).unwrap();
    harness.wait_for_state(ConnectionState::Disconnected).await;

    let resubscribed = tokio::time::timeout(Duration::from_secs(60), harness.calls.recv()).await;
    assert!(resubscribed.is_err(), "DISCONNECT must not trigger a resubscribe");
}

#[tokio::test(start_paused = true)]
async fn test_feed_closed_after_disconnect_stays_down() {
    let mut harness = start(Vec::new());
    let (_, sink) = harness.next_call().await;

    sink.send(CloudEvent::lifecycle(EventKind::Connected)).unwrap();
    sink.send(CloudEvent::lifecycle(EventKind::Disconnect)).unwrap();
    drop(sink);

    let resubscribed = tokio::time::timeout(Duration::from_secs(60), harness.calls.recv()).await;
    assert!(resubscribed.is_err(), "a closed feed after DISCONNECT must stay down");
    assert_eq!(harness.manager.state(), ConnectionState::Disconnected);

    harness.manager.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_feed_closed_unexpectedly_reconnects() {
    let mut harness = start(Vec::new());
    let (closed_at, sink) = harness.next_call().await;

    sink.send(CloudEvent::lifecycle(EventKind::Connected)).unwrap();
    drop(sink);

    let (resubscribed_at, _sink) = harness.next_call().await;
    assert_gap(closed_at, resubscribed_at, 5);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_task() {
    let mut harness = start(Vec::new());
    harness.next_call().await;

    let state = harness.manager.subscribe_state();
    harness.manager.shutdown().await.unwrap();
    assert_eq!(*state.borrow(), ConnectionState::Disconnected);
}

// ============================================================================
// Device events
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_device_events_reach_sink() {
    let mut harness = start(Vec::new());
    let (_, sink) = harness.next_call().await;

    sink.send(device_event(EventKind::Doorbell, "someone-else")).unwrap();
    sink.send(device_event(EventKind::Doorbell, "cam-1")).unwrap();
    sink.send(device_event(EventKind::CameraMotion, "cam-1")).unwrap();

    assert_eq!(harness.effects.recv().await, Some("doorbell"));
    assert_eq!(harness.effects.recv().await, Some("motion"));
    assert_eq!(harness.effects.recv().await, Some("motion-cleared"));
}

#[tokio::test(start_paused = true)]
async fn test_relayed_wire_event_reaches_sink() {
    let mut harness = start(Vec::new());
    let (_, sink) = harness.next_call().await;

    let relayed = CloudEvent::from_wire(
        "DOORBELL",
        Some(serde_json::json!({
            "sensorSerial": "base-station",
            "internal": { "mainCamera": "cam-1" }
        })),
    )
    .unwrap();
    sink.send(relayed).unwrap();
    sink.send(CloudEvent::from_wire("ALARM_CANCEL", None).unwrap()).unwrap();
    sink.send(device_event(EventKind::Doorbell, "cam-1")).unwrap();

    assert_eq!(harness.effects.recv().await, Some("doorbell"));
    assert_eq!(harness.effects.recv().await, Some("doorbell"));
    assert_eq!(harness.manager.state(), ConnectionState::Connecting);
}
