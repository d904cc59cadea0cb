//! Persistent event subscription with reconnect and rate-limit backoff.

use std::sync::Arc;
use std::time::Duration;

use homecam_api::{CloudClient, CloudEvent, EventKind};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::backoff::BackoffState;
use crate::config::EventManagerConfig;
use crate::dispatch::EventDispatcher;
use crate::error::{EventManagerError, Result};

/// Connection state of the event feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    ConnectionLost,
}

/// Why the event pump stopped.
enum PumpEnd {
    Shutdown,
    Reconnect,
}

/// Keeps the event subscription of one camera alive.
///
/// The subscription is opened on [`start`](Self::start) and re-opened for as
/// long as the manager lives: after a lost connection it waits the base
/// interval, after a rate-limited attempt it waits `base * 2^failures`. The
/// failure counter is reset whenever the feed reports `CONNECTED`.
pub struct EventSubscriptionManager {
    state_rx: watch::Receiver<ConnectionState>,
    backoff: Arc<Mutex<BackoffState>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    task: Option<JoinHandle<()>>,
    shutdown_timeout: Duration,
}

impl EventSubscriptionManager {
    /// Spawn the subscription task
    pub fn start(
        client: Arc<dyn CloudClient>,
        dispatcher: EventDispatcher,
        config: EventManagerConfig,
    ) -> Result<Self> {
        config.validate()?;

        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let backoff = Arc::new(Mutex::new(BackoffState::new(config.reconnect_base)));

        let worker = SubscriptionWorker {
            client,
            dispatcher,
            base: config.reconnect_base,
            backoff: Arc::clone(&backoff),
            state_tx,
            shutdown_rx,
        };

        tracing::info!("Starting event subscription for {}", worker.dispatcher.camera_id());
        let task = tokio::spawn(worker.run());

        Ok(Self {
            state_rx,
            backoff,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
            shutdown_timeout: config.shutdown_timeout,
        })
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Receiver notified on every connection state change
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Consecutive rate-limited subscribe attempts
    pub fn failure_count(&self) -> u32 {
        self.backoff.lock().failures()
    }

    /// Stop the subscription task, waiting up to the configured timeout
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(()).await;
        }

        let Some(task) = self.task.take() else {
            return Ok(());
        };

        match timeout(self.shutdown_timeout, task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(EventManagerError::Shutdown(format!(
                "Subscription task panicked: {e}"
            ))),
            Err(_) => Err(EventManagerError::Shutdown(format!(
                "Subscription task did not stop within {:?}",
                self.shutdown_timeout
            ))),
        }
    }
}

impl Drop for EventSubscriptionManager {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for EventSubscriptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSubscriptionManager")
            .field("state", &self.state())
            .field("failures", &self.failure_count())
            .finish()
    }
}

async fn subscribe(client: &dyn CloudClient, sink: mpsc::UnboundedSender<CloudEvent>) -> Result<()> {
    client.rate_limit().check()?;
    client.subscribe_to_events(sink).await?;
    Ok(())
}

struct SubscriptionWorker {
    client: Arc<dyn CloudClient>,
    dispatcher: EventDispatcher,
    base: Duration,
    backoff: Arc<Mutex<BackoffState>>,
    state_tx: watch::Sender<ConnectionState>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl SubscriptionWorker {
    async fn run(mut self) {
        loop {
            self.set_state(ConnectionState::Connecting);
            let (event_tx, mut event_rx) = mpsc::unbounded_channel();

            let subscribed = tokio::select! {
                result = subscribe(self.client.as_ref(), event_tx) => result,
                _ = self.shutdown_rx.recv() => break,
            };

            let delay = match subscribed {
                Ok(()) => {
                    tracing::debug!("Event feed opened for {}", self.dispatcher.camera_id());
                    match self.pump(&mut event_rx).await {
                        PumpEnd::Shutdown => break,
                        PumpEnd::Reconnect => self.base,
                    }
                }
                Err(EventManagerError::Subscription(e)) if e.is_rate_limited() => {
                    let delay = self.backoff.lock().record_failure();
                    tracing::warn!(
                        "Event subscription rate limited, retrying in {:?}: {}",
                        delay,
                        e
                    );
                    self.set_state(ConnectionState::Disconnected);
                    delay
                }
                Err(e) => {
                    tracing::warn!("{}, retrying in {:?}", e, self.base);
                    self.set_state(ConnectionState::Disconnected);
                    self.base
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown_rx.recv() => break,
            }
        }

        self.set_state(ConnectionState::Disconnected);
        tracing::info!("Event subscription for {} stopped", self.dispatcher.camera_id());
    }

    async fn pump(&mut self, events: &mut mpsc::UnboundedReceiver<CloudEvent>) -> PumpEnd {
        let mut closed_deliberately = false;
        loop {
            let event = tokio::select! {
                biased;
                _ = self.shutdown_rx.recv() => return PumpEnd::Shutdown,
                event = events.recv() => event,
            };

            let Some(event) = event else {
                if closed_deliberately {
                    // A feed closed after DISCONNECT stays down until shutdown
                    tracing::info!("Event feed closed after disconnect, not reconnecting");
                    self.set_state(ConnectionState::Disconnected);
                    let _ = self.shutdown_rx.recv().await;
                    return PumpEnd::Shutdown;
                }
                tracing::warn!("Event feed closed, reconnecting in {:?}", self.base);
                self.set_state(ConnectionState::Disconnected);
                return PumpEnd::Reconnect;
            };

            match event.kind {
                EventKind::Connected => {
                    closed_deliberately = false;
                    self.backoff.lock().reset();
                    self.set_state(ConnectionState::Connected);
                    tracing::info!("Event feed connected");
                }
                EventKind::Disconnect => {
                    closed_deliberately = true;
                    self.set_state(ConnectionState::Disconnected);
                    tracing::info!("Event feed disconnected");
                }
                EventKind::ConnectionLost => {
                    self.set_state(ConnectionState::ConnectionLost);
                    tracing::warn!("Event feed connection lost, reconnecting in {:?}", self.base);
                    return PumpEnd::Reconnect;
                }
                _ => self.dispatcher.dispatch(&event),
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            tracing::debug!("Event feed state {:?} -> {:?}", current, state);
            *current = state;
            true
        });
    }
}
