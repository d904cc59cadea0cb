//! Session negotiation and the per-session state table.
//!
//! A session identifier always maps to exactly one [`SessionState`], so a
//! session can never be pending and ongoing at the same time.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::rngs::OsRng;
use rand::RngCore;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;

use crate::types::{
    AddressFamily, MediaRequest, MediaResponse, PrepareRequest, PrepareResponse, SessionId,
};

/// SRTP destination negotiated for one media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrtpTarget {
    pub port: u16,
    pub ssrc: u32,
    /// SRTP master key followed by the master salt
    pub keying: Vec<u8>,
}

impl SrtpTarget {
    fn negotiate(request: &MediaRequest, ssrc: u32) -> Self {
        let mut keying = Vec::with_capacity(request.srtp_key.len() + request.srtp_salt.len());
        keying.extend_from_slice(&request.srtp_key);
        keying.extend_from_slice(&request.srtp_salt);
        Self {
            port: request.port,
            ssrc,
            keying,
        }
    }
}

/// Session prepared by a viewer and waiting for its start request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSession {
    pub target_address: IpAddr,
    pub video: Option<SrtpTarget>,
    pub audio: Option<SrtpTarget>,
}

/// Ownership handle to a running transcoder.
///
/// Dropping the handle without calling [`terminate`](Self::terminate) also
/// kills the process: the monitor task treats a closed kill channel as a kill
/// request.
#[derive(Debug)]
pub struct OngoingSession {
    pub(crate) spawn_id: u64,
    pub pid: Option<u32>,
    kill_tx: oneshot::Sender<()>,
}

impl OngoingSession {
    pub(crate) fn new(spawn_id: u64, pid: Option<u32>, kill_tx: oneshot::Sender<()>) -> Self {
        Self {
            spawn_id,
            pid,
            kill_tx,
        }
    }

    /// Ask the monitor task to kill the process
    ///
    /// Returns `false` when the monitor is already gone, i.e. the process has
    /// exited on its own.
    pub(crate) fn terminate(self) -> bool {
        self.kill_tx.send(()).is_ok()
    }
}

/// State of one session identifier.
#[derive(Debug)]
pub enum SessionState {
    /// Prepared, waiting for start
    Pending(PendingSession),
    /// Start in flight, process not registered yet
    Starting { attempt: u64, stop_requested: bool },
    /// Transcoder running
    Streaming(OngoingSession),
}

/// Discriminant of [`SessionState`] for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Pending,
    Starting,
    Streaming,
}

impl SessionState {
    pub fn phase(&self) -> SessionPhase {
        match self {
            Self::Pending(_) => SessionPhase::Pending,
            Self::Starting { .. } => SessionPhase::Starting,
            Self::Streaming(_) => SessionPhase::Streaming,
        }
    }
}

/// What a stop request found for its identifier.
#[derive(Debug)]
pub enum StopAction {
    /// A running process that must be terminated
    Terminate(OngoingSession),
    /// A prepared session that was discarded
    DiscardedPending,
    /// A start is in flight; its process will be killed once registered
    Deferred,
    /// Nothing known about the identifier
    Unknown,
}

/// Why a freshly spawned process could not be registered.
#[derive(Debug)]
pub enum RegisterRejection {
    /// A stop arrived while the start was in flight
    StopRequested(OngoingSession),
    /// A newer prepare replaced the session, or it vanished
    Superseded(OngoingSession),
}

/// Concurrent table of session states keyed by identifier.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<SessionId, SessionState>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a prepared session, returning whatever it replaced
    pub fn insert_pending(&self, id: SessionId, pending: PendingSession) -> Option<SessionState> {
        self.sessions.insert(id, SessionState::Pending(pending))
    }

    /// Consume the pending session for `id` and mark start `attempt` as in
    /// flight
    pub fn begin_start(&self, id: &SessionId, attempt: u64) -> Option<PendingSession> {
        let mut entry = self.sessions.get_mut(id)?;
        if entry.phase() != SessionPhase::Pending {
            return None;
        }
        match std::mem::replace(
            &mut *entry,
            SessionState::Starting {
                attempt,
                stop_requested: false,
            },
        ) {
            SessionState::Pending(pending) => Some(pending),
            _ => None,
        }
    }

    /// Drop start `attempt` if it never registered a process
    ///
    /// A newer start or prepare for the same identifier is left alone.
    pub fn abandon_start(&self, id: &SessionId, attempt: u64) -> bool {
        self.sessions
            .remove_if(id, |_, state| {
                matches!(state, SessionState::Starting { attempt: current, .. } if *current == attempt)
            })
            .is_some()
    }

    /// Promote the in-flight start whose attempt is `ongoing`'s spawn id to
    /// streaming
    pub fn register(&self, id: &SessionId, ongoing: OngoingSession) -> Result<(), RegisterRejection> {
        match self.sessions.entry(id.clone()) {
            Entry::Occupied(mut occupied) => {
                let stop_requested = match occupied.get() {
                    SessionState::Starting {
                        attempt,
                        stop_requested,
                    } if *attempt == ongoing.spawn_id => *stop_requested,
                    _ => return Err(RegisterRejection::Superseded(ongoing)),
                };
                if stop_requested {
                    occupied.remove();
                    return Err(RegisterRejection::StopRequested(ongoing));
                }
                occupied.insert(SessionState::Streaming(ongoing));
                Ok(())
            }
            Entry::Vacant(_) => Err(RegisterRejection::Superseded(ongoing)),
        }
    }

    /// Resolve a stop request against the current state
    pub fn request_stop(&self, id: &SessionId) -> StopAction {
        match self.sessions.entry(id.clone()) {
            Entry::Occupied(mut occupied) => match occupied.get().phase() {
                SessionPhase::Streaming => match occupied.remove() {
                    SessionState::Streaming(ongoing) => StopAction::Terminate(ongoing),
                    _ => StopAction::Unknown,
                },
                SessionPhase::Pending => {
                    occupied.remove();
                    StopAction::DiscardedPending
                }
                SessionPhase::Starting => {
                    if let SessionState::Starting { stop_requested, .. } = occupied.get_mut() {
                        *stop_requested = true;
                    }
                    StopAction::Deferred
                }
            },
            Entry::Vacant(_) => StopAction::Unknown,
        }
    }

    /// Remove the streaming entry of a process that exited on its own
    pub fn remove_finished(&self, id: &SessionId, spawn_id: u64) -> bool {
        self.sessions
            .remove_if(id, |_, state| {
                matches!(state, SessionState::Streaming(ongoing) if ongoing.spawn_id == spawn_id)
            })
            .is_some()
    }

    /// Current phase of `id`, if any
    pub fn phase(&self, id: &SessionId) -> Option<SessionPhase> {
        self.sessions.get(id).map(|state| state.phase())
    }

    /// Pending session of `id`, if it is still waiting for start
    pub fn pending(&self, id: &SessionId) -> Option<PendingSession> {
        self.sessions.get(id).and_then(|state| match &*state {
            SessionState::Pending(pending) => Some(pending.clone()),
            _ => None,
        })
    }

    /// Remove every running process handle
    pub fn drain_streaming(&self) -> Vec<(SessionId, OngoingSession)> {
        let ids: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().phase() == SessionPhase::Streaming)
            .map(|entry| entry.key().clone())
            .collect();

        ids.into_iter()
            .filter_map(|id| match self.sessions.remove(&id) {
                Some((id, SessionState::Streaming(ongoing))) => Some((id, ongoing)),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Generate an SSRC: 4 random bytes with the first forced to zero, read
/// big-endian.
pub fn generate_ssrc() -> u32 {
    let mut bytes = [0u8; 4];
    OsRng.fill_bytes(&mut bytes);
    bytes[0] = 0;
    u32::from_be_bytes(bytes)
}

/// Local address used to reach `target`, or the unspecified address of the
/// same family when the routing lookup fails.
async fn local_address_for(target: IpAddr) -> IpAddr {
    let unspecified = match target {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };

    let lookup = async {
        let socket = UdpSocket::bind(SocketAddr::new(unspecified, 0)).await?;
        socket.connect(SocketAddr::new(target, 9)).await?;
        socket.local_addr()
    };

    match lookup.await {
        Ok(local) => local.ip(),
        Err(e) => {
            tracing::warn!("Could not determine local address toward {}: {}", target, e);
            unspecified
        }
    }
}

/// Answers prepare requests and records the resulting pending sessions.
#[derive(Debug, Clone)]
pub struct SessionNegotiator {
    store: Arc<SessionStore>,
}

impl SessionNegotiator {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    /// Negotiate SSRCs for the requested media types and store the session
    ///
    /// Never fails: a missing video or audio request simply omits that media
    /// type from both the response and the stored session.
    pub async fn prepare(&self, request: PrepareRequest) -> PrepareResponse {
        let address = local_address_for(request.target_address).await;

        let video = request
            .video
            .as_ref()
            .map(|media| SrtpTarget::negotiate(media, generate_ssrc()));
        let audio = request
            .audio
            .as_ref()
            .map(|media| SrtpTarget::negotiate(media, generate_ssrc()));

        let response = PrepareResponse {
            address,
            address_family: AddressFamily::of(&address),
            video: respond(request.video.as_ref(), video.as_ref()),
            audio: respond(request.audio.as_ref(), audio.as_ref()),
        };

        let pending = PendingSession {
            target_address: request.target_address,
            video,
            audio,
        };

        if let Some(previous) = self.store.insert_pending(request.session_id.clone(), pending) {
            tracing::debug!(
                session_id = %request.session_id,
                "Prepare superseded existing {:?} session",
                previous.phase()
            );
        }

        tracing::debug!(
            session_id = %request.session_id,
            target = %request.target_address,
            local = %address,
            "Prepared stream session"
        );

        response
    }
}

fn respond(request: Option<&MediaRequest>, target: Option<&SrtpTarget>) -> Option<MediaResponse> {
    match (request, target) {
        (Some(request), Some(target)) => Some(MediaResponse {
            port: request.port,
            ssrc: target.ssrc,
            srtp_key: request.srtp_key.clone(),
            srtp_salt: request.srtp_salt.clone(),
        }),
        _ => None,
    }
}
