//! Transcoder process supervision.
//!
//! [`StreamSupervisor::start`] turns a pending session into a running
//! transcoder. Each process gets one monitor task which owns the child, logs
//! its stderr, resolves the readiness latch on the first stderr line and
//! classifies the exit. Stop requests reach the monitor through the kill
//! channel stored in the session's [`OngoingSession`].

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use homecam_api::{CameraId, CloudClient};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::oneshot;

use crate::args::{ArgumentBuilder, PipelineInput};
use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
use crate::resolver::AddressResolver;
use crate::session::{OngoingSession, PendingSession, RegisterRejection, SessionStore, StopAction};
use crate::types::{MediaOptions, SessionId, StartRequest};

/// How a start request was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The transcoder produced output and is streaming
    Streaming,
    /// No pending session existed for the identifier
    Ignored,
    /// The transcoder stopped normally before producing output
    EndedBeforeReady,
    /// A stop or a newer prepare arrived while starting
    Cancelled,
}

/// Tears down the viewer-facing side of a session whose transcoder died.
pub trait SessionTeardown: Send + Sync {
    fn force_stop(&self, session_id: &SessionId, reason: StreamError);
}

/// [`SessionTeardown`] that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTeardown;

impl SessionTeardown for LogTeardown {
    fn force_stop(&self, session_id: &SessionId, reason: StreamError) {
        tracing::warn!(session_id = %session_id, "Stream ended: {}", reason);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    Ready,
    Ended,
    Failed(i32),
    Killed,
}

/// Exit codes treated as a normal stop; `None` means killed by a signal.
fn abnormal_exit(code: Option<i32>) -> Option<i32> {
    code.filter(|code| *code != 0 && *code != 255)
}

/// Starts, stops and watches transcoder processes for one camera.
pub struct StreamSupervisor {
    camera_id: CameraId,
    capabilities: MediaOptions,
    client: Arc<dyn CloudClient>,
    config: Arc<StreamConfig>,
    sessions: Arc<SessionStore>,
    resolver: Arc<AddressResolver>,
    teardown: Arc<dyn SessionTeardown>,
    next_spawn_id: AtomicU64,
}

impl StreamSupervisor {
    pub fn new(
        camera_id: CameraId,
        capabilities: MediaOptions,
        client: Arc<dyn CloudClient>,
        config: Arc<StreamConfig>,
        sessions: Arc<SessionStore>,
        resolver: Arc<AddressResolver>,
    ) -> Self {
        Self {
            camera_id,
            capabilities,
            client,
            config,
            sessions,
            resolver,
            teardown: Arc::new(LogTeardown),
            next_spawn_id: AtomicU64::new(1),
        }
    }

    pub fn with_teardown(mut self, teardown: Arc<dyn SessionTeardown>) -> Self {
        self.teardown = teardown;
        self
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Start streaming a prepared session
    ///
    /// Resolves once the transcoder is ready, has ended, or has failed.
    pub async fn start(&self, session_id: &SessionId, request: &StartRequest) -> Result<StartOutcome> {
        self.client.rate_limit().check()?;

        let spawn_id = self.next_spawn_id.fetch_add(1, Ordering::Relaxed);
        let Some(pending) = self.sessions.begin_start(session_id, spawn_id) else {
            tracing::debug!(session_id = %session_id, "Start without pending session ignored");
            return Ok(StartOutcome::Ignored);
        };

        // Covers both a failed spawn and the caller dropping this future
        let mut guard = StartGuard {
            sessions: self.sessions.as_ref(),
            session_id,
            attempt: spawn_id,
            armed: true,
        };

        let (child, stderr) = match self.spawn(&pending, request).await {
            Ok(spawned) => spawned,
            Err(e) => {
                tracing::error!(session_id = %session_id, "Failed to start stream: {}", e);
                return Err(e);
            }
        };

        let pid = child.id();
        let (kill_tx, kill_rx) = oneshot::channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        // Registered before the monitor runs so a fast exit always finds its entry
        guard.armed = false;
        let rejection = match self
            .sessions
            .register(session_id, OngoingSession::new(spawn_id, pid, kill_tx))
        {
            Ok(()) => None,
            Err(RegisterRejection::StopRequested(_)) => Some("stop arrived during start"),
            Err(RegisterRejection::Superseded(_)) => Some("session superseded during start"),
        };

        if let Some(reason) = rejection {
            tracing::debug!(session_id = %session_id, "Killing transcoder: {}", reason);
            // kill_on_drop delivers the kill
            drop(child);
            return Ok(StartOutcome::Cancelled);
        }

        tracing::info!(session_id = %session_id, pid = ?pid, "Transcoder started");

        let monitor = ProcessMonitor {
            session_id: session_id.clone(),
            spawn_id,
            sessions: Arc::clone(&self.sessions),
            teardown: Arc::clone(&self.teardown),
            ready_tx: Some(ready_tx),
        };
        tokio::spawn(monitor.run(child, stderr, kill_rx));

        match ready_rx.await {
            Ok(Readiness::Ready) => Ok(StartOutcome::Streaming),
            Ok(Readiness::Ended) => {
                tracing::info!(session_id = %session_id, "Transcoder ended before producing output");
                Ok(StartOutcome::EndedBeforeReady)
            }
            Ok(Readiness::Failed(code)) => Err(StreamError::ProcessExit { code }),
            Ok(Readiness::Killed) | Err(_) => Ok(StartOutcome::Cancelled),
        }
    }

    /// Stop a session in whatever phase it is; never fails
    pub fn stop(&self, session_id: &SessionId) {
        match self.sessions.request_stop(session_id) {
            StopAction::Terminate(ongoing) => {
                let pid = ongoing.pid;
                if ongoing.terminate() {
                    tracing::info!(session_id = %session_id, pid = ?pid, "Stopping transcoder");
                } else {
                    tracing::debug!(session_id = %session_id, "Transcoder already exited");
                }
            }
            StopAction::DiscardedPending => {
                tracing::debug!(session_id = %session_id, "Discarded pending session");
            }
            StopAction::Deferred => {
                tracing::debug!(session_id = %session_id, "Stop deferred until transcoder registers");
            }
            StopAction::Unknown => {
                tracing::debug!(session_id = %session_id, "Stop for unknown session ignored");
            }
        }
    }

    /// Kill every running transcoder
    pub fn shutdown(&self) {
        let drained = self.sessions.drain_streaming();
        if !drained.is_empty() {
            tracing::info!("Stopping {} running transcoder(s)", drained.len());
        }
        for (_, ongoing) in drained {
            ongoing.terminate();
        }
    }

    async fn spawn(
        &self,
        pending: &PendingSession,
        request: &StartRequest,
    ) -> Result<(Child, ChildStderr)> {
        let media_address = self.resolver.resolve(&self.config.media_host).await?;
        let access_token = self.client.access_token();

        let args = ArgumentBuilder::new(&self.config)
            .build(&PipelineInput {
                camera_id: &self.camera_id,
                access_token: &access_token,
                media_address,
                session: pending,
                capabilities: &self.capabilities,
                request,
            })
            .to_command_args();

        tracing::debug!(
            "Spawning {} with {} arguments",
            self.config.binary().display(),
            args.len()
        );

        let mut child = Command::new(self.config.binary())
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| StreamError::ProcessSpawn(e.to_string()))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| StreamError::ProcessSpawn("stderr was not captured".to_string()))?;

        Ok((child, stderr))
    }
}

impl std::fmt::Debug for StreamSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSupervisor")
            .field("camera_id", &self.camera_id)
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

/// Abandons an in-flight start that never reached registration.
struct StartGuard<'a> {
    sessions: &'a SessionStore,
    session_id: &'a SessionId,
    attempt: u64,
    armed: bool,
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        if self.armed && self.sessions.abandon_start(self.session_id, self.attempt) {
            tracing::debug!(session_id = %self.session_id, "Abandoned unfinished start");
        }
    }
}

struct ProcessMonitor {
    session_id: SessionId,
    spawn_id: u64,
    sessions: Arc<SessionStore>,
    teardown: Arc<dyn SessionTeardown>,
    ready_tx: Option<oneshot::Sender<Readiness>>,
}

impl ProcessMonitor {
    fn resolve(&mut self, readiness: Readiness) -> bool {
        match self.ready_tx.take() {
            Some(tx) => {
                let _ = tx.send(readiness);
                true
            }
            None => false,
        }
    }

    async fn run(mut self, mut child: Child, stderr: ChildStderr, mut kill_rx: oneshot::Receiver<()>) {
        let mut lines = BufReader::new(stderr).lines();
        let mut stderr_open = true;
        let mut killed = false;

        let status = loop {
            tokio::select! {
                biased;

                line = lines.next_line(), if stderr_open => match line {
                    Ok(Some(line)) => {
                        tracing::debug!(session_id = %self.session_id, "transcoder: {}", line);
                        if self.resolve(Readiness::Ready) {
                            tracing::debug!(session_id = %self.session_id, "Transcoder ready");
                        }
                    }
                    Ok(None) => stderr_open = false,
                    Err(e) => {
                        tracing::debug!(session_id = %self.session_id, "Stopped reading stderr: {}", e);
                        stderr_open = false;
                    }
                },

                // A dropped sender means the session was superseded
                _ = &mut kill_rx, if !killed => {
                    killed = true;
                    if let Err(e) = child.start_kill() {
                        let error = StreamError::Termination {
                            session_id: self.session_id.clone(),
                            message: e.to_string(),
                        };
                        tracing::warn!("{}", error);
                    }
                }

                status = child.wait() => break status,
            }
        };

        let code = match status {
            Ok(status) => status.code(),
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, "Failed to reap transcoder: {}", e);
                None
            }
        };

        self.sessions.remove_finished(&self.session_id, self.spawn_id);

        let abnormal = abnormal_exit(code);
        let readiness = match (killed, abnormal) {
            (true, _) => Readiness::Killed,
            (false, Some(code)) => Readiness::Failed(code),
            (false, None) => Readiness::Ended,
        };

        if self.resolve(readiness) {
            return;
        }

        match abnormal {
            Some(code) if !killed => {
                tracing::error!(session_id = %self.session_id, "Transcoder exited with code {}", code);
                let reason = StreamError::ProcessRuntime {
                    session_id: self.session_id.clone(),
                    code,
                };
                self.teardown.force_stop(&self.session_id, reason);
            }
            _ => {
                tracing::info!(session_id = %self.session_id, code = ?code, "Transcoder stopped");
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::overrides::{ArgumentOverrides, OverrideMap};
    use crate::session::{SessionPhase, SrtpTarget};
    use crate::testing::{camera, FakeCloud};
    use rstest::rstest;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Records force-stop calls
    struct RecordingTeardown {
        tx: mpsc::UnboundedSender<(SessionId, StreamError)>,
    }

    impl SessionTeardown for RecordingTeardown {
        fn force_stop(&self, session_id: &SessionId, reason: StreamError) {
            let _ = self.tx.send((session_id.clone(), reason));
        }
    }

    /// Runs `script` through `sh -c` in place of the transcoder; the
    /// generated arguments become the script's positional parameters
    fn shell_config(script: &str) -> StreamConfig {
        StreamConfig::new()
            .with_media_server("https", "127.0.0.1", None)
            .with_ffmpeg_path("/bin/sh")
            .with_overrides(ArgumentOverrides {
                source: OverrideMap::new().set("-c", script),
                ..Default::default()
            })
    }

    fn supervisor(config: StreamConfig, cloud: FakeCloud) -> StreamSupervisor {
        let details = camera("SS002", "open");
        StreamSupervisor::new(
            details.id.clone(),
            MediaOptions::from_details(&details),
            Arc::new(cloud),
            Arc::new(config),
            Arc::new(SessionStore::new()),
            Arc::new(AddressResolver::new()),
        )
    }

    fn prepared(supervisor: &StreamSupervisor) -> SessionId {
        let id = SessionId::new(uuid::Uuid::new_v4().to_string());
        supervisor.sessions().insert_pending(
            id.clone(),
            PendingSession {
                target_address: "127.0.0.1".parse().unwrap(),
                video: Some(SrtpTarget {
                    port: 50000,
                    ssrc: 1234,
                    keying: vec![0u8; 30],
                }),
                audio: None,
            },
        );
        id
    }

    async fn start(supervisor: &StreamSupervisor, id: &SessionId) -> Result<StartOutcome> {
        tokio::time::timeout(
            Duration::from_secs(10),
            supervisor.start(id, &StartRequest::default()),
        )
        .await
        .expect("start timed out")
    }

    async fn wait_until_gone(supervisor: &StreamSupervisor, id: &SessionId) {
        for _ in 0..100 {
            if supervisor.sessions().phase(id).is_none() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("session {id} still present");
    }

    #[tokio::test]
    async fn test_first_stderr_line_marks_streaming() {
        let supervisor = supervisor(shell_config("echo ready >&2; exec sleep 30"), FakeCloud::new());
        let id = prepared(&supervisor);

        assert_eq!(start(&supervisor, &id).await.unwrap(), StartOutcome::Streaming);
        assert_eq!(supervisor.sessions().phase(&id), Some(SessionPhase::Streaming));

        supervisor.stop(&id);
        assert!(supervisor.sessions().phase(&id).is_none());
    }

    #[rstest]
    #[case("exit 0")]
    #[case("exit 255")]
    #[tokio::test]
    async fn test_normal_exit_before_ready(#[case] script: &str) {
        let supervisor = supervisor(shell_config(script), FakeCloud::new());
        let id = prepared(&supervisor);

        assert_eq!(
            start(&supervisor, &id).await.unwrap(),
            StartOutcome::EndedBeforeReady
        );
        assert!(supervisor.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_abnormal_exit_before_ready() {
        let supervisor = supervisor(shell_config("exit 3"), FakeCloud::new());
        let id = prepared(&supervisor);

        let err = start(&supervisor, &id).await.unwrap_err();
        assert!(matches!(err, StreamError::ProcessExit { code: 3 }));
        assert!(supervisor.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_runtime_failure_tears_down_session() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let supervisor = supervisor(
            shell_config("echo ready >&2; sleep 0.2; exit 1"),
            FakeCloud::new(),
        )
        .with_teardown(Arc::new(RecordingTeardown { tx }));
        let id = prepared(&supervisor);

        assert_eq!(start(&supervisor, &id).await.unwrap(), StartOutcome::Streaming);

        let (torn_down, reason) = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("teardown timed out")
            .expect("teardown channel closed");
        assert_eq!(torn_down, id);
        assert!(matches!(reason, StreamError::ProcessRuntime { code: 1, .. }));
        wait_until_gone(&supervisor, &id).await;
    }

    #[tokio::test]
    async fn test_killed_stream_is_not_torn_down() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let supervisor = supervisor(shell_config("echo ready >&2; exec sleep 30"), FakeCloud::new())
            .with_teardown(Arc::new(RecordingTeardown { tx }));
        let id = prepared(&supervisor);

        start(&supervisor, &id).await.unwrap();
        supervisor.stop(&id);
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let config = StreamConfig::new()
            .with_media_server("https", "127.0.0.1", None)
            .with_ffmpeg_path("/nonexistent/homecam/ffmpeg");
        let supervisor = supervisor(config, FakeCloud::new());
        let id = prepared(&supervisor);

        let err = start(&supervisor, &id).await.unwrap_err();
        assert!(matches!(err, StreamError::ProcessSpawn(_)));
        assert!(supervisor.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limited_start_keeps_pending() {
        let supervisor = supervisor(shell_config("exit 0"), FakeCloud::blocked());
        let id = prepared(&supervisor);

        let err = start(&supervisor, &id).await.unwrap_err();
        assert!(matches!(err, StreamError::RateLimited));
        assert_eq!(supervisor.sessions().phase(&id), Some(SessionPhase::Pending));
    }

    /// Lookup that never answers
    struct StalledLookup;

    #[async_trait::async_trait]
    impl crate::resolver::HostLookup for StalledLookup {
        async fn lookup(&self, _host: &str) -> std::io::Result<Vec<std::net::IpAddr>> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_dropped_start_releases_session() {
        let details = camera("SS002", "open");
        let supervisor = StreamSupervisor::new(
            details.id.clone(),
            MediaOptions::from_details(&details),
            Arc::new(FakeCloud::new()),
            Arc::new(shell_config("exit 0").with_media_server("https", "media.example", None)),
            Arc::new(SessionStore::new()),
            Arc::new(AddressResolver::with_lookup(StalledLookup)),
        );
        let id = prepared(&supervisor);

        let timed_out = tokio::time::timeout(
            Duration::from_millis(50),
            supervisor.start(&id, &StartRequest::default()),
        )
        .await;
        assert!(timed_out.is_err());

        assert!(supervisor.sessions().phase(&id).is_none());
        supervisor.stop(&id);
        assert!(supervisor.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_start_without_pending_is_ignored() {
        let supervisor = supervisor(shell_config("exit 0"), FakeCloud::new());
        let outcome = start(&supervisor, &SessionId::new("nobody")).await.unwrap();
        assert_eq!(outcome, StartOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_stop_pending_and_unknown() {
        let supervisor = supervisor(shell_config("exit 0"), FakeCloud::new());
        let id = prepared(&supervisor);

        supervisor.stop(&id);
        assert!(supervisor.sessions().is_empty());
        supervisor.stop(&SessionId::new("unknown"));
    }

    #[tokio::test]
    async fn test_shutdown_kills_running_transcoders() {
        let supervisor = supervisor(shell_config("echo ready >&2; exec sleep 30"), FakeCloud::new());
        let first = prepared(&supervisor);
        let second = prepared(&supervisor);

        start(&supervisor, &first).await.unwrap();
        start(&supervisor, &second).await.unwrap();
        assert_eq!(supervisor.sessions().len(), 2);

        supervisor.shutdown();
        assert!(supervisor.sessions().is_empty());
    }

    #[test]
    fn test_exit_code_classification() {
        assert_eq!(abnormal_exit(Some(0)), None);
        assert_eq!(abnormal_exit(Some(255)), None);
        assert_eq!(abnormal_exit(None), None);
        assert_eq!(abnormal_exit(Some(1)), Some(1));
    }
}
