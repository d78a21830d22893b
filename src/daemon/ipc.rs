//! IPC server for the TimeMap daemon.
//!
//! This module provides Unix Domain Socket IPC functionality:
//! - Server that listens on a Unix socket
//! - Newline-delimited JSON framing, one object per line
//! - Per-connection request relaying to the coordinator
//! - Event forwarding for connections that subscribed

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::types::{IpcRequest, IpcResponse, ServerEvent};

use super::replication::{CoordinatorHandle, Subscription};

// ============================================================================
// Constants
// ============================================================================

/// Default socket path
pub const DEFAULT_SOCKET_PATH: &str = "~/.timemap/timemap.sock";

/// Maximum request line size in bytes (4KB)
pub const MAX_REQUEST_SIZE: usize = 4096;

/// Idle timeout for connections that have not subscribed
const CONNECTION_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// IpcError
// ============================================================================

/// IPC-specific error types.
#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Malformed JSON line
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Request too large
    #[error("Request too large (max {MAX_REQUEST_SIZE} bytes)")]
    RequestTooLarge,
}

// ============================================================================
// Framing
// ============================================================================

/// Serializes a message as one JSON line (with trailing newline).
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn encode_line(msg: &impl Serialize) -> Result<String, IpcError> {
    let mut line =
        serde_json::to_string(msg).map_err(|e| IpcError::SerializationError(e.to_string()))?;
    line.push('\n');
    Ok(line)
}

/// Deserializes one JSON line. Returns `Ok(None)` on blank input.
///
/// # Errors
///
/// Returns an error if the line is oversized or not a valid message.
pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<Option<T>, IpcError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.len() > MAX_REQUEST_SIZE {
        return Err(IpcError::RequestTooLarge);
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|e| IpcError::InvalidMessage(e.to_string()))
}

// ============================================================================
// IpcServer
// ============================================================================

/// Unix Domain Socket IPC server.
pub struct IpcServer {
    /// Unix socket listener
    listener: UnixListener,
    /// Socket path (for cleanup)
    socket_path: PathBuf,
}

impl IpcServer {
    /// Creates a new IPC server bound to the specified socket path.
    ///
    /// If the socket file already exists, it will be removed before binding.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be bound.
    pub fn new(socket_path: &Path) -> Result<Self> {
        if socket_path.exists() {
            std::fs::remove_file(socket_path)
                .with_context(|| format!("Failed to remove existing socket: {:?}", socket_path))?;
        }

        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create socket directory: {:?}", parent))?;
        }

        let listener = UnixListener::bind(socket_path)
            .with_context(|| format!("Failed to bind Unix socket: {:?}", socket_path))?;

        info!("Listening on {}", socket_path.display());

        Ok(Self {
            listener,
            socket_path: socket_path.to_path_buf(),
        })
    }

    /// Accepts an incoming surface connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be accepted.
    pub async fn accept(&self) -> Result<UnixStream> {
        let (stream, _addr) = self
            .listener
            .accept()
            .await
            .context("Failed to accept connection")?;
        Ok(stream)
    }

    /// Accepts connections forever, serving each on its own task.
    pub async fn serve(&self, handle: CoordinatorHandle) {
        loop {
            let stream = match self.accept().await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("{:#}", e);
                    continue;
                }
            };

            let handle = handle.clone();
            tokio::spawn(async move {
                let id = Uuid::new_v4();
                debug!(connection = %id, "surface connected");
                if let Err(e) = SurfaceConnection::new(stream, handle).run().await {
                    debug!(connection = %id, "surface connection ended: {:#}", e);
                }
                debug!(connection = %id, "surface disconnected");
            });
        }
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.socket_path);
    }
}

// ============================================================================
// SurfaceConnection
// ============================================================================

/// One surface connected over the socket.
///
/// Requests are answered in order. After a `subscribe` request the
/// connection also receives every coordinator event until either side
/// closes.
pub struct SurfaceConnection {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    handle: CoordinatorHandle,
    subscription: Option<Subscription>,
}

impl SurfaceConnection {
    /// Wraps an accepted stream.
    pub fn new(stream: UnixStream, handle: CoordinatorHandle) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
            handle,
            subscription: None,
        }
    }

    /// Serves the connection until the surface disconnects.
    ///
    /// # Errors
    ///
    /// Returns an error on socket failures or when an unsubscribed
    /// connection stays idle past the timeout.
    pub async fn run(mut self) -> Result<()> {
        loop {
            tokio::select! {
                line = next_line(&mut self.lines, self.subscription.is_none()) => {
                    let Some(line) = line? else {
                        return Ok(());
                    };
                    let response = self.dispatch(&line).await;
                    self.send(&response).await?;
                }
                event = next_event(&mut self.subscription) => match event {
                    Some(event) => self.send(&event).await?,
                    None => {
                        debug!("coordinator stopped publishing");
                        self.subscription = None;
                    }
                },
            }
        }
    }

    async fn dispatch(&mut self, line: &str) -> IpcResponse {
        let request = match decode_line::<IpcRequest>(line) {
            Ok(Some(request)) => request,
            Ok(None) => return IpcResponse::error("Empty request"),
            Err(e) => return IpcResponse::error(e.to_string()),
        };

        match request {
            IpcRequest::Subscribe => match self.handle.subscribe().await {
                Ok(subscription) => {
                    let state = subscription.state.clone();
                    self.subscription = Some(subscription);
                    IpcResponse::success("Subscribed", Some(state))
                }
                Err(e) => IpcResponse::error(e.to_string()),
            },
            request => self
                .handle
                .request(request)
                .await
                .unwrap_or_else(|e| IpcResponse::error(e.to_string())),
        }
    }

    async fn send(&mut self, msg: &impl Serialize) -> Result<()> {
        let line = encode_line(msg)?;
        self.writer
            .write_all(line.as_bytes())
            .await
            .context("Failed to write to surface")?;
        self.writer
            .flush()
            .await
            .context("Failed to flush to surface")?;
        Ok(())
    }
}

async fn next_line(
    lines: &mut Lines<BufReader<OwnedReadHalf>>,
    idle_timeout: bool,
) -> Result<Option<String>> {
    let read = lines.next_line();
    let line = if idle_timeout {
        timeout(Duration::from_secs(CONNECTION_TIMEOUT_SECS), read)
            .await
            .map_err(|_| IpcError::Timeout)?
    } else {
        read.await
    };
    line.context("Failed to read request")
}

async fn next_event(subscription: &mut Option<Subscription>) -> Option<ServerEvent> {
    match subscription {
        Some(subscription) => subscription.next_event().await,
        None => std::future::pending().await,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    use crate::daemon::coordinator::Coordinator;
    use crate::daemon::replication::mailbox;
    use crate::daemon::scheduler::{ManualAlarms, TickScheduler};
    use crate::daemon::store::MemoryStore;
    use crate::daemon::timer::TimerEngine;
    use crate::notification::LogNotifier;
    use crate::types::{PomodoroState, ServerMessage, TimerMode};

    // ------------------------------------------------------------------------
    // Helper functions
    // ------------------------------------------------------------------------

    fn create_temp_socket_path() -> PathBuf {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sock");
        // Keep the directory so it's not deleted
        std::mem::forget(dir);
        path
    }

    fn spawn_coordinator() -> CoordinatorHandle {
        let (alarm_tx, alarm_rx) = mpsc::unbounded_channel();
        let coordinator = Coordinator::new(
            Arc::new(MemoryStore::new()),
            TimerEngine::default(),
            TickScheduler::new(ManualAlarms::new(alarm_tx)),
            Arc::new(LogNotifier),
        );
        let (handle, rx) = mailbox();
        tokio::spawn(coordinator.run(rx, alarm_rx));
        handle
    }

    async fn spawn_server() -> (PathBuf, CoordinatorHandle) {
        let socket_path = create_temp_socket_path();
        let server = IpcServer::new(&socket_path).unwrap();
        let handle = spawn_coordinator();
        let serve_handle = handle.clone();
        tokio::spawn(async move { server.serve(serve_handle).await });
        (socket_path, handle)
    }

    struct TestClient {
        lines: Lines<BufReader<OwnedReadHalf>>,
        writer: OwnedWriteHalf,
    }

    impl TestClient {
        async fn connect(path: &Path) -> Self {
            let stream = UnixStream::connect(path).await.unwrap();
            let (reader, writer) = stream.into_split();
            Self {
                lines: BufReader::new(reader).lines(),
                writer,
            }
        }

        async fn send_raw(&mut self, line: &str) {
            self.writer.write_all(line.as_bytes()).await.unwrap();
            self.writer.write_all(b"\n").await.unwrap();
        }

        async fn send(&mut self, request: &IpcRequest) {
            let line = encode_line(request).unwrap();
            self.writer.write_all(line.as_bytes()).await.unwrap();
        }

        async fn recv(&mut self) -> ServerMessage {
            let line = timeout(Duration::from_secs(2), self.lines.next_line())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            decode_line(&line).unwrap().unwrap()
        }

        async fn recv_response(&mut self) -> IpcResponse {
            match self.recv().await {
                ServerMessage::Response(response) => response,
                other => panic!("Expected response, got {:?}", other),
            }
        }
    }

    // ------------------------------------------------------------------------
    // Framing Tests
    // ------------------------------------------------------------------------

    mod framing_tests {
        use super::*;

        #[test]
        fn test_encode_produces_single_line() {
            let line = encode_line(&IpcRequest::SwitchMode {
                mode: TimerMode::ShortBreak,
                duration_minutes: 5,
            })
            .unwrap();

            assert!(line.ends_with('\n'));
            assert_eq!(line.matches('\n').count(), 1);
        }

        #[test]
        fn test_decode_blank_line() {
            assert!(decode_line::<IpcRequest>("   \n").unwrap().is_none());
        }

        #[test]
        fn test_decode_trims_whitespace() {
            let request: IpcRequest = decode_line("  {\"command\":\"pause\"}\r\n").unwrap().unwrap();
            assert_eq!(request, IpcRequest::Pause);
        }

        #[test]
        fn test_decode_invalid_json() {
            let result = decode_line::<IpcRequest>("{oops");
            assert!(matches!(result, Err(IpcError::InvalidMessage(_))));
        }

        #[test]
        fn test_decode_oversized() {
            let line = format!("{{\"command\":\"{}\"}}", "x".repeat(MAX_REQUEST_SIZE));
            let result = decode_line::<IpcRequest>(&line);
            assert!(matches!(result, Err(IpcError::RequestTooLarge)));
        }
    }

    // ------------------------------------------------------------------------
    // IpcServer Tests
    // ------------------------------------------------------------------------

    mod ipc_server_tests {
        use super::*;

        #[tokio::test]
        async fn test_server_creation() {
            let socket_path = create_temp_socket_path();
            let server = IpcServer::new(&socket_path);

            assert!(server.is_ok());
            assert!(socket_path.exists());
        }

        #[tokio::test]
        async fn test_server_removes_existing_socket() {
            let socket_path = create_temp_socket_path();
            std::fs::write(&socket_path, "stale").unwrap();

            let server = IpcServer::new(&socket_path);
            assert!(server.is_ok());
        }

        #[tokio::test]
        async fn test_server_creates_parent_directory() {
            let dir = tempfile::tempdir().unwrap();
            let socket_path = dir.path().join("subdir").join("test.sock");

            let server = IpcServer::new(&socket_path);
            assert!(server.is_ok());
            assert!(socket_path.parent().unwrap().exists());
        }

        #[tokio::test]
        async fn test_drop_removes_socket_file() {
            let socket_path = create_temp_socket_path();
            let server = IpcServer::new(&socket_path).unwrap();
            drop(server);

            assert!(!socket_path.exists());
        }
    }

    // ------------------------------------------------------------------------
    // SurfaceConnection Tests
    // ------------------------------------------------------------------------

    mod connection_tests {
        use super::*;

        #[tokio::test]
        async fn test_status_request() {
            let (path, _handle) = spawn_server().await;
            let mut client = TestClient::connect(&path).await;

            client.send(&IpcRequest::Status).await;
            let response = client.recv_response().await;

            assert!(response.is_success());
            assert_eq!(response.data, Some(PomodoroState::default()));
        }

        #[tokio::test]
        async fn test_multiple_requests_on_one_connection() {
            let (path, _handle) = spawn_server().await;
            let mut client = TestClient::connect(&path).await;

            client.send(&IpcRequest::Start).await;
            assert!(client.recv_response().await.data.unwrap().is_running);

            client.send(&IpcRequest::Pause).await;
            assert!(!client.recv_response().await.data.unwrap().is_running);
        }

        #[tokio::test]
        async fn test_invalid_request_gets_error() {
            let (path, _handle) = spawn_server().await;
            let mut client = TestClient::connect(&path).await;

            client.send_raw(r#"{"command":"explode"}"#).await;
            let response = client.recv_response().await;

            assert!(!response.is_success());
            assert!(response.message.contains("Invalid message"));
        }

        #[tokio::test]
        async fn test_subscriber_receives_other_surface_commands() {
            let (path, _handle) = spawn_server().await;
            let mut overlay = TestClient::connect(&path).await;
            let mut popup = TestClient::connect(&path).await;

            overlay.send(&IpcRequest::Subscribe).await;
            let initial = overlay.recv_response().await;
            assert_eq!(initial.data, Some(PomodoroState::default()));

            popup.send(&IpcRequest::Start).await;
            let started = popup.recv_response().await.data.unwrap();

            match overlay.recv().await {
                ServerMessage::Event(ServerEvent::StateChanged { pomodoro_state }) => {
                    assert_eq!(pomodoro_state, started);
                }
                other => panic!("Expected StateChanged, got {:?}", other),
            }
        }

        #[tokio::test]
        async fn test_unsubscribed_connection_gets_no_events() {
            let (path, _handle) = spawn_server().await;
            let mut quiet = TestClient::connect(&path).await;
            let mut popup = TestClient::connect(&path).await;

            quiet.send(&IpcRequest::Status).await;
            quiet.recv_response().await;

            popup.send(&IpcRequest::Start).await;
            popup.recv_response().await;

            let next = timeout(Duration::from_millis(200), quiet.lines.next_line()).await;
            assert!(next.is_err());
        }

        #[tokio::test]
        async fn test_coordinator_gone_reports_error() {
            let (path, handle) = spawn_server().await;
            handle.shutdown().await;
            while !handle.is_closed() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }

            let mut client = TestClient::connect(&path).await;
            client.send(&IpcRequest::Status).await;
            let response = client.recv_response().await;

            assert!(!response.is_success());
            assert!(response.message.contains("coordinator"));
        }
    }
}
