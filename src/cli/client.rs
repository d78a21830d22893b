//! IPC client for communicating with the TimeMap daemon.
//!
//! This module provides:
//! - Unix Domain Socket client speaking newline-delimited JSON
//! - Request/response handling
//! - Connection retry logic
//! - Timeout handling
//! - Long-lived subscriptions for live surfaces

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::time::timeout;

use crate::daemon::ipc::{decode_line, encode_line};
use crate::types::{IpcRequest, IpcResponse, PomodoroState, ServerMessage, TimerMode};

// ============================================================================
// Constants
// ============================================================================

/// Connection timeout in seconds
const CONNECTION_TIMEOUT_SECS: u64 = 5;

/// Read/write timeout in seconds
const IO_TIMEOUT_SECS: u64 = 5;

/// Maximum retry attempts
const MAX_RETRIES: u32 = 3;

/// Retry delay in milliseconds (base delay, multiplied by attempt number)
const RETRY_DELAY_MS: u64 = 500;

// ============================================================================
// IpcClient
// ============================================================================

/// IPC client for daemon communication.
#[derive(Debug, Clone)]
pub struct IpcClient {
    /// Socket path
    socket_path: PathBuf,
    /// Connection timeout
    timeout: Duration,
}

impl IpcClient {
    /// Creates a new IPC client with a custom socket path.
    pub fn with_socket_path(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            timeout: Duration::from_secs(CONNECTION_TIMEOUT_SECS),
        }
    }

    /// Returns the socket path.
    pub fn socket_path(&self) -> &PathBuf {
        &self.socket_path
    }

    /// Sends a start command to the daemon.
    pub async fn start(&self) -> Result<IpcResponse> {
        self.command(&IpcRequest::Start).await
    }

    /// Sends a pause command to the daemon.
    pub async fn pause(&self) -> Result<IpcResponse> {
        self.command(&IpcRequest::Pause).await
    }

    /// Sends a reset command to the daemon.
    pub async fn reset(&self) -> Result<IpcResponse> {
        self.command(&IpcRequest::Reset).await
    }

    /// Sends a switchMode command to the daemon.
    pub async fn switch_mode(&self, mode: TimerMode, duration_minutes: u32) -> Result<IpcResponse> {
        self.command(&IpcRequest::SwitchMode {
            mode,
            duration_minutes,
        })
        .await
    }

    /// Sends a status query to the daemon.
    pub async fn status(&self) -> Result<IpcResponse> {
        self.command(&IpcRequest::Status).await
    }

    /// Reads one setting, or all settings when `key` is `None`.
    pub async fn get_setting(&self, key: Option<&str>) -> Result<serde_json::Value> {
        let response = self
            .command(&IpcRequest::GetSetting {
                key: key.map(str::to_string),
            })
            .await?;
        Ok(response.setting.unwrap_or(serde_json::Value::Null))
    }

    /// Writes one setting.
    pub async fn set_setting(&self, key: &str, value: serde_json::Value) -> Result<IpcResponse> {
        self.command(&IpcRequest::SetSetting {
            key: key.to_string(),
            value,
        })
        .await
    }

    /// Opens a subscription: the current state, then every broadcast.
    ///
    /// # Errors
    ///
    /// Returns an error if the daemon is unreachable or refuses.
    pub async fn subscribe(&self) -> Result<SubscriptionStream> {
        let stream = self.connect().await?;
        let (reader, writer) = stream.into_split();
        let mut conn = SubscriptionStream {
            lines: BufReader::new(reader).lines(),
            writer,
            state: PomodoroState::default(),
        };

        conn.write(&IpcRequest::Subscribe).await?;
        loop {
            match conn.read_message(Some(Duration::from_secs(IO_TIMEOUT_SECS))).await? {
                Some(ServerMessage::Response(response)) => {
                    let response = into_result(response)?;
                    conn.state = response
                        .data
                        .context("Daemon did not include the current state")?;
                    return Ok(conn);
                }
                Some(ServerMessage::Event(_)) => continue,
                None => anyhow::bail!("Daemon closed the connection"),
            }
        }
    }

    /// Sends a request with retries and turns error responses into errors.
    async fn command(&self, request: &IpcRequest) -> Result<IpcResponse> {
        let response = self.send_request_with_retry(request).await?;
        into_result(response)
    }

    /// Sends a request to the daemon with retry logic.
    ///
    /// Only transport failures are retried; an error response is final.
    async fn send_request_with_retry(&self, request: &IpcRequest) -> Result<IpcResponse> {
        let mut last_error = None;

        for attempt in 1..=MAX_RETRIES {
            match self.send_request(request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    tracing::warn!("Request failed (attempt {}/{}): {:#}", attempt, MAX_RETRIES, e);
                    last_error = Some(e);

                    if attempt < MAX_RETRIES {
                        let delay = Duration::from_millis(RETRY_DELAY_MS * u64::from(attempt));
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("No request attempts were made")))
    }

    /// Sends a single request to the daemon.
    async fn send_request(&self, request: &IpcRequest) -> Result<IpcResponse> {
        let stream = self.connect().await?;
        let (reader, mut writer) = stream.into_split();

        let line = encode_line(request)?;
        timeout(
            Duration::from_secs(IO_TIMEOUT_SECS),
            writer.write_all(line.as_bytes()),
        )
        .await
        .context("Write timed out")?
        .context("Failed to send request")?;

        let mut lines = BufReader::new(reader).lines();
        loop {
            let line = timeout(Duration::from_secs(IO_TIMEOUT_SECS), lines.next_line())
                .await
                .context("Read timed out")?
                .context("Failed to receive response")?
                .context("Daemon closed the connection without responding")?;

            match decode_line::<ServerMessage>(&line)? {
                Some(ServerMessage::Response(response)) => return Ok(response),
                Some(ServerMessage::Event(_)) | None => continue,
            }
        }
    }

    async fn connect(&self) -> Result<UnixStream> {
        timeout(self.timeout, UnixStream::connect(&self.socket_path))
            .await
            .context("Connection timed out")?
            .with_context(|| {
                format!(
                    "Cannot connect to the daemon at {}. Start it with 'timemap daemon'",
                    self.socket_path.display()
                )
            })
    }
}

fn into_result(response: IpcResponse) -> Result<IpcResponse> {
    if !response.is_success() {
        anyhow::bail!("{}", response.message);
    }
    Ok(response)
}

// ============================================================================
// SubscriptionStream
// ============================================================================

/// A long-lived connection receiving coordinator broadcasts.
pub struct SubscriptionStream {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    /// State returned when the subscription was opened
    pub state: PomodoroState,
}

impl SubscriptionStream {
    /// Waits for the next message. Returns `None` when the daemon closes
    /// the connection.
    ///
    /// # Errors
    ///
    /// Returns an error on socket failures or malformed lines.
    pub async fn next_message(&mut self) -> Result<Option<ServerMessage>> {
        self.read_message(None).await
    }

    async fn write(&mut self, request: &IpcRequest) -> Result<()> {
        let line = encode_line(request)?;
        timeout(
            Duration::from_secs(IO_TIMEOUT_SECS),
            self.writer.write_all(line.as_bytes()),
        )
        .await
        .context("Write timed out")?
        .context("Failed to send request")
    }

    async fn read_message(&mut self, limit: Option<Duration>) -> Result<Option<ServerMessage>> {
        loop {
            let next = match limit {
                Some(limit) => timeout(limit, self.lines.next_line())
                    .await
                    .context("Read timed out")?,
                None => self.lines.next_line().await,
            };
            let Some(line) = next.context("Failed to read from daemon")? else {
                return Ok(None);
            };
            if let Some(message) = decode_line::<ServerMessage>(&line)? {
                return Ok(Some(message));
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
