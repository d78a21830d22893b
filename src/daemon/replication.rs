//! Replication between the coordinator and its surfaces.
//!
//! Surfaces reach the coordinator through a [`CoordinatorHandle`], a cheap
//! clone of the mailbox sender. The coordinator publishes every change
//! through a [`Publisher`]; each surface holds a [`Subscription`] that starts
//! from a pulled snapshot and then follows the broadcast.
//!
//! Delivery is best-effort. Publishing with no subscribers is not an error,
//! and a subscriber that falls behind skips straight to newer events.

use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::coordinator::CoordinatorMessage;
use crate::types::{IpcRequest, IpcResponse, PomodoroState, ServerEvent};

// ============================================================================
// Constants
// ============================================================================

/// Capacity of the coordinator mailbox.
pub const MAILBOX_CAPACITY: usize = 64;

/// Capacity of the event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// ReplicationError
// ============================================================================

/// Errors raised when the coordinator cannot be reached.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReplicationError {
    /// The coordinator mailbox is closed
    #[error("coordinator is not running")]
    CoordinatorGone,

    /// The coordinator dropped the reply channel
    #[error("coordinator dropped the request")]
    NoReply,
}

// ============================================================================
// Publisher
// ============================================================================

/// Broadcasts coordinator events to every subscribed surface.
#[derive(Debug, Clone)]
pub struct Publisher {
    tx: broadcast::Sender<ServerEvent>,
}

impl Default for Publisher {
    fn default() -> Self {
        Self::new()
    }
}

impl Publisher {
    /// Creates a publisher with no subscribers.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publishes a timer state change.
    pub fn publish_state(&self, state: &PomodoroState) {
        self.publish(ServerEvent::StateChanged {
            pomodoro_state: state.clone(),
        });
    }

    /// Publishes a settings write.
    pub fn publish_setting(&self, key: &str, value: serde_json::Value) {
        self.publish(ServerEvent::SettingChanged {
            key: key.to_string(),
            value,
        });
    }

    fn publish(&self, event: ServerEvent) {
        if self.tx.send(event).is_err() {
            debug!("dropping event: no active subscribers");
        }
    }

    /// Starts following events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.tx.subscribe()
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// A surface's view of the coordinator: the state pulled at subscribe time
/// plus every later event.
#[derive(Debug)]
pub struct Subscription {
    /// State at the moment of subscribing
    pub state: PomodoroState,
    events: broadcast::Receiver<ServerEvent>,
}

impl Subscription {
    /// Creates a subscription from a snapshot and a receiver taken at the
    /// same point in the coordinator's message order.
    pub fn new(state: PomodoroState, events: broadcast::Receiver<ServerEvent>) -> Self {
        Self { state, events }
    }

    /// Waits for the next event. Returns `None` once the coordinator is gone.
    ///
    /// Events missed by a lagging subscriber are skipped.
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        loop {
            match self.events.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(missed)) => {
                    debug!("subscriber lagged, skipped {} events", missed);
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

// ============================================================================
// CoordinatorHandle
// ============================================================================

/// Sending side of the coordinator mailbox.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<CoordinatorMessage>,
}

/// Creates a connected handle and mailbox receiver.
pub fn mailbox() -> (CoordinatorHandle, mpsc::Receiver<CoordinatorMessage>) {
    let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
    (CoordinatorHandle { tx }, rx)
}

impl CoordinatorHandle {
    /// Relays a surface command and waits for the coordinator's answer.
    ///
    /// # Errors
    ///
    /// Returns an error if the coordinator has stopped.
    pub async fn request(&self, request: IpcRequest) -> Result<IpcResponse, ReplicationError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(CoordinatorMessage::Command { request, reply })
            .await
            .map_err(|_| ReplicationError::CoordinatorGone)?;
        rx.await.map_err(|_| ReplicationError::NoReply)
    }

    /// Pulls the current state and starts following broadcasts.
    ///
    /// # Errors
    ///
    /// Returns an error if the coordinator has stopped.
    pub async fn subscribe(&self) -> Result<Subscription, ReplicationError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(CoordinatorMessage::Subscribe { reply })
            .await
            .map_err(|_| ReplicationError::CoordinatorGone)?;
        rx.await.map_err(|_| ReplicationError::NoReply)
    }

    /// Asks the coordinator to stop after draining queued messages.
    pub async fn shutdown(&self) {
        if self.tx.send(CoordinatorMessage::Shutdown).await.is_err() {
            debug!("coordinator already stopped");
        }
    }

    /// Returns true once the coordinator mailbox is closed.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// ============================================================================
// Tests
// ============================================================================
