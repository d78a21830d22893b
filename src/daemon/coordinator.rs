//! The single-writer coordinator actor.
//!
//! The coordinator owns the authoritative [`TimerStateStore`], the
//! [`TimerEngine`] and the [`TickScheduler`]. Surface commands, alarm fires
//! and store changes are processed one at a time from its mailbox, so the
//! timer record needs no locking.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::replication::{Publisher, Subscription};
use super::scheduler::{AlarmFired, TickScheduler};
use super::settings;
use super::store::{KeyValueStore, StoreChange, TimerStateStore, STATE_KEY};
use super::timer::{TimerEngine, Transition};
use crate::notification::{completion_content, dispatch, Notifier};
use crate::types::{IpcRequest, IpcResponse, PomodoroState};

// ============================================================================
// CoordinatorMessage
// ============================================================================

/// Messages accepted by the coordinator mailbox.
#[derive(Debug)]
pub enum CoordinatorMessage {
    /// A surface command awaiting a response
    Command {
        /// Command to apply
        request: IpcRequest,
        /// Reply channel
        reply: oneshot::Sender<IpcResponse>,
    },
    /// A surface asking for the current state plus later broadcasts
    Subscribe {
        /// Reply channel
        reply: oneshot::Sender<Subscription>,
    },
    /// Stop after draining queued messages
    Shutdown,
}

// ============================================================================
// Coordinator
// ============================================================================

/// Owner of the authoritative timer state.
pub struct Coordinator {
    store: TimerStateStore,
    engine: TimerEngine,
    scheduler: TickScheduler,
    publisher: Publisher,
    notifier: Arc<dyn Notifier>,
}

impl Coordinator {
    /// Creates the coordinator, loading the persisted record and migrating
    /// default settings.
    ///
    /// A record persisted while running resumes counting from its remaining
    /// time.
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        engine: TimerEngine,
        scheduler: TickScheduler,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        if let Err(e) = settings::migrate(kv.as_ref(), env!("CARGO_PKG_VERSION")) {
            warn!("Settings migration skipped: {}", e);
        }

        let store = TimerStateStore::load(kv);
        let mut coordinator = Self {
            store,
            engine,
            scheduler,
            publisher: Publisher::new(),
            notifier,
        };

        if coordinator.store.state().is_running {
            info!(
                "Resuming {} with {}s left",
                coordinator.store.state().mode,
                coordinator.store.state().time_left_seconds
            );
            coordinator.scheduler.arm(coordinator.engine.tick_period());
        }

        coordinator
    }

    /// Returns the current authoritative state.
    pub fn state(&self) -> &PomodoroState {
        self.store.state()
    }

    /// Returns the event publisher.
    #[cfg(test)]
    pub(crate) fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    /// Returns true while the countdown alarm is armed.
    #[cfg(test)]
    pub(crate) fn is_ticking(&self) -> bool {
        self.scheduler.is_armed()
    }

    /// Run the actor loop until Shutdown is received or every handle is
    /// dropped.
    ///
    /// On shutdown the mailbox is closed and queued messages are drained;
    /// queued status reads are still answered, queued mutations are refused.
    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<CoordinatorMessage>,
        mut alarms: mpsc::UnboundedReceiver<AlarmFired>,
    ) {
        info!("coordinator started");

        let mut changes = Some(self.store.kv().subscribe());

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(msg) = msg else {
                        debug!("all coordinator handles dropped");
                        break;
                    };
                    if self.handle_message(msg) {
                        rx.close();
                        self.drain_queued_messages(&mut rx).await;
                        break;
                    }
                }
                Some(fired) = alarms.recv() => {
                    self.handle_alarm(&fired);
                }
                change = next_change(&mut changes) => match change {
                    Ok(change) => self.relay_store_change(change),
                    Err(RecvError::Lagged(missed)) => {
                        debug!("store change stream lagged, skipped {}", missed);
                    }
                    Err(RecvError::Closed) => {
                        debug!("store change stream closed");
                        changes = None;
                    }
                },
            }
        }

        self.scheduler.disarm();
        self.store.persist();
        info!("coordinator stopped");
    }

    /// Returns true when the message requests shutdown.
    fn handle_message(&mut self, msg: CoordinatorMessage) -> bool {
        match msg {
            CoordinatorMessage::Command { request, reply } => {
                let response = self.handle_request(request);
                if reply.send(response).is_err() {
                    debug!("command reply channel dropped");
                }
                false
            }
            CoordinatorMessage::Subscribe { reply } => {
                let subscription = self.subscribe();
                if reply.send(subscription).is_err() {
                    debug!("subscribe reply channel dropped");
                }
                false
            }
            CoordinatorMessage::Shutdown => {
                info!("coordinator shutting down");
                true
            }
        }
    }

    async fn drain_queued_messages(&mut self, rx: &mut mpsc::Receiver<CoordinatorMessage>) {
        while let Some(msg) = rx.recv().await {
            match msg {
                CoordinatorMessage::Command { request, reply } => {
                    let response = match request {
                        IpcRequest::Status | IpcRequest::GetSetting { .. } => {
                            self.handle_request(request)
                        }
                        _ => IpcResponse::error("daemon is shutting down"),
                    };
                    if reply.send(response).is_err() {
                        debug!("command reply channel dropped during shutdown drain");
                    }
                }
                CoordinatorMessage::Subscribe { .. } => {
                    debug!("dropping subscription queued after shutdown");
                }
                CoordinatorMessage::Shutdown => {
                    debug!("dropping duplicate shutdown message");
                }
            }
        }
    }

    // === Message Handlers ===

    /// Applies one surface command and returns the response for its issuer.
    pub fn handle_request(&mut self, request: IpcRequest) -> IpcResponse {
        debug!("handling {}", request.name());

        match request {
            IpcRequest::Start => {
                let transition = self.engine.start(self.store.state());
                let message = if transition.changed {
                    "Timer started"
                } else {
                    "Timer already running"
                };
                self.respond(transition, message)
            }
            IpcRequest::Pause => {
                let transition = self.engine.pause(self.store.state());
                let message = if transition.changed {
                    "Timer paused"
                } else {
                    "Timer is not running"
                };
                self.respond(transition, message)
            }
            IpcRequest::Reset => {
                let transition = self.engine.reset(self.store.state());
                self.respond(transition, "Timer reset")
            }
            IpcRequest::SwitchMode {
                mode,
                duration_minutes,
            } => match self
                .engine
                .switch_mode(self.store.state(), mode, duration_minutes)
            {
                Ok(transition) => {
                    let message = format!("Switched to {} ({} min)", mode, duration_minutes);
                    self.respond(transition, message)
                }
                Err(e) => {
                    debug!("rejected switchMode: {}", e);
                    IpcResponse::error(e.to_string())
                }
            },
            IpcRequest::Status | IpcRequest::Subscribe => {
                IpcResponse::success("Current state", Some(self.store.state().clone()))
            }
            IpcRequest::GetSetting { key } => self.get_setting(key.as_deref()),
            IpcRequest::SetSetting { key, value } => self.set_setting(&key, value),
        }
    }

    /// Applies one alarm fire.
    ///
    /// Fires scheduled under an earlier arm generation were queued before a
    /// pause, reset or mode switch and are dropped without touching the state.
    pub fn handle_alarm(&mut self, fired: &AlarmFired) {
        if !self.scheduler.accepts(fired) {
            debug!(
                "ignoring stale alarm {} (generation {}, current {})",
                fired.name,
                fired.generation,
                self.scheduler.generation()
            );
            return;
        }
        let transition = self.engine.tick(self.store.state());
        self.apply(transition);
    }

    /// Snapshot of the current state and a receiver for later events, taken
    /// at the same point in the message order.
    pub fn subscribe(&self) -> Subscription {
        Subscription::new(self.store.state().clone(), self.publisher.subscribe())
    }

    fn respond(&mut self, transition: Transition, message: impl Into<String>) -> IpcResponse {
        let state = self.apply(transition);
        IpcResponse::success(message, Some(state))
    }

    fn apply(&mut self, transition: Transition) -> PomodoroState {
        self.scheduler.apply(transition.directive);

        if self.store.commit(transition.state) {
            self.publisher.publish_state(self.store.state());
        }

        if let Some(finished) = transition.completed {
            info!("{} completed, next up {}", finished, self.store.state().mode);
            dispatch(self.notifier.clone(), completion_content(finished));
        }

        self.store.state().clone()
    }

    fn get_setting(&self, key: Option<&str>) -> IpcResponse {
        let kv = self.store.kv();
        match key {
            Some(key) => match kv.get(key) {
                Ok(value) => IpcResponse::setting(value.unwrap_or(Value::Null)),
                Err(e) => IpcResponse::error(format!("failed to read {}: {}", key, e)),
            },
            None => match kv.snapshot() {
                Ok(mut all) => {
                    all.remove(STATE_KEY);
                    IpcResponse::setting(Value::Object(all))
                }
                Err(e) => IpcResponse::error(format!("failed to read settings: {}", e)),
            },
        }
    }

    fn set_setting(&mut self, key: &str, value: Value) -> IpcResponse {
        if !settings::is_writable(key) {
            return IpcResponse::error(format!("setting {:?} is not writable", key));
        }
        match self.store.kv().set(key, value) {
            Ok(()) => IpcResponse::success(format!("Saved {}", key), None),
            Err(e) => {
                warn!("Failed to save setting {}: {}", key, e);
                IpcResponse::error(format!("failed to save {}: {}", key, e))
            }
        }
    }

    fn relay_store_change(&self, change: StoreChange) {
        if change.key == STATE_KEY {
            return;
        }
        self.publisher.publish_setting(&change.key, change.value);
    }
}

async fn next_change(
    changes: &mut Option<broadcast::Receiver<StoreChange>>,
) -> Result<StoreChange, RecvError> {
    match changes {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

// ============================================================================
// Tests
// ============================================================================
