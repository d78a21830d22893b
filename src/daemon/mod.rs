//! Daemon module for TimeMap.
//!
//! This module contains the background coordinator and its plumbing:
//! - `timer`: Pure Pomodoro state machine
//! - `scheduler`: Recurring wake-ups driving the countdown
//! - `store`: Key-value persistence and the authoritative timer record
//! - `settings`: Default settings and version migration
//! - `coordinator`: Single-writer actor owning the timer state
//! - `replication`: Command relay and event broadcast to surfaces
//! - `ipc`: Unix socket server speaking newline-delimited JSON

pub mod coordinator;
pub mod ipc;
pub mod replication;
pub mod scheduler;
pub mod settings;
pub mod store;
pub mod timer;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::info;

pub use coordinator::{Coordinator, CoordinatorMessage};
pub use ipc::IpcServer;
pub use replication::{mailbox, CoordinatorHandle, Publisher, Subscription};
pub use scheduler::{AlarmBackend, AlarmFired, ManualAlarms, TickScheduler, TokioAlarms};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore, StoreError, TimerStateStore};
pub use timer::{Directive, EngineError, TimerEngine, Transition};

use crate::config::Config;
use crate::notification::{DesktopNotifier, LogNotifier, Notifier};

/// Runs the daemon on `socket_path` until SIGINT or SIGTERM.
///
/// # Errors
///
/// Returns an error if the storage file is unreadable or the socket cannot
/// be bound.
pub async fn run(config: &Config, socket_path: &Path) -> Result<()> {
    let state_path = config.state_path();
    let kv: Arc<dyn KeyValueStore> = Arc::new(
        JsonFileStore::open(&state_path)
            .with_context(|| format!("Failed to open storage {}", state_path.display()))?,
    );

    let notifier: Arc<dyn Notifier> = if config.notifications.enabled {
        Arc::new(DesktopNotifier)
    } else {
        Arc::new(LogNotifier)
    };

    let (alarm_tx, alarm_rx) = mpsc::unbounded_channel();
    let engine = TimerEngine::new(config.pomodoro.clone()).with_tick_period(config.tick_interval());
    let coordinator = Coordinator::new(
        kv,
        engine,
        TickScheduler::new(TokioAlarms::new(alarm_tx)),
        notifier,
    );

    let server = IpcServer::new(socket_path)?;
    let (handle, rx) = mailbox();
    let coordinator_task = tokio::spawn(coordinator.run(rx, alarm_rx));

    info!("TimeMap daemon {} started", env!("CARGO_PKG_VERSION"));

    tokio::select! {
        _ = server.serve(handle.clone()) => {}
        result = shutdown_signal() => {
            result?;
            info!("Shutdown signal received");
        }
    }

    handle.shutdown().await;
    coordinator_task
        .await
        .context("Coordinator task failed")?;
    drop(server);

    info!("TimeMap daemon stopped");
    Ok(())
}

async fn shutdown_signal() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate =
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("Failed to listen for SIGINT"),
        _ = terminate.recv() => Ok(()),
    }
}
