//! TimeMap Library
//!
//! A Pomodoro timer owned by one background coordinator and mirrored by any
//! number of surfaces. It includes:
//! - Pure timer engine and recurring tick scheduler
//! - Key-value persistence with settings migration
//! - Coordinator actor with command relay and state broadcast
//! - IPC server/client speaking newline-delimited JSON over a Unix socket
//! - CLI command parsing, display utilities and a live local mirror
//! - Desktop completion notifications
//! - TOML configuration

pub mod cli;
pub mod config;
pub mod daemon;
pub mod notification;
pub mod types;

// Re-export commonly used types for convenience
pub use config::Config;
pub use types::{
    IpcRequest, IpcResponse, PomodoroConfig, PomodoroState, ServerEvent, ServerMessage, TimerMode,
};

pub use daemon::{
    Coordinator, CoordinatorHandle, KeyValueStore, TickScheduler, TimerEngine, TimerStateStore,
};

pub use notification::{
    DesktopNotifier, LogNotifier, MockNotifier, NotificationContent, NotificationError, Notifier,
};

pub use cli::{LocalMirror, MirrorView};
