//! CLI module for TimeMap.
//!
//! This module provides the command-line surfaces:
//! - `commands`: Command definitions using clap derive
//! - `client`: IPC client for daemon communication
//! - `display`: Output formatting and display logic
//! - `mirror`: Local countdown for live surfaces

pub mod client;
pub mod commands;
pub mod display;
pub mod mirror;

pub use client::{IpcClient, SubscriptionStream};
pub use commands::{parse_setting_value, Cli, Commands, ModeArg, ModeArgs, SettingsCommand};
pub use display::Display;
pub use mirror::{run_surface, LocalMirror, MirrorView, TerminalView};
