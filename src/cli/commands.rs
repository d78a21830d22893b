//! Command definitions for the TimeMap CLI.
//!
//! Uses clap derive macro for argument parsing.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::types::{TimerMode, MAX_DURATION_MINUTES};

// ============================================================================
// CLI Structure
// ============================================================================

/// TimeMap - Pomodoro timer shared by every terminal you open
#[derive(Parser, Debug)]
#[command(
    name = "timemap",
    version,
    about = "Pomodoro timer daemon with synchronized terminal surfaces",
    long_about = "A background daemon owns one Pomodoro timer. Every command and every \
                  `timemap watch` window talks to it over a Unix socket and shows the same \
                  countdown.",
    propagate_version = true
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to the configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Path to the daemon socket (overrides the configuration)
    #[arg(long, global = true, value_name = "PATH")]
    pub socket: Option<PathBuf>,

    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

// ============================================================================
// Subcommands
// ============================================================================

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the background coordinator
    Daemon,

    /// Start or resume the countdown
    Start,

    /// Pause the countdown
    Pause,

    /// Stop and rewind to the full duration of the current mode
    Reset,

    /// Switch to another mode (stops the timer)
    Mode(ModeArgs),

    /// Show the current timer state
    Status,

    /// Keep a live countdown on screen
    Watch,

    /// Read or write stored settings
    #[command(subcommand)]
    Settings(SettingsCommand),

    /// Generate shell completion scripts
    Completions {
        /// Shell type for completion script
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

/// `settings` subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum SettingsCommand {
    /// Print one setting, or all of them
    Get {
        /// Setting key
        key: Option<String>,
    },
    /// Write one setting
    Set {
        /// Setting key
        key: String,
        /// JSON value (bare words are stored as strings)
        value: String,
    },
}

// ============================================================================
// Mode Command Arguments
// ============================================================================

/// Mode names accepted on the command line
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    /// Focus session
    Focus,
    /// Short break
    ShortBreak,
    /// Long break
    LongBreak,
}

impl From<ModeArg> for TimerMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Focus => TimerMode::Focus,
            ModeArg::ShortBreak => TimerMode::ShortBreak,
            ModeArg::LongBreak => TimerMode::LongBreak,
        }
    }
}

/// Arguments for the mode command
#[derive(Args, Debug, Clone)]
pub struct ModeArgs {
    /// Mode to switch to
    #[arg(value_enum)]
    pub mode: ModeArg,

    /// Duration in minutes (defaults to the configured duration of the mode)
    #[arg(
        short,
        long,
        value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_DURATION_MINUTES))
    )]
    pub minutes: Option<u32>,
}

// ============================================================================
// Value Parsing
// ============================================================================

/// Parses a settings value: JSON when it parses, otherwise a plain string.
pub fn parse_setting_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

// ============================================================================
// Tests
// ============================================================================
