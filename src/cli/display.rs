//! Display utilities for the TimeMap CLI.
//!
//! This module provides formatted output for:
//! - Command results
//! - Error messages
//! - Status display
//! - Settings dumps

use crate::types::{IpcResponse, PomodoroState};

// ============================================================================
// Display
// ============================================================================

/// Display utilities for CLI output.
pub struct Display;

impl Display {
    /// Shows the result of a timer command.
    pub fn show_command_result(response: &IpcResponse) {
        println!("{}", response.message);

        if let Some(state) = &response.data {
            println!("  {}", Self::state_line(state));
        }
    }

    /// Shows the current timer status.
    pub fn show_status(response: &IpcResponse) {
        println!("TimeMap Pomodoro");
        println!("─────────────────────────────");

        match &response.data {
            Some(state) => {
                println!("Mode:      {}", state.mode);
                println!(
                    "State:     {}",
                    if state.is_running { "running" } else { "stopped" }
                );
                println!("Remaining: {}", format_clock(state.time_left_seconds));
                println!("Duration:  {}", format_clock(state.duration_seconds));
            }
            None => println!("No timer state available"),
        }
    }

    /// Shows a settings value as pretty JSON.
    pub fn show_setting(value: &serde_json::Value) {
        match serde_json::to_string_pretty(value) {
            Ok(text) => println!("{}", text),
            Err(_) => println!("{}", value),
        }
    }

    /// Shows an error message.
    pub fn show_error(message: &str) {
        eprintln!("Error: {}", message);
    }

    /// One-line summary of a state, e.g. `Focus 24:59 (running)`.
    pub fn state_line(state: &PomodoroState) -> String {
        format!(
            "{} {} ({})",
            state.mode,
            format_clock(state.time_left_seconds),
            if state.is_running { "running" } else { "paused" }
        )
    }
}

/// Formats seconds as `MM:SS`. Minutes are not wrapped at one hour.
pub fn format_clock(total_seconds: u32) -> String {
    format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
}

/// Renders a fixed-width progress bar for the elapsed part of a session.
pub fn progress_bar(time_left: u32, duration: u32, width: usize) -> String {
    let filled = if duration == 0 {
        width
    } else {
        let elapsed = u64::from(duration.saturating_sub(time_left));
        (elapsed * width as u64 / u64::from(duration)) as usize
    };
    let filled = filled.min(width);
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}

// ============================================================================
// Tests
// ============================================================================
