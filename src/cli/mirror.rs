//! Display-only countdown shared by every live surface.
//!
//! A surface never owns the timer. It keeps the last authoritative
//! [`PomodoroState`] it received and extrapolates the remaining time locally
//! so the display keeps moving between broadcasts. Every authoritative update
//! replaces the local guess.

use std::io::Write;

use anyhow::Result;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tracing::debug;

use super::client::SubscriptionStream;
use super::display::{format_clock, progress_bar};
use crate::types::{PomodoroState, ServerEvent, ServerMessage};

// ============================================================================
// LocalMirror
// ============================================================================

/// Local extrapolation of the authoritative timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalMirror {
    authoritative: PomodoroState,
    display_left: u32,
}

impl LocalMirror {
    /// Starts mirroring `state`.
    pub fn new(state: PomodoroState) -> Self {
        let display_left = state.time_left_seconds;
        Self {
            authoritative: state,
            display_left,
        }
    }

    /// Replaces the local guess with an authoritative state.
    pub fn resync(&mut self, state: PomodoroState) {
        self.display_left = state.time_left_seconds;
        self.authoritative = state;
    }

    /// Advances the local countdown by one period.
    ///
    /// Returns true if the displayed time changed. Stops at zero and waits
    /// for the coordinator to announce the next mode.
    pub fn tick_local(&mut self) -> bool {
        if !self.is_counting() {
            return false;
        }
        self.display_left -= 1;
        true
    }

    /// Returns true while the local countdown should keep moving.
    pub fn is_counting(&self) -> bool {
        self.authoritative.is_running && self.display_left > 0
    }

    /// Seconds currently shown.
    pub fn display_seconds(&self) -> u32 {
        self.display_left
    }

    /// Last authoritative state received.
    pub fn authoritative(&self) -> &PomodoroState {
        &self.authoritative
    }

    /// The state to render: authoritative with the extrapolated time.
    pub fn view_state(&self) -> PomodoroState {
        PomodoroState {
            time_left_seconds: self.display_left,
            ..self.authoritative.clone()
        }
    }
}

// ============================================================================
// MirrorView
// ============================================================================

/// How a surface shows the mirrored timer.
pub trait MirrorView {
    /// Draws the current view state.
    fn render(&mut self, state: &PomodoroState);

    /// Called when another surface changed a setting.
    fn setting_changed(&mut self, _key: &str, _value: &serde_json::Value) {}
}

/// Single-line terminal view redrawn in place.
pub struct TerminalView<W: Write> {
    out: W,
}

impl<W: Write> TerminalView<W> {
    /// Creates a view writing to `out`.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Formats one frame.
    pub fn frame(state: &PomodoroState) -> String {
        format!(
            "{:<12} {} {} {}",
            state.mode.label(),
            format_clock(state.time_left_seconds),
            progress_bar(state.time_left_seconds, state.duration_seconds, 20),
            if state.is_running { "running" } else { "paused" }
        )
    }
}

impl<W: Write> MirrorView for TerminalView<W> {
    fn render(&mut self, state: &PomodoroState) {
        let frame = Self::frame(state);
        if write!(self.out, "\r\x1b[2K{}", frame)
            .and_then(|()| self.out.flush())
            .is_err()
        {
            debug!("terminal write failed");
        }
    }

    fn setting_changed(&mut self, key: &str, value: &serde_json::Value) {
        debug!("setting {} changed to {}", key, value);
    }
}

// ============================================================================
// Surface Loop
// ============================================================================

/// Runs a live surface until the daemon closes the subscription.
///
/// The local countdown advances once per `period` while the mirrored timer
/// runs, and realigns to every authoritative update.
///
/// # Errors
///
/// Returns an error if the subscription connection fails.
pub async fn run_surface<V: MirrorView>(
    mut stream: SubscriptionStream,
    view: &mut V,
    period: Duration,
) -> Result<()> {
    let mut mirror = LocalMirror::new(stream.state.clone());
    view.render(&mirror.view_state());

    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            message = stream.next_message() => match message? {
                Some(ServerMessage::Event(ServerEvent::StateChanged { pomodoro_state })) => {
                    mirror.resync(pomodoro_state);
                    ticker.reset();
                    view.render(&mirror.view_state());
                }
                Some(ServerMessage::Event(ServerEvent::SettingChanged { key, value })) => {
                    view.setting_changed(&key, &value);
                }
                Some(ServerMessage::Response(response)) => {
                    debug!("response on subscription: {}", response.message);
                }
                None => {
                    debug!("daemon closed the subscription");
                    return Ok(());
                }
            },
            _ = ticker.tick(), if mirror.is_counting() => {
                if mirror.tick_local() {
                    view.render(&mirror.view_state());
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
