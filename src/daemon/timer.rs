//! Timer engine for the Pomodoro timer.
//!
//! The engine is a pure state machine over [`PomodoroState`]:
//! - Start/pause/reset/switch-mode transitions
//! - One-second tick decrement
//! - Completion handling with auto-advance to the next mode
//!
//! It owns no clock and no state. Every operation takes the current record
//! and returns a [`Transition`] telling the coordinator what the new record
//! is and whether the tick scheduler has to be armed or disarmed.

use thiserror::Error;
use tokio::time::Duration;

use crate::types::{PomodoroConfig, PomodoroState, TimerMode, MAX_DURATION_MINUTES};

// ============================================================================
// Constants
// ============================================================================

/// Nominal period between two decrements.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

// ============================================================================
// EngineError
// ============================================================================

/// Errors raised by invalid timer commands.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// switchMode was given a duration outside `1..=MAX_DURATION_MINUTES`
    #[error("invalid duration: {0} minutes (expected 1-{max})", max = MAX_DURATION_MINUTES)]
    InvalidDuration(u32),
}

// ============================================================================
// Transition
// ============================================================================

/// What the tick scheduler must do after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Arm (or keep armed) the recurring wake-up with this period
    Arm(Duration),
    /// Cancel the recurring wake-up
    Disarm,
    /// Leave the scheduler as it is
    Keep,
}

/// Result of applying one engine operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// State after the operation
    pub state: PomodoroState,
    /// Scheduler instruction
    pub directive: Directive,
    /// Mode that just ran to zero, if this transition completed a phase
    pub completed: Option<TimerMode>,
    /// Whether `state` differs from the input state
    pub changed: bool,
}

impl Transition {
    fn unchanged(state: &PomodoroState, directive: Directive) -> Self {
        Self {
            state: state.clone(),
            directive,
            completed: None,
            changed: false,
        }
    }

    fn to(before: &PomodoroState, after: PomodoroState, directive: Directive) -> Self {
        let changed = *before != after;
        Self {
            state: after,
            directive,
            completed: None,
            changed,
        }
    }
}

// ============================================================================
// TimerEngine
// ============================================================================

/// Pomodoro state machine.
#[derive(Debug, Clone)]
pub struct TimerEngine {
    /// Durations used when a completed phase auto-advances
    config: PomodoroConfig,
    /// Period requested when arming the scheduler
    tick_period: Duration,
}

impl Default for TimerEngine {
    fn default() -> Self {
        Self::new(PomodoroConfig::default())
    }
}

impl TimerEngine {
    /// Creates a new TimerEngine with the given configuration.
    pub fn new(config: PomodoroConfig) -> Self {
        Self {
            config,
            tick_period: TICK_PERIOD,
        }
    }

    /// Overrides the wake-up period (one decrement per wake-up).
    pub fn with_tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period;
        self
    }

    /// Returns the wake-up period requested on start.
    pub fn tick_period(&self) -> Duration {
        self.tick_period
    }

    /// Full-length duration of a mode under this configuration, in seconds.
    pub fn duration_for(&self, mode: TimerMode) -> u32 {
        self.config.minutes_for(mode) * 60
    }

    /// Starts or resumes the countdown.
    ///
    /// A finished timer restarts from its full duration.
    pub fn start(&self, state: &PomodoroState) -> Transition {
        if state.is_running {
            return Transition::unchanged(state, Directive::Keep);
        }

        let mut next = state.clone();
        next.is_running = true;
        if next.time_left_seconds == 0 {
            next.time_left_seconds = next.duration_seconds;
        }

        // A zero-length mode has nothing to count down.
        if next.time_left_seconds == 0 {
            next.is_running = false;
            return Transition::to(state, next, Directive::Disarm);
        }

        Transition::to(state, next, Directive::Arm(self.tick_period))
    }

    /// Pauses the countdown, keeping the remaining time.
    pub fn pause(&self, state: &PomodoroState) -> Transition {
        if !state.is_running {
            return Transition::unchanged(state, Directive::Keep);
        }

        let mut next = state.clone();
        next.is_running = false;
        Transition::to(state, next, Directive::Disarm)
    }

    /// Stops the timer and rewinds it to the full duration of its mode.
    pub fn reset(&self, state: &PomodoroState) -> Transition {
        let mut next = state.clone();
        next.is_running = false;
        next.time_left_seconds = next.duration_seconds;
        Transition::to(state, next, Directive::Disarm)
    }

    /// Selects `mode` with a new duration. Always stops the timer.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidDuration`] when `duration_minutes` is zero
    /// or larger than [`MAX_DURATION_MINUTES`]. The state is left untouched.
    pub fn switch_mode(
        &self,
        state: &PomodoroState,
        mode: TimerMode,
        duration_minutes: u32,
    ) -> Result<Transition, EngineError> {
        if duration_minutes == 0 || duration_minutes > MAX_DURATION_MINUTES {
            return Err(EngineError::InvalidDuration(duration_minutes));
        }

        let next = PomodoroState::idle(mode, duration_minutes * 60);
        Ok(Transition::to(state, next, Directive::Disarm))
    }

    /// Applies one scheduler wake-up.
    ///
    /// A wake-up reaching a stopped timer asks for the alarm to be cancelled.
    pub fn tick(&self, state: &PomodoroState) -> Transition {
        if !state.is_running || state.time_left_seconds == 0 {
            return Transition::unchanged(state, Directive::Disarm);
        }

        let mut next = state.clone();
        next.time_left_seconds -= 1;

        if next.time_left_seconds > 0 {
            return Transition::to(state, next, Directive::Keep);
        }

        let finished = state.mode;
        let upcoming = finished.next();
        let mut transition = Transition::to(
            state,
            PomodoroState::idle(upcoming, self.duration_for(upcoming)),
            Directive::Disarm,
        );
        transition.completed = Some(finished);
        transition
    }
}

// ============================================================================
// Tests
// ============================================================================
