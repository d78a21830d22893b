//! Core data types for the TimeMap Pomodoro timer.
//!
//! This module defines the data structures used for:
//! - The authoritative timer record shared by every surface
//! - Timer durations with validation
//! - IPC request/response and broadcast event serialization

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Default focus duration in minutes
pub const DEFAULT_FOCUS_MINUTES: u32 = 25;

/// Default short break duration in minutes
pub const DEFAULT_SHORT_BREAK_MINUTES: u32 = 5;

/// Default long break duration in minutes
pub const DEFAULT_LONG_BREAK_MINUTES: u32 = 15;

/// Upper bound accepted by `switchMode` (one day)
pub const MAX_DURATION_MINUTES: u32 = 24 * 60;

// ============================================================================
// TimerMode
// ============================================================================

/// The phase a Pomodoro timer is counting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimerMode {
    /// Focused work session
    #[serde(alias = "pomodoro")]
    Focus,
    /// Short break between focus sessions
    ShortBreak,
    /// Long break
    LongBreak,
}

impl TimerMode {
    /// Returns the wire representation of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerMode::Focus => "focus",
            TimerMode::ShortBreak => "shortBreak",
            TimerMode::LongBreak => "longBreak",
        }
    }

    /// Returns a human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            TimerMode::Focus => "Focus",
            TimerMode::ShortBreak => "Short Break",
            TimerMode::LongBreak => "Long Break",
        }
    }

    /// Mode entered automatically when this one completes.
    ///
    /// Focus always hands over to a short break; every break returns to focus.
    pub fn next(&self) -> TimerMode {
        match self {
            TimerMode::Focus => TimerMode::ShortBreak,
            TimerMode::ShortBreak | TimerMode::LongBreak => TimerMode::Focus,
        }
    }
}

impl Default for TimerMode {
    fn default() -> Self {
        TimerMode::Focus
    }
}

impl std::fmt::Display for TimerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// PomodoroConfig
// ============================================================================

/// Per-mode durations for the Pomodoro timer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PomodoroConfig {
    /// Focus duration in minutes (1-120)
    #[serde(default = "PomodoroConfig::default_focus_minutes")]
    pub focus_minutes: u32,
    /// Short break duration in minutes (1-60)
    #[serde(default = "PomodoroConfig::default_short_break_minutes")]
    pub short_break_minutes: u32,
    /// Long break duration in minutes (1-60)
    #[serde(default = "PomodoroConfig::default_long_break_minutes")]
    pub long_break_minutes: u32,
}

impl Default for PomodoroConfig {
    fn default() -> Self {
        Self {
            focus_minutes: DEFAULT_FOCUS_MINUTES,
            short_break_minutes: DEFAULT_SHORT_BREAK_MINUTES,
            long_break_minutes: DEFAULT_LONG_BREAK_MINUTES,
        }
    }
}

impl PomodoroConfig {
    fn default_focus_minutes() -> u32 {
        DEFAULT_FOCUS_MINUTES
    }

    fn default_short_break_minutes() -> u32 {
        DEFAULT_SHORT_BREAK_MINUTES
    }

    fn default_long_break_minutes() -> u32 {
        DEFAULT_LONG_BREAK_MINUTES
    }

    /// Creates a new configuration with the specified focus duration.
    pub fn with_focus_minutes(mut self, minutes: u32) -> Self {
        self.focus_minutes = minutes;
        self
    }

    /// Creates a new configuration with the specified short break duration.
    pub fn with_short_break_minutes(mut self, minutes: u32) -> Self {
        self.short_break_minutes = minutes;
        self
    }

    /// Creates a new configuration with the specified long break duration.
    pub fn with_long_break_minutes(mut self, minutes: u32) -> Self {
        self.long_break_minutes = minutes;
        self
    }

    /// Returns the configured duration for a mode, in minutes.
    pub fn minutes_for(&self, mode: TimerMode) -> u32 {
        match mode {
            TimerMode::Focus => self.focus_minutes,
            TimerMode::ShortBreak => self.short_break_minutes,
            TimerMode::LongBreak => self.long_break_minutes,
        }
    }

    /// Validates the configuration.
    ///
    /// Returns an error message if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if !(1..=120).contains(&self.focus_minutes) {
            return Err("focus_minutes must be between 1 and 120".to_string());
        }
        if !(1..=60).contains(&self.short_break_minutes) {
            return Err("short_break_minutes must be between 1 and 60".to_string());
        }
        if !(1..=60).contains(&self.long_break_minutes) {
            return Err("long_break_minutes must be between 1 and 60".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// PomodoroState
// ============================================================================

/// The single authoritative timer record.
///
/// Invariants: `time_left_seconds <= duration_seconds`, and the timer is
/// never running once `time_left_seconds` reaches zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PomodoroState {
    /// Current phase
    pub mode: TimerMode,
    /// Whether the countdown is actively decrementing
    pub is_running: bool,
    /// Configured length of the current mode
    pub duration_seconds: u32,
    /// Remaining countdown
    pub time_left_seconds: u32,
}

impl Default for PomodoroState {
    fn default() -> Self {
        Self::idle(TimerMode::Focus, DEFAULT_FOCUS_MINUTES * 60)
    }
}

impl PomodoroState {
    /// Creates a stopped state at the full duration of `mode`.
    pub fn idle(mode: TimerMode, duration_seconds: u32) -> Self {
        Self {
            mode,
            is_running: false,
            duration_seconds,
            time_left_seconds: duration_seconds,
        }
    }

    /// Returns true if both record invariants hold.
    pub fn is_consistent(&self) -> bool {
        self.time_left_seconds <= self.duration_seconds
            && !(self.is_running && self.time_left_seconds == 0)
    }

    /// Repairs a record read from outside the coordinator.
    pub fn normalized(mut self) -> Self {
        if self.time_left_seconds > self.duration_seconds {
            self.time_left_seconds = self.duration_seconds;
        }
        if self.time_left_seconds == 0 {
            self.is_running = false;
        }
        self
    }
}

// ============================================================================
// IPC Types
// ============================================================================

/// IPC request from a surface to the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum IpcRequest {
    /// Start or resume the countdown
    Start,
    /// Pause the countdown
    Pause,
    /// Stop and rewind to the full duration of the current mode
    Reset,
    /// Select another mode (always stops the timer)
    SwitchMode {
        /// Mode to select
        mode: TimerMode,
        /// Length of the new mode in minutes
        #[serde(rename = "durationMinutes")]
        duration_minutes: u32,
    },
    /// Query the current state without mutating it
    Status,
    /// Pull the current state, then keep receiving broadcasts
    Subscribe,
    /// Read one setting, or every setting when `key` is absent
    GetSetting {
        /// Setting key
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
    },
    /// Write one setting
    SetSetting {
        /// Setting key
        key: String,
        /// New JSON value
        value: serde_json::Value,
    },
}

impl IpcRequest {
    /// Returns the wire name of the command.
    pub fn name(&self) -> &'static str {
        match self {
            IpcRequest::Start => "start",
            IpcRequest::Pause => "pause",
            IpcRequest::Reset => "reset",
            IpcRequest::SwitchMode { .. } => "switchMode",
            IpcRequest::Status => "status",
            IpcRequest::Subscribe => "subscribe",
            IpcRequest::GetSetting { .. } => "getSetting",
            IpcRequest::SetSetting { .. } => "setSetting",
        }
    }
}

/// IPC response from the coordinator to a surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpcResponse {
    /// Response status ("success" or "error")
    pub status: String,
    /// Human-readable message
    pub message: String,
    /// Timer state after the command was applied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<PomodoroState>,
    /// Setting value for `getSetting`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setting: Option<serde_json::Value>,
}

impl IpcResponse {
    /// Creates a success response.
    pub fn success(message: impl Into<String>, data: Option<PomodoroState>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
            data,
            setting: None,
        }
    }

    /// Creates a success response carrying a setting value.
    pub fn setting(value: serde_json::Value) -> Self {
        Self {
            status: "success".to_string(),
            message: String::new(),
            data: None,
            setting: Some(value),
        }
    }

    /// Creates an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            data: None,
            setting: None,
        }
    }

    /// Returns true for a success response.
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Event pushed by the coordinator to every subscribed surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ServerEvent {
    /// The authoritative timer record changed
    StateChanged {
        /// New state
        #[serde(rename = "pomodoroState")]
        pomodoro_state: PomodoroState,
    },
    /// A non-timer setting was written
    SettingChanged {
        /// Setting key
        key: String,
        /// New JSON value
        value: serde_json::Value,
    },
}

/// Any line a surface may read from a subscription connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// Pushed broadcast
    Event(ServerEvent),
    /// Reply to a request sent on the same connection
    Response(IpcResponse),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // ------------------------------------------------------------------------
    // TimerMode Tests
    // ------------------------------------------------------------------------

    mod timer_mode_tests {
        use super::*;

        #[test]
        fn test_default_is_focus() {
            assert_eq!(TimerMode::default(), TimerMode::Focus);
        }

        #[test]
        fn test_as_str() {
            assert_eq!(TimerMode::Focus.as_str(), "focus");
            assert_eq!(TimerMode::ShortBreak.as_str(), "shortBreak");
            assert_eq!(TimerMode::LongBreak.as_str(), "longBreak");
        }

        #[test]
        fn test_next_mode() {
            assert_eq!(TimerMode::Focus.next(), TimerMode::ShortBreak);
            assert_eq!(TimerMode::ShortBreak.next(), TimerMode::Focus);
            assert_eq!(TimerMode::LongBreak.next(), TimerMode::Focus);
        }

        #[test]
        fn test_serialize_matches_as_str() {
            for mode in [TimerMode::Focus, TimerMode::ShortBreak, TimerMode::LongBreak] {
                let json = serde_json::to_string(&mode).unwrap();
                assert_eq!(json, format!("\"{}\"", mode.as_str()));
            }
        }

        #[test]
        fn test_deserialize_pomodoro_alias() {
            let mode: TimerMode = serde_json::from_str("\"pomodoro\"").unwrap();
            assert_eq!(mode, TimerMode::Focus);
        }
    }

    // ------------------------------------------------------------------------
    // PomodoroConfig Tests
    // ------------------------------------------------------------------------

    mod pomodoro_config_tests {
        use super::*;

        #[test]
        fn test_default_values() {
            let config = PomodoroConfig::default();
            assert_eq!(config.focus_minutes, 25);
            assert_eq!(config.short_break_minutes, 5);
            assert_eq!(config.long_break_minutes, 15);
        }

        #[test]
        fn test_builder_pattern() {
            let config = PomodoroConfig::default()
                .with_focus_minutes(50)
                .with_short_break_minutes(10)
                .with_long_break_minutes(30);

            assert_eq!(config.minutes_for(TimerMode::Focus), 50);
            assert_eq!(config.minutes_for(TimerMode::ShortBreak), 10);
            assert_eq!(config.minutes_for(TimerMode::LongBreak), 30);
        }

        #[test]
        fn test_validate_boundary_values() {
            let config = PomodoroConfig {
                focus_minutes: 1,
                short_break_minutes: 1,
                long_break_minutes: 1,
            };
            assert!(config.validate().is_ok());

            let config = PomodoroConfig {
                focus_minutes: 120,
                short_break_minutes: 60,
                long_break_minutes: 60,
            };
            assert!(config.validate().is_ok());
        }

        #[test]
        fn test_validate_out_of_range() {
            let config = PomodoroConfig::default().with_focus_minutes(0);
            assert!(config.validate().unwrap_err().contains("focus_minutes"));

            let config = PomodoroConfig::default().with_short_break_minutes(61);
            assert!(config.validate().unwrap_err().contains("short_break_minutes"));

            let config = PomodoroConfig::default().with_long_break_minutes(0);
            assert!(config.validate().unwrap_err().contains("long_break_minutes"));
        }

        #[test]
        fn test_missing_fields_use_defaults() {
            let config: PomodoroConfig = serde_json::from_str(r#"{"focus_minutes":40}"#).unwrap();
            assert_eq!(config.focus_minutes, 40);
            assert_eq!(config.short_break_minutes, 5);
            assert_eq!(config.long_break_minutes, 15);
        }
    }

    // ------------------------------------------------------------------------
    // PomodoroState Tests
    // ------------------------------------------------------------------------

    mod pomodoro_state_tests {
        use super::*;

        #[test]
        fn test_default_state() {
            let state = PomodoroState::default();
            assert_eq!(state.mode, TimerMode::Focus);
            assert!(!state.is_running);
            assert_eq!(state.duration_seconds, 1500);
            assert_eq!(state.time_left_seconds, 1500);
            assert!(state.is_consistent());
        }

        #[test]
        fn test_idle() {
            let state = PomodoroState::idle(TimerMode::LongBreak, 900);
            assert_eq!(state.mode, TimerMode::LongBreak);
            assert_eq!(state.time_left_seconds, 900);
            assert!(!state.is_running);
        }

        #[test]
        fn test_is_consistent_detects_violations() {
            let mut state = PomodoroState::default();
            state.time_left_seconds = 1501;
            assert!(!state.is_consistent());

            let mut state = PomodoroState::default();
            state.time_left_seconds = 0;
            state.is_running = true;
            assert!(!state.is_consistent());
        }

        #[test]
        fn test_normalized_clamps_time_left() {
            let state = PomodoroState {
                mode: TimerMode::Focus,
                is_running: true,
                duration_seconds: 300,
                time_left_seconds: 900,
            }
            .normalized();

            assert_eq!(state.time_left_seconds, 300);
            assert!(state.is_running);
            assert!(state.is_consistent());
        }

        #[test]
        fn test_normalized_stops_finished_timer() {
            let state = PomodoroState {
                mode: TimerMode::ShortBreak,
                is_running: true,
                duration_seconds: 300,
                time_left_seconds: 0,
            }
            .normalized();

            assert!(!state.is_running);
        }

        #[test]
        fn test_wire_format() {
            let json = serde_json::to_string(&PomodoroState::default()).unwrap();
            assert_eq!(
                json,
                r#"{"mode":"focus","isRunning":false,"durationSeconds":1500,"timeLeftSeconds":1500}"#
            );
        }
    }

    // ------------------------------------------------------------------------
    // IPC Types Tests
    // ------------------------------------------------------------------------

    mod ipc_tests {
        use super::*;

        #[test]
        fn test_simple_commands_serialize() {
            let cases = [
                (IpcRequest::Start, r#"{"command":"start"}"#),
                (IpcRequest::Pause, r#"{"command":"pause"}"#),
                (IpcRequest::Reset, r#"{"command":"reset"}"#),
                (IpcRequest::Status, r#"{"command":"status"}"#),
                (IpcRequest::Subscribe, r#"{"command":"subscribe"}"#),
            ];

            for (request, expected) in cases {
                assert_eq!(serde_json::to_string(&request).unwrap(), expected);
                assert_eq!(request.name(), expected[12..expected.len() - 2].to_string());
            }
        }

        #[test]
        fn test_switch_mode_deserialize() {
            let json = r#"{"command":"switchMode","mode":"shortBreak","durationMinutes":5}"#;
            let request: IpcRequest = serde_json::from_str(json).unwrap();

            assert_eq!(
                request,
                IpcRequest::SwitchMode {
                    mode: TimerMode::ShortBreak,
                    duration_minutes: 5
                }
            );
        }

        #[test]
        fn test_get_setting_without_key() {
            let request: IpcRequest = serde_json::from_str(r#"{"command":"getSetting"}"#).unwrap();
            assert_eq!(request, IpcRequest::GetSetting { key: None });
        }

        #[test]
        fn test_set_setting_roundtrip_value() {
            let json = r#"{"command":"setSetting","key":"theme","value":"dark"}"#;
            let request: IpcRequest = serde_json::from_str(json).unwrap();

            match request {
                IpcRequest::SetSetting { key, value } => {
                    assert_eq!(key, "theme");
                    assert_eq!(value, serde_json::json!("dark"));
                }
                _ => panic!("Expected SetSetting request"),
            }
        }

        #[test]
        fn test_unknown_command_rejected() {
            let result = serde_json::from_str::<IpcRequest>(r#"{"command":"explode"}"#);
            assert!(result.is_err());
        }

        #[test]
        fn test_ipc_response_success() {
            let response = IpcResponse::success("Timer started", Some(PomodoroState::default()));

            assert!(response.is_success());
            assert_eq!(response.message, "Timer started");
            assert_eq!(response.data, Some(PomodoroState::default()));
        }

        #[test]
        fn test_ipc_response_error_omits_data() {
            let response = IpcResponse::error("bad duration");
            let json = serde_json::to_string(&response).unwrap();

            assert!(!response.is_success());
            assert!(json.contains("\"status\":\"error\""));
            assert!(!json.contains("data"));
            assert!(!json.contains("setting"));
        }

        #[test]
        fn test_state_changed_event_format() {
            let event = ServerEvent::StateChanged {
                pomodoro_state: PomodoroState::default(),
            };
            let json = serde_json::to_string(&event).unwrap();

            assert!(json.starts_with(r#"{"event":"stateChanged","pomodoroState":"#));
        }

        #[test]
        fn test_server_message_distinguishes_event_and_response() {
            let event = r#"{"event":"settingChanged","key":"theme","value":"dark"}"#;
            let message: ServerMessage = serde_json::from_str(event).unwrap();
            assert!(matches!(message, ServerMessage::Event(ServerEvent::SettingChanged { .. })));

            let response = r#"{"status":"success","message":"ok"}"#;
            let message: ServerMessage = serde_json::from_str(response).unwrap();
            assert!(matches!(message, ServerMessage::Response(_)));
        }
    }
}
