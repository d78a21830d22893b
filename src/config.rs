//! Configuration file loading.
//!
//! The configuration lives at `$XDG_CONFIG_HOME/timemap/config.toml`. Every
//! section and key is optional; a missing file means all defaults.
//!
//! ```toml
//! [pomodoro]
//! focus_minutes = 25
//! short_break_minutes = 5
//! long_break_minutes = 15
//!
//! [daemon]
//! socket_path = "~/.timemap/timemap.sock"
//! state_path = "~/.timemap/storage.json"
//! tick_interval_ms = 1000
//!
//! [notifications]
//! enabled = true
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::daemon::ipc::DEFAULT_SOCKET_PATH;
use crate::types::PomodoroConfig;

// ============================================================================
// Constants
// ============================================================================

/// Default storage file
pub const DEFAULT_STATE_PATH: &str = "~/.timemap/storage.json";

/// Environment variable overriding the socket path
pub const SOCKET_ENV_VAR: &str = "TIMEMAP_SOCK";

/// Smallest accepted tick interval
const MIN_TICK_INTERVAL_MS: u64 = 10;

// ============================================================================
// Config
// ============================================================================

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Timer durations
    #[serde(default)]
    pub pomodoro: PomodoroConfig,
    /// Daemon paths and tick period
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// Completion notifications
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

/// `[daemon]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Unix socket the daemon listens on
    #[serde(default)]
    pub socket_path: Option<PathBuf>,
    /// JSON storage file
    #[serde(default)]
    pub state_path: Option<PathBuf>,
    /// Milliseconds between decrements
    #[serde(default = "DaemonConfig::default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl DaemonConfig {
    fn default_tick_interval_ms() -> u64 {
        1000
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            state_path: None,
            tick_interval_ms: Self::default_tick_interval_ms(),
        }
    }
}

/// `[notifications]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationsConfig {
    /// Show a desktop notification when a phase completes
    #[serde(default = "NotificationsConfig::default_enabled")]
    pub enabled: bool,
}

impl NotificationsConfig {
    fn default_enabled() -> bool {
        true
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    /// Directory holding the configuration file.
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/etc"))
            .join("timemap")
    }

    /// Default configuration file path.
    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Loads the default configuration file, or defaults when it is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is unreadable or invalid.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable, not valid TOML, or fails
    /// validation.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let config: Self = toml::from_str(&contents).context("parsing config TOML")?;
        config
            .validate()
            .with_context(|| format!("invalid config {}", path.display()))?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        self.pomodoro.validate().map_err(anyhow::Error::msg)?;
        if self.daemon.tick_interval_ms < MIN_TICK_INTERVAL_MS {
            anyhow::bail!(
                "tick_interval_ms must be at least {}",
                MIN_TICK_INTERVAL_MS
            );
        }
        Ok(())
    }

    /// Socket path: `TIMEMAP_SOCK`, then the config file, then the default.
    pub fn socket_path(&self) -> PathBuf {
        if let Ok(path) = std::env::var(SOCKET_ENV_VAR) {
            if !path.is_empty() {
                return expand_tilde(Path::new(&path));
            }
        }
        match &self.daemon.socket_path {
            Some(path) => expand_tilde(path),
            None => expand_tilde(Path::new(DEFAULT_SOCKET_PATH)),
        }
    }

    /// Storage file path.
    pub fn state_path(&self) -> PathBuf {
        match &self.daemon.state_path {
            Some(path) => expand_tilde(path),
            None => expand_tilde(Path::new(DEFAULT_STATE_PATH)),
        }
    }

    /// Period between decrements.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.daemon.tick_interval_ms)
    }
}

/// Expands a leading `~` to the home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(contents: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.pomodoro, PomodoroConfig::default());
        assert_eq!(config.tick_interval(), Duration::from_secs(1));
        assert!(config.notifications.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_file_is_default() {
        let (_dir, path) = write_config("");
        assert_eq!(Config::load_from(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_partial_sections() {
        let (_dir, path) = write_config(
            r#"
[pomodoro]
focus_minutes = 50

[notifications]
enabled = false
"#,
        );
        let config = Config::load_from(&path).unwrap();

        assert_eq!(config.pomodoro.focus_minutes, 50);
        assert_eq!(config.pomodoro.short_break_minutes, 5);
        assert!(!config.notifications.enabled);
        assert_eq!(config.daemon.tick_interval_ms, 1000);
    }

    #[test]
    fn test_explicit_paths() {
        let (_dir, path) = write_config(
            r#"
[daemon]
socket_path = "/tmp/timemap-test.sock"
state_path = "/tmp/timemap-test.json"
"#,
        );
        let config = Config::load_from(&path).unwrap();

        assert_eq!(config.state_path(), PathBuf::from("/tmp/timemap-test.json"));
    }

    #[test]
    fn test_invalid_duration_rejected() {
        let (_dir, path) = write_config("[pomodoro]\nfocus_minutes = 0\n");
        let err = Config::load_from(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("focus_minutes"));
    }

    #[test]
    fn test_tick_interval_floor() {
        let (_dir, path) = write_config("[daemon]\ntick_interval_ms = 5\n");
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_invalid_toml_rejected() {
        let (_dir, path) = write_config("[pomodoro\n");
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn test_expand_tilde() {
        let expanded = expand_tilde(Path::new("~/.timemap/x.sock"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join(".timemap/x.sock"));
        }

        let absolute = expand_tilde(Path::new("/var/run/x.sock"));
        assert_eq!(absolute, PathBuf::from("/var/run/x.sock"));
    }
}
