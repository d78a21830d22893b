//! Notification delivery for completed timer phases.
//!
//! The coordinator only depends on the [`Notifier`] trait. Delivery is
//! fire-and-forget: [`dispatch`] runs the notifier on the blocking pool and
//! logs failures without reporting them back.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use timemap::notification::{dispatch, completion_content, LogNotifier};
//! use timemap::types::TimerMode;
//!
//! let notifier = Arc::new(LogNotifier);
//! dispatch(notifier, completion_content(TimerMode::Focus));
//! ```

mod content;
pub mod error;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use notify_rust::Notification;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use self::content::{completion_content, NotificationContent, NOTIFICATION_TITLE};
pub use self::error::NotificationError;

// ============================================================================
// Notifier
// ============================================================================

/// Delivers a user-visible notification.
pub trait Notifier: Send + Sync {
    /// Shows `message` under `title`.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification could not be delivered.
    fn notify(&self, title: &str, message: &str) -> Result<(), NotificationError>;
}

/// Delivers `content` on the blocking pool without waiting for it.
///
/// Failures are logged at warn and never escalated.
pub fn dispatch(notifier: Arc<dyn Notifier>, content: NotificationContent) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = tokio::task::spawn_blocking(move || {
            notifier.notify(&content.title, &content.message)
        })
        .await
        .map_err(|e| NotificationError::TaskAborted(e.to_string()))
        .and_then(|inner| inner);

        match result {
            Ok(()) => debug!("Notification delivered"),
            Err(e) => warn!("Notification failed: {} ({})", e, e.suggestion()),
        }
    })
}

// ============================================================================
// DesktopNotifier
// ============================================================================

/// Desktop notifications through the platform notification service.
#[derive(Debug, Clone, Default)]
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn notify(&self, title: &str, message: &str) -> Result<(), NotificationError> {
        Notification::new()
            .summary(title)
            .body(message)
            .appname("timemap")
            .show()
            .map_err(|e| NotificationError::SendFailed(e.to_string()))?;
        Ok(())
    }
}

// ============================================================================
// LogNotifier
// ============================================================================

/// Notifier that only writes to the log. Used when notifications are
/// disabled in the configuration.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, message: &str) -> Result<(), NotificationError> {
        info!("{}: {}", title, message);
        Ok(())
    }
}

// ============================================================================
// MockNotifier
// ============================================================================

/// Notifier that records every call. Can be told to fail.
#[derive(Debug, Default)]
pub struct MockNotifier {
    sent: Mutex<Vec<NotificationContent>>,
    should_fail: AtomicBool,
}

impl MockNotifier {
    /// Creates a recording notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent calls fail.
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    /// Returns every notification received so far, including failed ones.
    pub fn sent(&self) -> Vec<NotificationContent> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Notifier for MockNotifier {
    fn notify(&self, title: &str, message: &str) -> Result<(), NotificationError> {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(NotificationContent {
                title: title.to_string(),
                message: message.to_string(),
            });

        if self.should_fail.load(Ordering::SeqCst) {
            return Err(NotificationError::SendFailed("mock failure".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
