//! Notification error types.

use thiserror::Error;

/// Errors that can occur while delivering a notification.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// The desktop notification service rejected or failed the request.
    #[error("failed to send notification: {0}")]
    SendFailed(String),

    /// The notification task panicked or was cancelled.
    #[error("notification task aborted: {0}")]
    TaskAborted(String),
}

impl NotificationError {
    /// Returns a user-facing hint for resolving this error.
    #[must_use]
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::SendFailed(_) => "check that a notification daemon is running",
            Self::TaskAborted(_) => "restart the daemon",
        }
    }
}
