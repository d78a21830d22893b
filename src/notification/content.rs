//! Notification content construction.

use crate::types::TimerMode;

/// Title used for every timer notification.
pub const NOTIFICATION_TITLE: &str = "TimeMap";

/// A title/message pair handed to a notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationContent {
    /// Notification title
    pub title: String,
    /// Notification body
    pub message: String,
}

/// Creates content announcing that `finished` ran to zero.
#[must_use]
pub fn completion_content(finished: TimerMode) -> NotificationContent {
    let message = match finished {
        TimerMode::Focus => "Focus session complete! Time for a short break.",
        TimerMode::ShortBreak => "Short break is over. Ready to focus?",
        TimerMode::LongBreak => "Long break is over. Ready to focus?",
    };
    NotificationContent {
        title: NOTIFICATION_TITLE.to_string(),
        message: message.to_string(),
    }
}
