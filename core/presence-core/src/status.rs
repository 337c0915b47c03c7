//! User-visible connection indicator and transient notices.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

pub const STATUS_STARTING: &str = "Discord presence starting";
pub const STATUS_CONNECTING: &str = "Connecting to Discord...";
pub const STATUS_CONNECTED: &str = "Connected to Discord";
pub const STATUS_CONNECT_FAILED: &str = "Could not connect to Discord";
pub const STATUS_DISCONNECTED: &str = "Disconnected from Discord";
pub const STATUS_GAVE_UP: &str = "Discord unavailable, run reconnect to retry";
pub const STATUS_SEND_FAILED: &str = "Failed to update Discord presence";

pub const MAX_NOTICES: usize = 20;

/// A requested change to the status line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub text: String,
    pub connected: bool,
}

impl StatusUpdate {
    pub fn connected(text: &str) -> Self {
        Self {
            text: text.to_string(),
            connected: true,
        }
    }

    pub fn disconnected(text: &str) -> Self {
        Self {
            text: text.to_string(),
            connected: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusLine {
    pub text: String,
    pub connected: bool,
    pub updated_at: DateTime<Utc>,
}

/// Transient user notification, kept briefly for clients that poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub status: StatusLine,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Clone)]
pub struct StatusReporter {
    current: StatusLine,
    notices: VecDeque<Notice>,
}

impl StatusReporter {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            current: StatusLine {
                text: STATUS_STARTING.to_string(),
                connected: false,
                updated_at: now,
            },
            notices: VecDeque::new(),
        }
    }

    /// Applies an update. Returns false when the line already shows it.
    pub fn apply(&mut self, update: StatusUpdate, now: DateTime<Utc>) -> bool {
        if self.current.text == update.text && self.current.connected == update.connected {
            return false;
        }
        self.current = StatusLine {
            text: update.text,
            connected: update.connected,
            updated_at: now,
        };
        true
    }

    pub fn push_notice(&mut self, message: impl Into<String>, now: DateTime<Utc>) {
        if self.notices.len() == MAX_NOTICES {
            self.notices.pop_front();
        }
        self.notices.push_back(Notice {
            message: message.into(),
            recorded_at: now,
        });
    }

    pub fn current(&self) -> &StatusLine {
        &self.current
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            status: self.current.clone(),
            notices: self.notices.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_reports_changes_only() {
        let now = Utc::now();
        let mut reporter = StatusReporter::new(now);
        assert!(reporter.apply(StatusUpdate::connected(STATUS_CONNECTED), now));
        assert!(!reporter.apply(StatusUpdate::connected(STATUS_CONNECTED), now));
        assert!(reporter.current().connected);

        assert!(reporter.apply(StatusUpdate::disconnected(STATUS_DISCONNECTED), now));
        assert_eq!(reporter.current().text, STATUS_DISCONNECTED);
        assert!(!reporter.current().connected);
    }

    #[test]
    fn notices_are_bounded() {
        let now = Utc::now();
        let mut reporter = StatusReporter::new(now);
        for index in 0..(MAX_NOTICES + 5) {
            reporter.push_notice(format!("notice {}", index), now);
        }
        let snapshot = reporter.snapshot();
        assert_eq!(snapshot.notices.len(), MAX_NOTICES);
        assert_eq!(snapshot.notices[0].message, "notice 5");
    }
}
