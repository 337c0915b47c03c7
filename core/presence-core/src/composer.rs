//! Builds the outbound presence payload.
//!
//! `build_presence` is pure: given the same settings, tracker, context,
//! previous payload and clock it always produces the same payload. Sending is
//! the caller's job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::activity::ActivityTracker;
use crate::context::PresenceContext;
use crate::settings::Settings;
use crate::template::expand;

pub const FALLBACK_DETAILS: &str = "In a Vault";
pub const FALLBACK_STATE_BROWSING: &str = "Browsing files";
pub const FALLBACK_STATE_EDITING: &str = "Editing a file";

/// One presence update as handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresencePayload {
    pub details: String,
    pub state: String,
    pub large_image_key: String,
    pub large_image_text: Option<String>,
    pub small_image_key: Option<String>,
    pub small_image_text: Option<String>,
    /// Epoch seconds the elapsed-time counter starts from.
    pub start_timestamp: Option<i64>,
}

/// Which text source a payload is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceMode {
    /// Templates expanded against the host context.
    Normal,
    /// No recent input; fixed idle strings.
    Idle,
    /// Privacy mode enabled; fixed privacy strings.
    Private,
}

impl PresenceMode {
    /// Idle and private payloads never carry file data.
    pub fn hides_context(&self) -> bool {
        !matches!(self, PresenceMode::Normal)
    }
}

pub fn presence_mode(
    settings: &Settings,
    tracker: &ActivityTracker,
    now: DateTime<Utc>,
) -> PresenceMode {
    if settings.privacy_mode {
        PresenceMode::Private
    } else if tracker.is_idle(settings.idle_timeout_minutes, now) {
        PresenceMode::Idle
    } else {
        PresenceMode::Normal
    }
}

pub fn build_presence(
    settings: &Settings,
    tracker: &ActivityTracker,
    context: &PresenceContext,
    previous: Option<&PresencePayload>,
    now: DateTime<Utc>,
) -> PresencePayload {
    let start_timestamp = if settings.show_time {
        Some(
            previous
                .and_then(|payload| payload.start_timestamp)
                .unwrap_or_else(|| now.timestamp()),
        )
    } else {
        None
    };

    match presence_mode(settings, tracker, now) {
        PresenceMode::Private => PresencePayload {
            details: settings.privacy_details.clone(),
            state: settings.privacy_state.clone(),
            large_image_key: settings.large_image.clone(),
            large_image_text: non_empty(settings.privacy_tooltip.clone()),
            small_image_key: None,
            small_image_text: None,
            start_timestamp,
        },
        PresenceMode::Idle => PresencePayload {
            details: settings.idle_details.clone(),
            state: settings.idle_state.clone(),
            large_image_key: settings.large_image.clone(),
            large_image_text: non_empty(settings.privacy_tooltip.clone()),
            small_image_key: None,
            small_image_text: None,
            start_timestamp,
        },
        PresenceMode::Normal => {
            let details = non_empty(expand(&settings.details, context))
                .unwrap_or_else(|| FALLBACK_DETAILS.to_string());
            let state = non_empty(expand(&settings.state, context)).unwrap_or_else(|| {
                if context.has_file() {
                    FALLBACK_STATE_EDITING.to_string()
                } else {
                    FALLBACK_STATE_BROWSING.to_string()
                }
            });

            PresencePayload {
                details,
                state,
                large_image_key: settings.large_image.clone(),
                large_image_text: non_empty(expand(&settings.large_image_tooltip, context)),
                small_image_key: non_empty(settings.small_image.clone()),
                small_image_text: non_empty(expand(&settings.small_image_tooltip, context)),
                start_timestamp,
            }
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
