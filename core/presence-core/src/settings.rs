//! User-facing presence settings.
//!
//! Stored as a flat JSON object whose keys mirror the field names below in
//! camelCase. Every field has a hard-coded default, and missing keys in the
//! stored blob keep that default.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PresenceError, Result};

pub const DEFAULT_DETAILS: &str = "Vault: {{vault}}";
pub const DEFAULT_STATE: &str = "Editing: {{fileName}}";
pub const DEFAULT_LARGE_IMAGE: &str = "obsidian-logo";
pub const DEFAULT_LARGE_IMAGE_TOOLTIP: &str = "Obsidian - {{vault}}";
pub const DEFAULT_SMALL_IMAGE: &str = "file";
pub const DEFAULT_SMALL_IMAGE_TOOLTIP: &str = "{{fileExtension}}";
pub const DEFAULT_IDLE_TIMEOUT_MINUTES: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// First line of the presence.
    pub details: String,
    /// Second line of the presence.
    pub state: String,
    pub large_image: String,
    pub large_image_tooltip: String,
    pub small_image: String,
    pub small_image_tooltip: String,
    /// Show elapsed time since the daemon first reported presence.
    pub show_time: bool,
    /// Minutes without input before the presence switches to idle text.
    /// Zero disables idle detection.
    pub idle_timeout_minutes: u32,
    pub privacy_mode: bool,
    pub privacy_details: String,
    pub privacy_state: String,
    pub privacy_tooltip: String,
    pub idle_details: String,
    pub idle_state: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            details: DEFAULT_DETAILS.to_string(),
            state: DEFAULT_STATE.to_string(),
            large_image: DEFAULT_LARGE_IMAGE.to_string(),
            large_image_tooltip: DEFAULT_LARGE_IMAGE_TOOLTIP.to_string(),
            small_image: DEFAULT_SMALL_IMAGE.to_string(),
            small_image_tooltip: DEFAULT_SMALL_IMAGE_TOOLTIP.to_string(),
            show_time: true,
            idle_timeout_minutes: DEFAULT_IDLE_TIMEOUT_MINUTES,
            privacy_mode: false,
            privacy_details: "Taking notes".to_string(),
            privacy_state: "Privacy mode".to_string(),
            privacy_tooltip: "Obsidian".to_string(),
            idle_details: "Idle".to_string(),
            idle_state: "Away from the keyboard".to_string(),
        }
    }
}

impl Settings {
    /// Parses a stored blob, keeping defaults for every key it lacks.
    pub fn from_json(content: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Applies a partial update (`{"details": "..."}`) on top of the current
    /// values. Unknown keys and mistyped values are rejected and leave `self`
    /// untouched.
    pub fn apply_patch(&mut self, patch: &Value) -> Result<Vec<String>> {
        let patch = patch.as_object().ok_or_else(|| PresenceError::InvalidSetting {
            key: "<root>".to_string(),
            details: "settings patch must be a JSON object".to_string(),
        })?;

        let mut merged = serde_json::to_value(&*self).map_err(|source| PresenceError::Json {
            context: "serializing current settings".to_string(),
            source,
        })?;
        let fields = merged
            .as_object_mut()
            .ok_or_else(|| PresenceError::InvalidSetting {
                key: "<root>".to_string(),
                details: "settings did not serialize to an object".to_string(),
            })?;

        let mut changed = Vec::new();
        for (key, value) in patch {
            let slot = fields
                .get_mut(key)
                .ok_or_else(|| PresenceError::UnknownSetting(key.clone()))?;
            if slot != value {
                *slot = value.clone();
                changed.push(key.clone());
            }
        }

        let updated: Settings =
            serde_json::from_value(merged).map_err(|err| PresenceError::InvalidSetting {
                key: changed.join(","),
                details: err.to_string(),
            })?;
        *self = updated;
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_keys_keep_defaults() {
        let settings = Settings::from_json(r#"{"details": "Writing", "showTime": false}"#)
            .expect("parse settings");
        assert_eq!(settings.details, "Writing");
        assert!(!settings.show_time);
        assert_eq!(settings.state, DEFAULT_STATE);
        assert_eq!(settings.idle_timeout_minutes, DEFAULT_IDLE_TIMEOUT_MINUTES);
        assert!(!settings.privacy_mode);
    }

    #[test]
    fn unknown_stored_keys_are_ignored() {
        let settings = Settings::from_json(r#"{"showVaultName": true, "state": "Busy"}"#)
            .expect("parse settings");
        assert_eq!(settings.state, "Busy");
    }

    #[test]
    fn blob_uses_camel_case_keys() {
        let value = serde_json::to_value(Settings::default()).expect("serialize");
        assert!(value.get("largeImageTooltip").is_some());
        assert!(value.get("idleTimeoutMinutes").is_some());
        assert!(value.get("privacyMode").is_some());
    }

    #[test]
    fn apply_patch_updates_known_fields() {
        let mut settings = Settings::default();
        let changed = settings
            .apply_patch(&json!({"details": "Deep work", "idleTimeoutMinutes": 10}))
            .expect("patch");
        assert_eq!(settings.details, "Deep work");
        assert_eq!(settings.idle_timeout_minutes, 10);
        assert_eq!(changed.len(), 2);
    }

    #[test]
    fn apply_patch_rejects_unknown_key_without_mutation() {
        let mut settings = Settings::default();
        let err = settings
            .apply_patch(&json!({"details": "x", "bogus": 1}))
            .expect_err("unknown key");
        assert!(matches!(err, PresenceError::UnknownSetting(ref key) if key == "bogus"));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn apply_patch_rejects_wrong_type() {
        let mut settings = Settings::default();
        let err = settings
            .apply_patch(&json!({"showTime": "yes"}))
            .expect_err("wrong type");
        assert!(matches!(err, PresenceError::InvalidSetting { .. }));
        assert!(settings.show_time);
    }
}
