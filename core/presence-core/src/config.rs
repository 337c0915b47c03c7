//! Paths and persistence for vault-presence.
//!
//! Everything lives under `~/.vault-presence`:
//! - `settings.json`: user settings blob
//! - `status.json`: last status line, for external status bars
//! - `daemon.sock`: hook to daemon socket
//! - `logs/`: hook log files

use fs_err as fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{PresenceError, Result};
use crate::settings::Settings;

pub const PRESENCE_DIR_NAME: &str = ".vault-presence";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const STATUS_FILE_NAME: &str = "status.json";
pub const SOCKET_NAME: &str = "daemon.sock";
pub const SOCKET_ENV: &str = "VAULT_PRESENCE_SOCKET";

/// Returns the path to the presence directory (~/.vault-presence).
pub fn get_presence_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(PRESENCE_DIR_NAME))
}

pub fn get_settings_path() -> Option<PathBuf> {
    get_presence_dir().map(|d| d.join(SETTINGS_FILE_NAME))
}

pub fn get_status_path() -> Option<PathBuf> {
    get_presence_dir().map(|d| d.join(STATUS_FILE_NAME))
}

pub fn get_socket_path() -> Option<PathBuf> {
    get_presence_dir().map(|d| d.join(SOCKET_NAME))
}

/// Socket path shared by the daemon and the hook, honouring
/// `VAULT_PRESENCE_SOCKET` when set.
pub fn resolve_socket_path() -> Option<PathBuf> {
    match std::env::var_os(SOCKET_ENV) {
        Some(value) if !value.is_empty() => Some(PathBuf::from(value)),
        _ => get_socket_path(),
    }
}

/// Loads settings from `path`, merging stored values over defaults.
/// A missing file yields defaults; an unreadable or malformed one is an error.
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Settings::default()),
        Err(source) => {
            return Err(PresenceError::Io {
                context: "reading settings".to_string(),
                source,
            })
        }
    };

    if content.trim().is_empty() {
        return Ok(Settings::default());
    }

    Settings::from_json(&content).map_err(|err| PresenceError::SettingsMalformed {
        path: path.to_path_buf(),
        details: err.to_string(),
    })
}

/// Loads settings from the default location, falling back to defaults (with a
/// warning) when they cannot be read.
pub fn load_settings() -> Settings {
    let path = match get_settings_path() {
        Some(path) => path,
        None => {
            warn!("Home directory not found; using default settings");
            return Settings::default();
        }
    };

    load_settings_from(&path).unwrap_or_else(|err| {
        warn!(error = %err, "Failed to load settings; using defaults");
        Settings::default()
    })
}

/// Writes settings atomically (temp file + rename).
pub fn save_settings_to(path: &Path, settings: &Settings) -> Result<()> {
    let payload = serde_json::to_vec_pretty(settings).map_err(|source| PresenceError::Json {
        context: "serializing settings".to_string(),
        source,
    })?;
    write_atomic(path, &payload)
}

pub(crate) fn write_atomic(path: &Path, payload: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| PresenceError::Io {
            context: "creating settings directory".to_string(),
            source,
        })?;
    }

    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, payload).map_err(|source| PresenceError::Io {
        context: "writing temporary file".to_string(),
        source,
    })?;
    fs::rename(&tmp_path, path).map_err(|source| PresenceError::Io {
        context: "committing file".to_string(),
        source,
    })
}

/// Persists any serializable snapshot (the status line) atomically.
pub fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let payload = serde_json::to_vec_pretty(value).map_err(|source| PresenceError::Json {
        context: "serializing snapshot".to_string(),
        source,
    })?;
    write_atomic(path, &payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_settings_file_yields_defaults() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let settings =
            load_settings_from(&temp_dir.path().join("settings.json")).expect("load settings");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn partial_settings_merge_over_defaults() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("settings.json");
        fs::write(&path, r#"{"privacyMode": true, "idleTimeoutMinutes": 15}"#).expect("write");

        let settings = load_settings_from(&path).expect("load settings");
        assert!(settings.privacy_mode);
        assert_eq!(settings.idle_timeout_minutes, 15);
        assert_eq!(settings.details, Settings::default().details);
    }

    #[test]
    fn malformed_settings_are_reported() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("settings.json");
        fs::write(&path, "{not json").expect("write");

        let err = load_settings_from(&path).expect_err("malformed");
        assert!(matches!(err, PresenceError::SettingsMalformed { .. }));
    }

    #[test]
    fn save_then_load_preserves_changes() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("nested").join("settings.json");
        let settings = Settings {
            details: "Drafting".to_string(),
            privacy_mode: true,
            ..Settings::default()
        };

        save_settings_to(&path, &settings).expect("save");
        assert!(!path.with_extension("tmp").exists());
        assert_eq!(load_settings_from(&path).expect("load"), settings);
    }
}
