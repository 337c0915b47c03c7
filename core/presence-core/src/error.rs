//! Error types for presence-core operations.

use std::path::PathBuf;

/// All errors that can occur in presence-core operations.
#[derive(Debug, thiserror::Error)]
pub enum PresenceError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Settings file malformed: {path}: {details}")]
    SettingsMalformed { path: PathBuf, details: String },

    #[error("Unknown setting: {0}")]
    UnknownSetting(String),

    #[error("Invalid value for setting {key}: {details}")]
    InvalidSetting { key: String, details: String },

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience type alias for Results using PresenceError.
pub type Result<T> = std::result::Result<T, PresenceError>;

impl From<PresenceError> for String {
    fn from(err: PresenceError) -> String {
        err.to_string()
    }
}
