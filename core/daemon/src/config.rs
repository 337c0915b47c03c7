//! Daemon runtime configuration (`~/.vault-presence/daemon.toml`).
//!
//! All keys are optional; a missing file means defaults.
//!
//! ```toml
//! client_id = "981203380192288788"
//! transport = "discord"   # or "offline"
//!
//! [refresh]
//! interval_secs = 15
//!
//! [connection]
//! max_retries = 3
//! retry_delay_ms = 5000
//! login_timeout_ms = 10000
//! ```
//!
//! Durations are clamped to sane bounds so a typo cannot stall the event loop
//! or overflow a deadline.

use presence_core::connection::{
    DEFAULT_LOGIN_TIMEOUT_SECS, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_SECS,
};
use presence_core::RetryPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CLIENT_ID: &str = "981203380192288788";
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 15;
const MAX_REFRESH_INTERVAL_SECS: u64 = 24 * 60 * 60;
const MAX_RETRY_DELAY_MS: u64 = 60 * 60 * 1000;
const MIN_LOGIN_TIMEOUT_MS: u64 = 100;
const MAX_LOGIN_TIMEOUT_MS: u64 = 10 * 60 * 1000;
const CONFIG_FILE_NAME: &str = "daemon.toml";
const TRANSPORT_ENV: &str = "VAULT_PRESENCE_TRANSPORT";

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Talk to the local Discord client over its IPC socket.
    Discord,
    /// Accept every update without a chat client (previewing templates).
    Offline,
}

impl TransportKind {
    fn from_env_value(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "discord" => Some(TransportKind::Discord),
            "offline" => Some(TransportKind::Offline),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub interval_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub login_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_SECS * 1000,
            login_timeout_ms: DEFAULT_LOGIN_TIMEOUT_SECS * 1000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub client_id: String,
    pub transport: TransportKind,
    pub refresh: RefreshConfig,
    pub connection: ConnectionConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.to_string(),
            transport: TransportKind::Discord,
            refresh: RefreshConfig::default(),
            connection: ConnectionConfig::default(),
        }
    }
}

impl DaemonConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh.interval_secs.clamp(1, MAX_REFRESH_INTERVAL_SECS))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.connection.max_retries.max(1),
            delay: Duration::from_millis(self.connection.retry_delay_ms.min(MAX_RETRY_DELAY_MS)),
            login_timeout: Duration::from_millis(
                self.connection
                    .login_timeout_ms
                    .clamp(MIN_LOGIN_TIMEOUT_MS, MAX_LOGIN_TIMEOUT_MS),
            ),
        }
    }

    /// `VAULT_PRESENCE_TRANSPORT` overrides the configured transport.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var(TRANSPORT_ENV) {
            match TransportKind::from_env_value(&value) {
                Some(kind) => self.transport = kind,
                None => tracing::warn!(value = %value, "Ignoring unknown transport override"),
            }
        }
    }
}

pub fn default_config_path() -> Result<PathBuf, String> {
    presence_core::get_presence_dir()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .ok_or_else(|| "Home directory not found".to_string())
}

pub fn load_config(path: &Path) -> Result<DaemonConfig, String> {
    if !path.exists() {
        return Ok(DaemonConfig::default());
    }

    let content = fs_err::read_to_string(path).map_err(|err| {
        format!(
            "Failed to read daemon config {}: {}",
            path.display(),
            err
        )
    })?;
    toml::from_str::<DaemonConfig>(&content).map_err(|err| {
        format!(
            "Failed to parse daemon config {}: {}",
            path.display(),
            err
        )
    })
}
