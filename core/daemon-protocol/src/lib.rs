//! IPC protocol types and validation for vault-presence-daemon.
//!
//! This crate is shared by the daemon and the hook so both sides agree on the
//! schema. The daemon remains the authority on validation, but the hook reuses
//! the same types to construct valid requests.
//!
//! Framing: one JSON request per connection, terminated by `\n`; the daemon
//! answers with one JSON response line.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_REQUEST_BYTES: usize = 1024 * 1024; // 1MB

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum Method {
    GetHealth,
    GetStatus,
    Event,
    Command,
    UpdateSettings,
    Shutdown,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    pub protocol_version: u32,
    pub method: Method,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(method: Method, id: Option<String>, params: Option<Value>) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            method,
            id,
            params,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl Response {
    pub fn ok(id: Option<String>, data: Value) -> Self {
        Self {
            ok: true,
            id,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(id: Option<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(ErrorInfo::new(code, message)),
        }
    }

    pub fn error_with_info(id: Option<String>, error: ErrorInfo) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(error),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Host events
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum EventType {
    /// The editor opened (or switched to) a vault.
    VaultOpen,
    /// A document became the active file.
    FileOpen,
    /// The active document was closed and nothing replaced it.
    FileClose,
    /// Any qualifying input (pointer move, key press).
    Activity,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EventEnvelope {
    pub event_id: String,
    pub recorded_at: String,
    pub event_type: EventType,
    #[serde(default)]
    pub vault: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    /// Creation time of the file in epoch millis.
    #[serde(default)]
    pub file_created: Option<i64>,
}

impl EventEnvelope {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        if self.event_id.trim().is_empty() {
            return Err(ErrorInfo::new("invalid_event_id", "event_id is required"));
        }
        if self.event_id.len() > 128 {
            return Err(ErrorInfo::new(
                "invalid_event_id",
                "event_id must be 128 characters or fewer",
            ));
        }

        if DateTime::parse_from_rfc3339(&self.recorded_at).is_err() {
            return Err(ErrorInfo::new(
                "invalid_timestamp",
                "recorded_at must be RFC3339",
            ));
        }

        match self.event_type {
            EventType::VaultOpen => require_string(&self.vault, "vault")?,
            EventType::FileOpen => require_string(&self.file_path, "file_path")?,
            EventType::FileClose | EventType::Activity => {}
        }

        if let Some(created) = self.file_created {
            if created < 0 {
                return Err(ErrorInfo::new(
                    "invalid_file_created",
                    "file_created must be a non-negative epoch millis value",
                ));
            }
        }

        Ok(())
    }
}

pub fn parse_event(params: Value) -> Result<EventEnvelope, ErrorInfo> {
    let envelope: EventEnvelope = serde_json::from_value(params).map_err(|err| {
        ErrorInfo::new(
            "invalid_params",
            format!("event payload is invalid JSON: {}", err),
        )
    })?;
    envelope.validate()?;
    Ok(envelope)
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// Reset the retry budget, tear down the session and connect again.
    Reconnect,
    /// Flip privacy mode and persist it.
    TogglePrivacy,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CommandParams {
    pub command: CommandKind,
}

pub fn parse_command(params: Value) -> Result<CommandKind, ErrorInfo> {
    serde_json::from_value::<CommandParams>(params)
        .map(|parsed| parsed.command)
        .map_err(|err| ErrorInfo::new("invalid_params", format!("invalid command: {}", err)))
}

/// Settings patches must be non-empty JSON objects; the daemon checks keys.
pub fn parse_settings_patch(params: Value) -> Result<Value, ErrorInfo> {
    match params.as_object() {
        Some(object) if !object.is_empty() => Ok(params),
        Some(_) => Err(ErrorInfo::new(
            "invalid_params",
            "settings patch must not be empty",
        )),
        None => Err(ErrorInfo::new(
            "invalid_params",
            "settings patch must be an object",
        )),
    }
}

fn require_string(value: &Option<String>, field: &str) -> Result<(), ErrorInfo> {
    if let Some(candidate) = value {
        if !candidate.trim().is_empty() {
            return Ok(());
        }
    }
    Err(ErrorInfo::new(
        "missing_field",
        format!("{} is required", field),
    ))
}
