//! Presence transports.
//!
//! The wire protocol belongs to the chat client's IPC library; this module only
//! adapts it to three blocking operations. Each transport is owned by exactly
//! one session worker thread, so implementations need `Send` but not `Sync`.

use discord_rich_presence::{activity, DiscordIpc, DiscordIpcClient};
use presence_core::PresencePayload;
use std::error::Error;
use std::io::ErrorKind;
use tracing::debug;

use crate::config::{DaemonConfig, TransportKind};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Discord client unavailable: {0}")]
    Unavailable(String),

    #[error("Discord session closed: {0}")]
    Disconnected(String),

    #[error("Discord rejected the request: {0}")]
    Rejected(String),
}

impl TransportError {
    /// Whether the session behind this error is gone.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, TransportError::Disconnected(_))
    }
}

pub trait PresenceTransport: Send {
    fn login(&mut self) -> Result<(), TransportError>;
    fn set_activity(&mut self, payload: &PresencePayload) -> Result<(), TransportError>;
    fn destroy(&mut self) -> Result<(), TransportError>;
}

/// Builds a fresh transport for each session handle.
pub fn make_transport(config: &DaemonConfig) -> Box<dyn PresenceTransport> {
    match config.transport {
        TransportKind::Discord => Box::new(DiscordTransport::new(&config.client_id)),
        TransportKind::Offline => Box::new(OfflineTransport::default()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Discord
// ─────────────────────────────────────────────────────────────────────────────

pub struct DiscordTransport {
    client_id: String,
    client: Option<DiscordIpcClient>,
}

impl DiscordTransport {
    pub fn new(client_id: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            client: None,
        }
    }
}

impl PresenceTransport for DiscordTransport {
    fn login(&mut self) -> Result<(), TransportError> {
        let mut client = DiscordIpcClient::new(&self.client_id)
            .map_err(|err| TransportError::Unavailable(err.to_string()))?;
        client
            .connect()
            .map_err(|err| TransportError::Unavailable(err.to_string()))?;
        self.client = Some(client);
        Ok(())
    }

    fn set_activity(&mut self, payload: &PresencePayload) -> Result<(), TransportError> {
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| TransportError::Disconnected("not logged in".to_string()))?;

        let mut assets = activity::Assets::new().large_image(&payload.large_image_key);
        if let Some(text) = payload.large_image_text.as_deref() {
            assets = assets.large_text(text);
        }
        if let Some(key) = payload.small_image_key.as_deref() {
            assets = assets.small_image(key);
            if let Some(text) = payload.small_image_text.as_deref() {
                assets = assets.small_text(text);
            }
        }

        let mut presence = activity::Activity::new()
            .details(&payload.details)
            .state(&payload.state)
            .assets(assets);
        if let Some(start) = payload.start_timestamp {
            presence = presence.timestamps(activity::Timestamps::new().start(start));
        }

        client.set_activity(presence).map_err(|err| {
            let message = err.to_string();
            if is_disconnect_error(&*err) {
                self.client = None;
                TransportError::Disconnected(message)
            } else {
                TransportError::Rejected(message)
            }
        })
    }

    fn destroy(&mut self) -> Result<(), TransportError> {
        match self.client.take() {
            Some(mut client) => client
                .close()
                .map_err(|err| TransportError::Rejected(err.to_string())),
            None => Ok(()),
        }
    }
}

fn is_disconnect_error(err: &(dyn Error + 'static)) -> bool {
    err.downcast_ref::<std::io::Error>()
        .map(|io_err| {
            matches!(
                io_err.kind(),
                ErrorKind::BrokenPipe
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::NotConnected
                    | ErrorKind::UnexpectedEof
            )
        })
        .unwrap_or(false)
}

// ─────────────────────────────────────────────────────────────────────────────
// Offline
// ─────────────────────────────────────────────────────────────────────────────

/// Accepts everything. Useful for previewing templates via `get_status`
/// without a chat client running.
#[derive(Debug, Default)]
pub struct OfflineTransport {
    logged_in: bool,
}

impl PresenceTransport for OfflineTransport {
    fn login(&mut self) -> Result<(), TransportError> {
        self.logged_in = true;
        Ok(())
    }

    fn set_activity(&mut self, payload: &PresencePayload) -> Result<(), TransportError> {
        if !self.logged_in {
            return Err(TransportError::Disconnected("not logged in".to_string()));
        }
        debug!(details = %payload.details, state = %payload.state, "Offline presence update");
        Ok(())
    }

    fn destroy(&mut self) -> Result<(), TransportError> {
        self.logged_in = false;
        Ok(())
    }
}
