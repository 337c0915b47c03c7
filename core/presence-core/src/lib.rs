//! # presence-core
//!
//! Shared logic for vault-presence: everything that decides *what* the chat
//! client should show and *when* the daemon should (re)connect, with no I/O
//! beyond settings persistence.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. The daemon drives these types
//!   from its event loop and feeds transport completions back in.
//! - **Explicit time**: Functions that depend on the clock take `now` as a
//!   parameter so every transition is reproducible in tests.
//! - **Graceful degradation**: Missing or malformed settings fall back to
//!   defaults instead of failing startup.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use presence_core::{build_presence, ActivityTracker, PresenceContext, Settings};
//!
//! let settings = Settings::default();
//! let tracker = ActivityTracker::new(chrono::Utc::now());
//! let payload = build_presence(&settings, &tracker, &PresenceContext::default(), None, chrono::Utc::now());
//! ```

pub mod activity;
pub mod composer;
pub mod config;
pub mod connection;
pub mod context;
pub mod error;
pub mod settings;
pub mod status;
pub mod template;

pub use activity::ActivityTracker;
pub use composer::{build_presence, presence_mode, PresenceMode, PresencePayload};
pub use config::*;
pub use connection::{
    ConnectionAction, ConnectionManager, ConnectionSnapshot, ConnectionState, PendingRetry,
    RetryPolicy, SessionId, SessionSlot, TransportSignal,
};
pub use context::{FileContext, PresenceContext};
pub use error::{PresenceError, Result};
pub use settings::Settings;
pub use status::{Notice, StatusLine, StatusReporter, StatusSnapshot, StatusUpdate};
pub use template::expand;
