//! Daemon state and request handling.
//!
//! `Daemon` is the single owner of settings, host context, the connection
//! manager and the status line. The event loop in `main.rs` calls into it one
//! message at a time, so nothing here needs locking.

use chrono::{DateTime, Utc};
use presence_core::{
    build_presence, presence_mode, write_json_atomic, ActivityTracker, ConnectionAction,
    ConnectionManager, FileContext, PresenceContext, PresencePayload, RetryPolicy, SessionId,
    Settings, StatusReporter, StatusUpdate, TransportSignal,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use vault_presence_protocol::{
    parse_command, parse_event, parse_settings_patch, CommandKind, EventEnvelope, EventType,
    Method, Request, Response, PROTOCOL_VERSION,
};

use crate::transport::PresenceTransport;
use crate::worker::{SessionSignal, SessionWorker, WorkerCommand};

const WORKER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

pub type TransportFactory = Box<dyn Fn() -> Box<dyn PresenceTransport>>;

/// Where the daemon persists things. `None` disables persistence (tests).
#[derive(Debug, Clone, Default)]
pub struct DaemonPaths {
    pub settings: Option<PathBuf>,
    pub status: Option<PathBuf>,
}

pub struct Daemon {
    settings: Settings,
    paths: DaemonPaths,
    tracker: ActivityTracker,
    context: PresenceContext,
    last_payload: Option<PresencePayload>,
    connection: ConnectionManager,
    status: StatusReporter,
    worker: Option<SessionWorker>,
    make_transport: TransportFactory,
    signals: UnboundedSender<SessionSignal>,
    shutdown_requested: bool,
}

impl Daemon {
    pub fn new(
        settings: Settings,
        paths: DaemonPaths,
        policy: RetryPolicy,
        make_transport: TransportFactory,
        signals: UnboundedSender<SessionSignal>,
    ) -> Self {
        let now = Utc::now();
        Self {
            settings,
            paths,
            tracker: ActivityTracker::new(now),
            context: PresenceContext::default(),
            last_payload: None,
            connection: ConnectionManager::new(policy),
            status: StatusReporter::new(now),
            worker: None,
            make_transport,
            signals,
            shutdown_requested: false,
        }
    }

    /// Creates the first session and starts connecting.
    pub fn start(&mut self) {
        self.persist_status();
        let mut actions = self.connection.initialize();
        actions.extend(self.connection.connect(Instant::now()));
        self.apply(actions);
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }

    pub fn retry_deadline(&self) -> Option<Instant> {
        self.connection.retry_deadline()
    }

    pub fn fire_retry(&mut self, now: Instant) {
        let actions = self.connection.retry_due(now);
        self.apply(actions);
    }

    pub fn login_deadline(&self) -> Option<Instant> {
        self.connection.login_deadline()
    }

    /// Abandons a login that never answered and lets the retry policy run.
    pub fn fire_login_timeout(&mut self, now: Instant) {
        let actions = self.connection.login_timed_out(now);
        self.apply(actions);
    }

    pub fn handle_signal(&mut self, session: SessionId, signal: TransportSignal) {
        let actions = self.connection.handle_signal(session, signal, Instant::now());
        self.apply(actions);
    }

    /// Periodic refresh. Keeps the idle state and elapsed timer current.
    pub fn refresh_tick(&mut self) {
        self.refresh("interval");
    }

    /// Tears the session down and waits briefly for the worker to finish.
    pub fn shutdown(&mut self) {
        info!("Shutting down presence daemon");
        let actions = self.connection.disconnect();
        for action in actions {
            match action {
                ConnectionAction::Destroy(id) => self.finish_worker(id),
                other => self.apply(vec![other]),
            }
        }
    }

    /// Composes the current payload and hands it to the session worker.
    /// The payload is always rebuilt so `get_status` can preview it, but it is
    /// only sent while connected.
    fn refresh(&mut self, reason: &str) {
        let now = Utc::now();
        let payload = build_presence(
            &self.settings,
            &self.tracker,
            &self.context,
            self.last_payload.as_ref(),
            now,
        );
        self.last_payload = Some(payload.clone());

        if !self.connection.is_connected() {
            debug!(reason, "Presence refresh skipped; not connected");
            return;
        }

        match self.worker.as_ref() {
            Some(worker) => {
                debug!(
                    reason,
                    session = worker.id().0,
                    details = %payload.details,
                    state = %payload.state,
                    "Sending presence update"
                );
                if !worker.send(WorkerCommand::SetActivity(payload)) {
                    warn!(session = worker.id().0, "Session worker is gone; update dropped");
                }
            }
            None => warn!(reason, "Connected without a session worker"),
        }
    }

    fn apply(&mut self, actions: Vec<ConnectionAction>) {
        for action in actions {
            match action {
                ConnectionAction::Open(id) => self.open_session(id),
                ConnectionAction::Login(id) => self.login(id),
                ConnectionAction::Destroy(id) => self.retire_worker(id),
                ConnectionAction::Refresh => self.refresh("connection"),
                ConnectionAction::Status(update) => self.set_status(update),
                ConnectionAction::Notify(message) => self.notify(message),
            }
        }
    }

    fn open_session(&mut self, id: SessionId) {
        if let Some(previous) = self.worker.take() {
            previous.retire();
        }
        match SessionWorker::spawn(id, (self.make_transport)(), self.signals.clone()) {
            Ok(worker) => {
                debug!(session = id.0, "Session worker started");
                self.worker = Some(worker);
            }
            Err(err) => warn!(session = id.0, error = %err, "Failed to start session worker"),
        }
    }

    fn login(&mut self, id: SessionId) {
        let sent = match self.worker.as_ref() {
            Some(worker) if worker.id() == id => worker.send(WorkerCommand::Login),
            _ => false,
        };
        if !sent {
            // Route through the normal failure path so the retry budget applies.
            let _ = self.signals.send((
                id,
                TransportSignal::LoginFailed("presence client unavailable".to_string()),
            ));
        }
    }

    fn retire_worker(&mut self, id: SessionId) {
        match self.worker.take() {
            Some(worker) if worker.id() == id => worker.retire(),
            Some(other) => self.worker = Some(other),
            None => {}
        }
    }

    fn finish_worker(&mut self, id: SessionId) {
        match self.worker.take() {
            Some(worker) if worker.id() == id => worker.shutdown(WORKER_SHUTDOWN_TIMEOUT),
            Some(other) => self.worker = Some(other),
            None => {}
        }
    }

    fn set_status(&mut self, update: StatusUpdate) {
        let text = update.text.clone();
        let connected = update.connected;
        if self.status.apply(update, Utc::now()) {
            info!(status = %text, connected, "Status changed");
            self.persist_status();
        }
    }

    fn notify(&mut self, message: String) {
        info!(notice = %message, "Notice");
        self.status.push_notice(message, Utc::now());
        self.persist_status();
    }

    fn persist_status(&self) {
        let Some(path) = self.paths.status.as_ref() else {
            return;
        };
        if let Err(err) = write_json_atomic(path, &self.status.snapshot()) {
            warn!(error = %err, path = %path.display(), "Failed to persist status");
        }
    }

    fn persist_settings(&self) -> Result<(), String> {
        match self.paths.settings.as_ref() {
            Some(path) => presence_core::save_settings_to(path, &self.settings)
                .map_err(|err| err.to_string()),
            None => Ok(()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Requests
    // ─────────────────────────────────────────────────────────────────────────

    pub fn handle_request(&mut self, request: Request) -> Response {
        if request.protocol_version != PROTOCOL_VERSION {
            return Response::error(
                request.id,
                "protocol_mismatch",
                "unsupported protocol version",
            );
        }

        match request.method {
            Method::GetHealth => Response::ok(
                request.id,
                json!({
                    "status": "ok",
                    "pid": std::process::id(),
                    "version": env!("CARGO_PKG_VERSION"),
                    "protocol_version": PROTOCOL_VERSION,
                    "connection": self.connection.state(),
                }),
            ),
            Method::GetStatus => Response::ok(request.id, self.status_value()),
            Method::Event => {
                let params = match request.params {
                    Some(params) => params,
                    None => {
                        return Response::error(request.id, "invalid_params", "event is required")
                    }
                };
                match parse_event(params) {
                    Ok(event) => {
                        let data = self.handle_event(event);
                        Response::ok(request.id, data)
                    }
                    Err(err) => Response::error_with_info(request.id, err),
                }
            }
            Method::Command => {
                let params = match request.params {
                    Some(params) => params,
                    None => {
                        return Response::error(
                            request.id,
                            "invalid_params",
                            "command is required",
                        )
                    }
                };
                match parse_command(params) {
                    Ok(command) => {
                        let data = self.handle_command(command);
                        Response::ok(request.id, data)
                    }
                    Err(err) => Response::error_with_info(request.id, err),
                }
            }
            Method::UpdateSettings => {
                let params = match request.params {
                    Some(params) => params,
                    None => {
                        return Response::error(
                            request.id,
                            "invalid_params",
                            "settings patch is required",
                        )
                    }
                };
                let patch = match parse_settings_patch(params) {
                    Ok(patch) => patch,
                    Err(err) => return Response::error_with_info(request.id, err),
                };
                match self.update_settings(&patch) {
                    Ok(changed) => Response::ok(request.id, json!({ "changed": changed })),
                    Err((code, message)) => Response::error(request.id, code, message),
                }
            }
            Method::Shutdown => {
                self.shutdown_requested = true;
                Response::ok(request.id, json!({ "stopping": true }))
            }
        }
    }

    fn handle_event(&mut self, event: EventEnvelope) -> Value {
        let now = Utc::now();
        debug!(
            event_id = %event.event_id,
            event_type = ?event.event_type,
            "Host event received"
        );

        match event.event_type {
            EventType::VaultOpen => {
                self.tracker.record_activity(now);
                self.context.vault = event.vault;
                self.refresh("vault_open");
            }
            EventType::FileOpen => {
                self.tracker.record_activity(now);
                if event.vault.is_some() {
                    self.context.vault = event.vault;
                }
                let path = event.file_path.unwrap_or_default();
                self.context.file = FileContext::from_path(&path, event.file_created);
                self.refresh("file_open");
            }
            EventType::FileClose => {
                self.tracker.record_activity(now);
                self.context.file = None;
                self.refresh("file_close");
            }
            EventType::Activity => self.record_activity(now),
        }

        json!({ "accepted": true, "mode": presence_mode(&self.settings, &self.tracker, now) })
    }

    /// Input while idle refreshes immediately so the idle strings clear
    /// without waiting for the next tick.
    fn record_activity(&mut self, now: DateTime<Utc>) {
        let was_idle = self
            .tracker
            .is_idle(self.settings.idle_timeout_minutes, now);
        self.tracker.record_activity(now);
        if was_idle {
            self.refresh("activity");
        }
    }

    fn handle_command(&mut self, command: CommandKind) -> Value {
        match command {
            CommandKind::Reconnect => {
                info!("Manual reconnect requested");
                let actions = self.connection.reconnect(Instant::now());
                self.apply(actions);
                json!({ "connection": self.connection.state() })
            }
            CommandKind::TogglePrivacy => {
                self.settings.privacy_mode = !self.settings.privacy_mode;
                if let Err(err) = self.persist_settings() {
                    warn!(error = %err, "Failed to save privacy mode");
                }
                let message = if self.settings.privacy_mode {
                    "Privacy mode enabled"
                } else {
                    "Privacy mode disabled"
                };
                self.notify(message.to_string());
                self.refresh("toggle_privacy");
                json!({ "privacy_mode": self.settings.privacy_mode })
            }
        }
    }

    fn update_settings(&mut self, patch: &Value) -> Result<Vec<String>, (&'static str, String)> {
        let changed = self
            .settings
            .apply_patch(patch)
            .map_err(|err| ("invalid_settings", err.to_string()))?;
        if changed.is_empty() {
            return Ok(changed);
        }

        self.persist_settings()
            .map_err(|err| ("settings_write_failed", err))?;
        info!(keys = ?changed, "Settings updated");
        self.refresh("settings");
        Ok(changed)
    }

    /// Idle and private modes keep the file out of the status as well as the
    /// payload.
    fn status_value(&self) -> Value {
        let now = Utc::now();
        let snapshot = self.status.snapshot();
        let mode = presence_mode(&self.settings, &self.tracker, now);
        let file = if mode.hides_context() {
            None
        } else {
            self.context.file.as_ref()
        };
        json!({
            "status": snapshot.status,
            "notices": snapshot.notices,
            "connection": self.connection.snapshot(),
            "mode": mode,
            "presence": self.last_payload,
            "vault": self.context.vault,
            "file": file.map(|file| file.path.clone()),
            "file_name": file.map(|file| file.full_name()),
            "last_activity_ms": self.tracker.last_activity_ms(),
            "privacy_mode": self.settings.privacy_mode,
        })
    }
}
