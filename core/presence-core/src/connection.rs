//! Connection lifecycle for the presence transport.
//!
//! The manager is a plain state machine: every operation updates state
//! synchronously and returns the side effects the caller must perform
//! (open/login/destroy a session, refresh presence, update the status line).
//! Transport completions are fed back through [`ConnectionManager::handle_signal`].
//!
//! Transitions:
//!
//! ```text
//! Disconnected --connect--> Connecting --login ok / ready--> Connected
//!                           Connecting --login failed------> Disconnected (+retry)
//!                           Connecting --login timed out---> Disconnected (new session, +retry)
//!                                       Connected --dropped-> Disconnected (+retry)
//! any --disconnect--> Disconnected
//! ```
//!
//! Retries are capped: once the retry counter reaches `max_retries` no timer is
//! armed and only [`ConnectionManager::reconnect`] resumes.

use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::status::{
    StatusUpdate, STATUS_CONNECTED, STATUS_CONNECTING, STATUS_CONNECT_FAILED,
    STATUS_DISCONNECTED, STATUS_GAVE_UP, STATUS_SEND_FAILED,
};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;
pub const DEFAULT_LOGIN_TIMEOUT_SECS: u64 = 10;

pub const LOGIN_TIMED_OUT: &str = "login timed out";

pub const NOTICE_CONNECT_FAILED: &str = "Failed to connect to Discord. Is it running?";
pub const NOTICE_SEND_FAILED: &str = "Failed to set Discord activity. Please try reconnecting.";
pub const NOTICE_RECONNECTING: &str = "Reconnecting to Discord...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Generation number of a session handle. Each `initialize` creates a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SessionId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSlot {
    NoSession,
    Session(SessionId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRetry {
    pub due: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
    /// How long a login may stay in flight before the session is abandoned.
    pub login_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delay: Duration::from_secs(DEFAULT_RETRY_DELAY_SECS),
            login_timeout: Duration::from_secs(DEFAULT_LOGIN_TIMEOUT_SECS),
        }
    }
}

/// Side effect requested by the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Create the transport handle for this session.
    Open(SessionId),
    /// Start logging in on this session.
    Login(SessionId),
    /// Tear the session down. Errors are logged only.
    Destroy(SessionId),
    /// Compose and send a presence update now.
    Refresh,
    Status(StatusUpdate),
    Notify(String),
}

/// Completion or event reported by the transport for one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSignal {
    LoginSucceeded,
    LoginFailed(String),
    Ready,
    Dropped(Option<String>),
    SendSucceeded,
    SendFailed(String),
    DestroyFailed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    pub session: Option<SessionId>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub retry_pending: bool,
    pub login_pending: bool,
    pub gave_up: bool,
    pub last_error: Option<String>,
}

#[derive(Debug)]
pub struct ConnectionManager {
    state: ConnectionState,
    session: SessionSlot,
    last_session: u64,
    retry_count: u32,
    pending_retry: Option<PendingRetry>,
    login_deadline: Option<Instant>,
    policy: RetryPolicy,
    last_error: Option<String>,
    gave_up: bool,
}

impl ConnectionManager {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            session: SessionSlot::NoSession,
            last_session: 0,
            retry_count: 0,
            pending_retry: None,
            login_deadline: None,
            policy,
            last_error: None,
            gave_up: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn session(&self) -> SessionSlot {
        self.session
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn pending_retry(&self) -> Option<PendingRetry> {
        self.pending_retry
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn gave_up(&self) -> bool {
        self.gave_up
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            state: self.state,
            session: match self.session {
                SessionSlot::NoSession => None,
                SessionSlot::Session(id) => Some(id),
            },
            retry_count: self.retry_count,
            max_retries: self.policy.max_retries,
            retry_pending: self.pending_retry.is_some(),
            login_pending: self.login_deadline.is_some(),
            gave_up: self.gave_up,
            last_error: self.last_error.clone(),
        }
    }

    /// Replaces any existing session with a fresh handle.
    pub fn initialize(&mut self) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();
        if let SessionSlot::Session(previous) = self.session {
            debug!(session = previous.0, "Replacing existing session handle");
            actions.push(ConnectionAction::Destroy(previous));
        }

        self.last_session += 1;
        let id = SessionId(self.last_session);
        self.session = SessionSlot::Session(id);
        self.state = ConnectionState::Disconnected;
        self.login_deadline = None;
        actions.push(ConnectionAction::Open(id));
        actions
    }

    /// Starts a login on the current session. The login must complete within
    /// the policy's `login_timeout` of `now`.
    pub fn connect(&mut self, now: Instant) -> Vec<ConnectionAction> {
        let id = match self.session {
            SessionSlot::Session(id) => id,
            SessionSlot::NoSession => {
                warn!("Connect requested before the session was initialized");
                return Vec::new();
            }
        };

        match self.state {
            ConnectionState::Connected => {
                debug!(session = id.0, "Connect ignored; already connected");
                Vec::new()
            }
            ConnectionState::Connecting => {
                debug!(session = id.0, "Connect ignored; login already in flight");
                Vec::new()
            }
            ConnectionState::Disconnected => {
                self.state = ConnectionState::Connecting;
                self.login_deadline = now.checked_add(self.policy.login_timeout);
                info!(
                    session = id.0,
                    attempt = self.retry_count + 1,
                    "Connecting to Discord"
                );
                vec![
                    ConnectionAction::Status(StatusUpdate::disconnected(STATUS_CONNECTING)),
                    ConnectionAction::Login(id),
                ]
            }
        }
    }

    /// Arms a retry after a failed attempt, or gives up once the cap is hit.
    pub fn schedule_retry(&mut self, now: Instant) -> Vec<ConnectionAction> {
        if self.pending_retry.is_some() {
            debug!("Retry already pending");
            return Vec::new();
        }

        self.retry_count += 1;
        if self.retry_count >= self.policy.max_retries {
            self.gave_up = true;
            error!(
                attempts = self.retry_count,
                last_error = ?self.last_error,
                "Giving up on Discord connection"
            );
            return vec![
                ConnectionAction::Status(StatusUpdate::disconnected(STATUS_GAVE_UP)),
                ConnectionAction::Notify(format!(
                    "Could not connect to Discord after {} attempts. Run reconnect to try again.",
                    self.retry_count
                )),
            ];
        }

        self.pending_retry = Some(PendingRetry {
            due: now + self.policy.delay,
        });
        info!(
            retry = self.retry_count,
            max_retries = self.policy.max_retries,
            delay_secs = self.policy.delay.as_secs(),
            "Scheduled Discord reconnect"
        );
        Vec::new()
    }

    /// When the pending retry is due.
    pub fn retry_deadline(&self) -> Option<Instant> {
        self.pending_retry.map(|retry| retry.due)
    }

    /// Fires the pending retry if it is due at `now`.
    pub fn retry_due(&mut self, now: Instant) -> Vec<ConnectionAction> {
        match self.pending_retry {
            Some(retry) if retry.due <= now => {
                self.pending_retry = None;
                self.connect(now)
            }
            _ => Vec::new(),
        }
    }

    /// When the in-flight login is abandoned.
    pub fn login_deadline(&self) -> Option<Instant> {
        self.login_deadline
    }

    /// Abandons a login that has been in flight past its deadline. The wedged
    /// session is replaced so a late reply from it is ignored, then the
    /// attempt counts as a failed login.
    pub fn login_timed_out(&mut self, now: Instant) -> Vec<ConnectionAction> {
        match self.login_deadline {
            Some(deadline) if deadline <= now && self.state == ConnectionState::Connecting => {}
            _ => return Vec::new(),
        }

        let stale = match self.session {
            SessionSlot::Session(id) => id.0,
            SessionSlot::NoSession => 0,
        };
        error!(session = stale, "Discord login timed out");
        self.last_error = Some(LOGIN_TIMED_OUT.to_string());

        let mut actions = self.initialize();
        actions.push(ConnectionAction::Status(StatusUpdate::disconnected(
            STATUS_CONNECT_FAILED,
        )));
        actions.push(ConnectionAction::Notify(NOTICE_CONNECT_FAILED.to_string()));
        actions.extend(self.schedule_retry(now));
        actions
    }

    /// Cancels any retry and tears the session down. Safe to call repeatedly.
    pub fn disconnect(&mut self) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();
        self.pending_retry = None;
        self.login_deadline = None;

        if let SessionSlot::Session(id) = self.session {
            actions.push(ConnectionAction::Destroy(id));
        }
        self.session = SessionSlot::NoSession;

        if self.state != ConnectionState::Disconnected {
            self.state = ConnectionState::Disconnected;
            info!("Disconnected from Discord");
            actions.push(ConnectionAction::Status(StatusUpdate::disconnected(
                STATUS_DISCONNECTED,
            )));
        }
        actions
    }

    /// Manual reconnect: resets the retry budget and starts over with a new
    /// session.
    pub fn reconnect(&mut self, now: Instant) -> Vec<ConnectionAction> {
        self.retry_count = 0;
        self.gave_up = false;
        self.last_error = None;

        let mut actions = vec![ConnectionAction::Notify(NOTICE_RECONNECTING.to_string())];
        actions.extend(self.disconnect());
        actions.extend(self.initialize());
        actions.extend(self.connect(now));
        actions
    }

    /// Applies a transport completion. Signals from sessions other than the
    /// current one are ignored, except destroy failures which are only logged.
    pub fn handle_signal(
        &mut self,
        session: SessionId,
        signal: TransportSignal,
        now: Instant,
    ) -> Vec<ConnectionAction> {
        if let TransportSignal::DestroyFailed(err) = &signal {
            warn!(session = session.0, error = %err, "Failed to destroy Discord session");
            return Vec::new();
        }

        if self.session != SessionSlot::Session(session) {
            debug!(session = session.0, signal = ?signal, "Ignoring signal from stale session");
            return Vec::new();
        }

        match signal {
            TransportSignal::LoginSucceeded | TransportSignal::Ready => self.mark_connected(),
            TransportSignal::LoginFailed(err) => {
                if self.state != ConnectionState::Connecting {
                    debug!(session = session.0, "Login failure outside of a connect attempt");
                }
                error!(session = session.0, error = %err, "Failed to connect to Discord RPC");
                self.state = ConnectionState::Disconnected;
                self.login_deadline = None;
                self.last_error = Some(err);

                let mut actions = vec![
                    ConnectionAction::Status(StatusUpdate::disconnected(STATUS_CONNECT_FAILED)),
                    ConnectionAction::Notify(NOTICE_CONNECT_FAILED.to_string()),
                ];
                actions.extend(self.schedule_retry(now));
                actions
            }
            TransportSignal::Dropped(reason) => {
                if self.state != ConnectionState::Connected {
                    debug!(session = session.0, "Drop reported while not connected");
                    return Vec::new();
                }
                warn!(session = session.0, reason = ?reason, "Discord session dropped");
                self.state = ConnectionState::Disconnected;
                self.last_error = reason;

                let mut actions = vec![ConnectionAction::Status(StatusUpdate::disconnected(
                    STATUS_DISCONNECTED,
                ))];
                actions.extend(self.schedule_retry(now));
                actions
            }
            TransportSignal::SendSucceeded => {
                debug!(session = session.0, "Activity updated");
                if self.is_connected() {
                    vec![ConnectionAction::Status(StatusUpdate::connected(
                        STATUS_CONNECTED,
                    ))]
                } else {
                    Vec::new()
                }
            }
            TransportSignal::SendFailed(err) => {
                error!(session = session.0, error = %err, "Failed to set activity");
                vec![
                    ConnectionAction::Status(StatusUpdate {
                        text: STATUS_SEND_FAILED.to_string(),
                        connected: self.is_connected(),
                    }),
                    ConnectionAction::Notify(NOTICE_SEND_FAILED.to_string()),
                ]
            }
            TransportSignal::DestroyFailed(_) => Vec::new(),
        }
    }

    fn mark_connected(&mut self) -> Vec<ConnectionAction> {
        self.state = ConnectionState::Connected;
        self.retry_count = 0;
        self.pending_retry = None;
        self.login_deadline = None;
        self.last_error = None;
        self.gave_up = false;
        info!("Connected to Discord RPC");
        vec![
            ConnectionAction::Status(StatusUpdate::connected(STATUS_CONNECTED)),
            ConnectionAction::Refresh,
        ]
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started() -> (ConnectionManager, SessionId) {
        let mut manager = ConnectionManager::default();
        let actions = manager.initialize();
        let id = match actions.as_slice() {
            [ConnectionAction::Open(id)] => *id,
            other => panic!("unexpected actions: {:?}", other),
        };
        (manager, id)
    }

    fn fail_login(manager: &mut ConnectionManager, id: SessionId, now: Instant) -> Vec<ConnectionAction> {
        let connect = manager.connect(Instant::now());
        assert!(connect.contains(&ConnectionAction::Login(id)));
        manager.handle_signal(id, TransportSignal::LoginFailed("no pipe".to_string()), now)
    }

    fn has_status(actions: &[ConnectionAction], text: &str) -> bool {
        actions.iter().any(|action| {
            matches!(action, ConnectionAction::Status(update) if update.text == text)
        })
    }

    #[test]
    fn starts_disconnected_without_session() {
        let manager = ConnectionManager::default();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.session(), SessionSlot::NoSession);
    }

    #[test]
    fn connect_without_session_is_noop() {
        let mut manager = ConnectionManager::default();
        assert!(manager.connect(Instant::now()).is_empty());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn login_success_connects_and_refreshes() {
        let (mut manager, id) = started();
        let actions = manager.connect(Instant::now());
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert!(actions.contains(&ConnectionAction::Login(id)));

        let actions = manager.handle_signal(id, TransportSignal::LoginSucceeded, Instant::now());
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert!(actions.contains(&ConnectionAction::Refresh));
        assert!(has_status(&actions, STATUS_CONNECTED));
        assert_eq!(manager.retry_count(), 0);
    }

    #[test]
    fn connect_while_connected_is_noop() {
        let (mut manager, id) = started();
        manager.connect(Instant::now());
        manager.handle_signal(id, TransportSignal::LoginSucceeded, Instant::now());
        assert!(manager.connect(Instant::now()).is_empty());
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[test]
    fn login_failure_schedules_one_retry() {
        let (mut manager, id) = started();
        let now = Instant::now();
        let actions = fail_login(&mut manager, id, now);

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.retry_count(), 1);
        assert_eq!(manager.retry_deadline(), Some(now + Duration::from_secs(5)));
        assert_eq!(manager.last_error(), Some("no pipe"));
        assert!(has_status(&actions, STATUS_CONNECT_FAILED));

        // A second schedule while pending does nothing.
        assert!(manager.schedule_retry(now).is_empty());
        assert_eq!(manager.retry_count(), 1);
    }

    #[test]
    fn retry_fires_only_when_due() {
        let (mut manager, id) = started();
        let now = Instant::now();
        fail_login(&mut manager, id, now);

        assert!(manager.retry_due(now + Duration::from_secs(1)).is_empty());
        assert!(manager.pending_retry().is_some());

        let actions = manager.retry_due(now + Duration::from_secs(5));
        assert!(actions.contains(&ConnectionAction::Login(id)));
        assert!(manager.pending_retry().is_none());
        assert_eq!(manager.state(), ConnectionState::Connecting);
    }

    #[test]
    fn gives_up_after_three_consecutive_failures() {
        let (mut manager, id) = started();
        let mut now = Instant::now();

        fail_login(&mut manager, id, now);
        assert!(manager.pending_retry().is_some());
        now += Duration::from_secs(5);
        manager.retry_due(now);
        let actions = manager.handle_signal(id, TransportSignal::LoginFailed("again".into()), now);
        assert!(!has_status(&actions, STATUS_GAVE_UP));
        assert_eq!(manager.retry_count(), 2);
        assert!(manager.pending_retry().is_some());

        now += Duration::from_secs(5);
        manager.retry_due(now);
        let actions = manager.handle_signal(id, TransportSignal::LoginFailed("third".into()), now);

        assert_eq!(manager.retry_count(), 3);
        assert!(manager.pending_retry().is_none());
        assert!(manager.gave_up());
        assert!(has_status(&actions, STATUS_GAVE_UP));
        assert!(actions
            .iter()
            .any(|action| matches!(action, ConnectionAction::Notify(_))));

        // Nothing re-arms automatically after giving up.
        assert!(manager.retry_due(now + Duration::from_secs(60)).is_empty());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn manual_reconnect_after_give_up_starts_over() {
        let (mut manager, id) = started();
        let mut now = Instant::now();
        fail_login(&mut manager, id, now);
        for _ in 0..2 {
            now += Duration::from_secs(5);
            assert!(manager.retry_due(now).contains(&ConnectionAction::Login(id)));
            manager.handle_signal(id, TransportSignal::LoginFailed("down".into()), now);
        }
        assert!(manager.gave_up());

        let actions = manager.reconnect(Instant::now());
        assert_eq!(manager.retry_count(), 0);
        assert!(!manager.gave_up());
        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert!(actions.contains(&ConnectionAction::Destroy(id)));

        let new_id = match manager.session() {
            SessionSlot::Session(new_id) => new_id,
            SessionSlot::NoSession => panic!("reconnect must create a session"),
        };
        assert_ne!(new_id, id);
        assert!(actions.contains(&ConnectionAction::Open(new_id)));
        assert!(actions.contains(&ConnectionAction::Login(new_id)));
    }

    #[test]
    fn success_clears_pending_retry_and_counter() {
        let (mut manager, id) = started();
        let now = Instant::now();
        fail_login(&mut manager, id, now);
        assert_eq!(manager.retry_count(), 1);

        manager.handle_signal(id, TransportSignal::Ready, now);
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert_eq!(manager.retry_count(), 0);
        assert!(manager.pending_retry().is_none());
    }

    #[test]
    fn disconnect_twice_is_safe() {
        let (mut manager, id) = started();
        manager.connect(Instant::now());
        manager.handle_signal(id, TransportSignal::LoginSucceeded, Instant::now());

        let first = manager.disconnect();
        assert!(first.contains(&ConnectionAction::Destroy(id)));
        assert!(has_status(&first, STATUS_DISCONNECTED));

        let second = manager.disconnect();
        assert!(second.is_empty());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.session(), SessionSlot::NoSession);
    }

    #[test]
    fn disconnect_before_initialize_is_safe() {
        let mut manager = ConnectionManager::default();
        assert!(manager.disconnect().is_empty());
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn disconnect_cancels_pending_retry() {
        let (mut manager, id) = started();
        let now = Instant::now();
        fail_login(&mut manager, id, now);
        assert!(manager.pending_retry().is_some());

        manager.disconnect();
        assert!(manager.pending_retry().is_none());
        assert!(manager.retry_due(now + Duration::from_secs(60)).is_empty());
    }

    #[test]
    fn dropped_session_schedules_retry() {
        let (mut manager, id) = started();
        let now = Instant::now();
        manager.connect(Instant::now());
        manager.handle_signal(id, TransportSignal::LoginSucceeded, now);

        let actions = manager.handle_signal(id, TransportSignal::Dropped(None), now);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(has_status(&actions, STATUS_DISCONNECTED));
        assert!(manager.pending_retry().is_some());
    }

    #[test]
    fn send_failure_does_not_reconnect() {
        let (mut manager, id) = started();
        let now = Instant::now();
        manager.connect(Instant::now());
        manager.handle_signal(id, TransportSignal::LoginSucceeded, now);

        let actions =
            manager.handle_signal(id, TransportSignal::SendFailed("rejected".into()), now);
        assert_eq!(manager.state(), ConnectionState::Connected);
        assert!(manager.pending_retry().is_none());
        assert!(has_status(&actions, STATUS_SEND_FAILED));
        assert!(!actions
            .iter()
            .any(|action| matches!(action, ConnectionAction::Login(_))));
    }

    #[test]
    fn stale_session_signals_are_ignored() {
        let (mut manager, old) = started();
        let now = Instant::now();
        manager.connect(Instant::now());
        manager.reconnect(Instant::now());

        let actions = manager.handle_signal(old, TransportSignal::LoginSucceeded, now);
        assert!(actions.is_empty());
        assert_eq!(manager.state(), ConnectionState::Connecting);

        assert!(manager
            .handle_signal(old, TransportSignal::DestroyFailed("gone".into()), now)
            .is_empty());
    }

    #[test]
    fn initialize_replaces_prior_handle() {
        let (mut manager, first) = started();
        let actions = manager.initialize();
        assert_eq!(actions[0], ConnectionAction::Destroy(first));
        assert!(matches!(actions[1], ConnectionAction::Open(id) if id != first));
    }

    #[test]
    fn custom_policy_is_respected() {
        let mut manager = ConnectionManager::new(RetryPolicy {
            max_retries: 1,
            delay: Duration::from_secs(1),
            login_timeout: Duration::from_secs(1),
        });
        manager.initialize();
        let id = match manager.session() {
            SessionSlot::Session(id) => id,
            SessionSlot::NoSession => panic!("missing session"),
        };
        let actions = fail_login(&mut manager, id, Instant::now());
        assert!(manager.gave_up());
        assert!(has_status(&actions, STATUS_GAVE_UP));
    }

    #[test]
    fn login_past_deadline_replaces_session_and_retries() {
        let (mut manager, id) = started();
        let now = Instant::now();
        manager.connect(now);
        assert_eq!(manager.login_deadline(), Some(now + Duration::from_secs(10)));

        assert!(manager.login_timed_out(now + Duration::from_secs(9)).is_empty());
        assert_eq!(manager.state(), ConnectionState::Connecting);

        let later = now + Duration::from_secs(10);
        let actions = manager.login_timed_out(later);
        assert_eq!(actions[0], ConnectionAction::Destroy(id));
        let new_id = match manager.session() {
            SessionSlot::Session(new_id) => new_id,
            SessionSlot::NoSession => panic!("timeout must open a new session"),
        };
        assert_ne!(new_id, id);
        assert!(actions.contains(&ConnectionAction::Open(new_id)));
        assert!(has_status(&actions, STATUS_CONNECT_FAILED));
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.last_error(), Some(LOGIN_TIMED_OUT));
        assert!(manager.login_deadline().is_none());
        assert_eq!(manager.retry_count(), 1);
        assert_eq!(manager.retry_deadline(), Some(later + Duration::from_secs(5)));

        // A late reply from the abandoned session changes nothing.
        assert!(manager
            .handle_signal(id, TransportSignal::LoginSucceeded, later)
            .is_empty());
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        let retry = manager.retry_due(later + Duration::from_secs(5));
        assert!(retry.contains(&ConnectionAction::Login(new_id)));
    }

    #[test]
    fn repeated_login_timeouts_give_up() {
        let (mut manager, _) = started();
        let mut now = Instant::now();
        manager.connect(now);

        let mut last = Vec::new();
        for attempt in 1..=3 {
            now += Duration::from_secs(10);
            last = manager.login_timed_out(now);
            assert_eq!(manager.retry_count(), attempt);
            if attempt < 3 {
                now += Duration::from_secs(5);
                let retry = manager.retry_due(now);
                assert!(retry
                    .iter()
                    .any(|action| matches!(action, ConnectionAction::Login(_))));
            }
        }

        assert!(manager.gave_up());
        assert!(has_status(&last, STATUS_GAVE_UP));
        assert!(manager.pending_retry().is_none());
        assert!(manager.login_deadline().is_none());
        assert!(manager.login_timed_out(now + Duration::from_secs(60)).is_empty());
    }

    #[test]
    fn completed_login_clears_deadline() {
        let (mut manager, id) = started();
        let now = Instant::now();
        manager.connect(now);
        manager.handle_signal(id, TransportSignal::LoginSucceeded, now);

        assert!(manager.login_deadline().is_none());
        assert!(manager.login_timed_out(now + Duration::from_secs(60)).is_empty());
        assert_eq!(manager.state(), ConnectionState::Connected);

        let (mut failed, id) = started();
        fail_login(&mut failed, id, now);
        assert!(failed.login_deadline().is_none());
    }
}
