//! Client helper for sending host events and commands to the presence daemon.
//!
//! The daemon owns all state. Every call opens one connection, writes one
//! request line and reads one response line. Events are retried once with the
//! same event id.

use chrono::Utc;
use presence_core::resolve_socket_path;
use rand::RngCore;
use serde_json::Value;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::time::Duration;
use vault_presence_protocol::{
    CommandKind, CommandParams, EventEnvelope, EventType, Method, Request, Response,
    MAX_REQUEST_BYTES,
};

use crate::error::{HookError, Result};

const READ_TIMEOUT_MS: u64 = 600;
const WRITE_TIMEOUT_MS: u64 = 600;
const RETRY_DELAY_MS: u64 = 50;

/// Host context attached to an event.
#[derive(Debug, Clone, Default)]
pub struct EventContext {
    pub vault: Option<String>,
    pub file_path: Option<String>,
    pub file_created: Option<i64>,
}

pub fn send_event(event_type: EventType, context: EventContext) -> Result<Value> {
    let event_id = make_event_id(std::process::id());
    let recorded_at = Utc::now().to_rfc3339();
    let build_envelope = || EventEnvelope {
        event_id: event_id.clone(),
        recorded_at: recorded_at.clone(),
        event_type,
        vault: context.vault.clone(),
        file_path: context.file_path.clone(),
        file_created: context.file_created,
    };

    match send_envelope(build_envelope()) {
        Ok(data) => Ok(data),
        Err(err) => {
            tracing::warn!(error = %err, event_type = ?event_type, "Failed to send event to daemon");
            std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS));
            send_envelope(build_envelope()).map_err(|retry_err| {
                tracing::warn!(
                    error = %retry_err,
                    event_type = ?event_type,
                    "Retry failed sending event to daemon"
                );
                retry_err
            })
        }
    }
}

pub fn send_command(command: CommandKind) -> Result<Value> {
    let params = serde_json::to_value(CommandParams { command })
        .map_err(|err| HookError::Transport(format!("Failed to serialize command: {}", err)))?;
    call(Method::Command, Some(params))
}

pub fn get_status() -> Result<Value> {
    call(Method::GetStatus, None)
}

pub fn update_settings(patch: Value) -> Result<Value> {
    call(Method::UpdateSettings, Some(patch))
}

pub fn shutdown() -> Result<Value> {
    call(Method::Shutdown, None)
}

fn send_envelope(event: EventEnvelope) -> Result<Value> {
    let id = Some(event.event_id.clone());
    let params = serde_json::to_value(event)
        .map_err(|err| HookError::Transport(format!("Failed to serialize event: {}", err)))?;
    into_data(send_request(&Request::new(Method::Event, id, Some(params)))?)
}

fn call(method: Method, params: Option<Value>) -> Result<Value> {
    let id = Some(make_event_id(std::process::id()));
    into_data(send_request(&Request::new(method, id, params))?)
}

fn into_data(response: Response) -> Result<Value> {
    if response.ok {
        Ok(response.data.unwrap_or(Value::Null))
    } else {
        let (code, message) = response
            .error
            .map(|err| (err.code, err.message))
            .unwrap_or_else(|| ("unknown".to_string(), "Unknown daemon error".to_string()));
        Err(HookError::Rejected { code, message })
    }
}

fn send_request(request: &Request) -> Result<Response> {
    let socket = resolve_socket_path().ok_or(HookError::HomeDirNotFound)?;
    let mut stream = UnixStream::connect(&socket).map_err(|source| HookError::Connect {
        socket: socket.display().to_string(),
        source,
    })?;
    let _ = stream.set_read_timeout(Some(Duration::from_millis(READ_TIMEOUT_MS)));
    let _ = stream.set_write_timeout(Some(Duration::from_millis(WRITE_TIMEOUT_MS)));

    serde_json::to_writer(&mut stream, request)
        .map_err(|err| HookError::Transport(format!("Failed to write request: {}", err)))?;
    stream
        .write_all(b"\n")
        .map_err(|err| HookError::Transport(format!("Failed to flush request: {}", err)))?;
    stream.flush().ok();

    read_response(&mut stream)
}

fn read_response(stream: &mut UnixStream) -> Result<Response> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_REQUEST_BYTES {
                    return Err(HookError::Transport(
                        "Response exceeded maximum size".to_string(),
                    ));
                }
                if chunk[..n].contains(&b'\n') {
                    break;
                }
            }
            Err(err)
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                return Err(HookError::Transport(
                    "Timed out waiting for daemon response".to_string(),
                ));
            }
            Err(err) => {
                return Err(HookError::Transport(format!(
                    "Failed to read response: {}",
                    err
                )))
            }
        }
    }

    let newline_index = buffer.iter().position(|b| *b == b'\n');
    let response_bytes = match newline_index {
        Some(index) => &buffer[..index],
        None => buffer.as_slice(),
    };

    if response_bytes.is_empty() {
        return Err(HookError::Transport("Daemon response was empty".to_string()));
    }

    serde_json::from_slice(response_bytes)
        .map_err(|err| HookError::Transport(format!("Failed to parse response JSON: {}", err)))
}

fn make_event_id(pid: u32) -> String {
    let mut random = rand::thread_rng();
    let rand = random.next_u64();
    format!("evt-{}-{}-{:x}", Utc::now().timestamp_millis(), pid, rand)
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_core::SOCKET_ENV;
    use std::os::unix::net::UnixListener;
    use std::path::Path;
    use std::sync::{Arc, Mutex, OnceLock};
    use std::time::Instant;

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    struct EnvGuard {
        key: &'static str,
        prior: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let prior = std::env::var(key).ok();
            std::env::set_var(key, value);
            Self { key, prior }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(value) = &self.prior {
                std::env::set_var(self.key, value);
            } else {
                std::env::remove_var(self.key);
            }
        }
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_request(stream: &mut UnixStream) -> Option<Request> {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    buffer.extend_from_slice(&chunk[..n]);
                    if buffer.contains(&b'\n') {
                        break;
                    }
                }
                Err(_) => return None,
            }
        }
        let newline_index = buffer.iter().position(|b| *b == b'\n')?;
        serde_json::from_slice(&buffer[..newline_index]).ok()
    }

    fn respond(stream: &mut UnixStream, response: &Response) {
        let mut payload = serde_json::to_vec(response).unwrap();
        payload.push(b'\n');
        let _ = stream.write_all(&payload);
    }

    /// Serves `replies.len()` connections, recording every request.
    fn fake_daemon(
        socket_path: &Path,
        replies: Vec<Option<Response>>,
    ) -> (std::thread::JoinHandle<()>, Arc<Mutex<Vec<Request>>>) {
        let listener = UnixListener::bind(socket_path).unwrap();
        listener.set_nonblocking(true).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);

        let server = std::thread::spawn(move || {
            let start = Instant::now();
            let mut replies = replies.into_iter();
            let mut pending = replies.next();
            while pending.is_some() && start.elapsed() < Duration::from_secs(5) {
                match listener.accept() {
                    Ok((mut stream, _)) => {
                        stream.set_nonblocking(false).unwrap();
                        if let Some(request) = read_request(&mut stream) {
                            seen_clone.lock().unwrap().push(request);
                        }
                        if let Some(Some(response)) = pending.take() {
                            respond(&mut stream, &response);
                        }
                        pending = replies.next();
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                        std::thread::sleep(Duration::from_millis(10));
                    }
                    Err(_) => break,
                }
            }
        });
        (server, seen)
    }

    #[test]
    fn event_retry_reuses_event_id_after_lost_response() {
        let _guard = env_lock();
        let temp_dir = tempfile::tempdir().unwrap();
        let socket_path = temp_dir.path().join("daemon.sock");
        let (server, seen) = fake_daemon(
            &socket_path,
            vec![None, Some(Response::ok(None, serde_json::json!({"accepted": true})))],
        );
        let _socket_guard = EnvGuard::set(SOCKET_ENV, socket_path.to_str().unwrap());

        let result = send_event(
            EventType::FileOpen,
            EventContext {
                vault: Some("Notes".to_string()),
                file_path: Some("Daily/today.md".to_string()),
                file_created: None,
            },
        );
        assert!(result.is_ok(), "event failed: {:?}", result.err());
        server.join().unwrap();

        let requests = seen.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].id, requests[1].id, "retry must reuse the event id");
        let event: EventEnvelope =
            serde_json::from_value(requests[1].params.clone().unwrap()).unwrap();
        assert_eq!(event.file_path.as_deref(), Some("Daily/today.md"));
        assert_eq!(event.event_type, EventType::FileOpen);
    }

    #[test]
    fn command_errors_surface_daemon_code() {
        let _guard = env_lock();
        let temp_dir = tempfile::tempdir().unwrap();
        let socket_path = temp_dir.path().join("daemon.sock");
        let (server, seen) = fake_daemon(
            &socket_path,
            vec![Some(Response::error(None, "invalid_params", "nope"))],
        );
        let _socket_guard = EnvGuard::set(SOCKET_ENV, socket_path.to_str().unwrap());

        let err = send_command(CommandKind::TogglePrivacy).expect_err("daemon rejected");
        match err {
            HookError::Rejected { code, .. } => assert_eq!(code, "invalid_params"),
            other => panic!("unexpected error: {:?}", other),
        }
        server.join().unwrap();

        let requests = seen.lock().unwrap();
        assert_eq!(requests[0].method, Method::Command);
        assert_eq!(
            requests[0].params.as_ref().unwrap()["command"],
            "toggle_privacy"
        );
    }

    #[test]
    fn missing_daemon_is_a_connect_error() {
        let _guard = env_lock();
        let temp_dir = tempfile::tempdir().unwrap();
        let socket_path = temp_dir.path().join("absent.sock");
        let _socket_guard = EnvGuard::set(SOCKET_ENV, socket_path.to_str().unwrap());

        assert!(matches!(get_status(), Err(HookError::Connect { .. })));
    }

    #[test]
    fn event_ids_are_unique() {
        assert_ne!(make_event_id(1), make_event_id(1));
    }
}
