//! Unix socket front end.
//!
//! Each connection carries exactly one newline-terminated JSON request. The
//! connection task parses it and forwards it to the event loop, which owns all
//! state and sends the response back through a oneshot channel.

use fs_err as fs;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use vault_presence_protocol::{ErrorInfo, Request, Response, MAX_REQUEST_BYTES};

const READ_TIMEOUT_SECS: u64 = 2;
const READ_CHUNK_SIZE: usize = 4096;

/// A parsed request waiting for the event loop.
pub struct PendingRequest {
    pub request: Request,
    pub reply: oneshot::Sender<Response>,
}

pub fn prepare_socket_dir(socket_path: &Path) -> Result<(), String> {
    let parent = socket_path
        .parent()
        .ok_or_else(|| "Socket path has no parent".to_string())?;
    fs::create_dir_all(parent).map_err(|err| format!("Failed to create socket directory: {}", err))
}

pub fn remove_existing_socket(socket_path: &Path) -> Result<(), String> {
    if socket_path.exists() {
        fs::remove_file(socket_path)
            .map_err(|err| format!("Failed to remove existing socket: {}", err))?;
    }
    Ok(())
}

/// Accepts connections until the listener fails or the loop goes away.
pub async fn serve(listener: UnixListener, requests: mpsc::Sender<PendingRequest>) {
    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let requests = requests.clone();
                tokio::spawn(handle_connection(stream, requests));
            }
            Err(err) => {
                warn!(error = %err, "Failed to accept daemon connection");
            }
        }
        if requests.is_closed() {
            debug!("Event loop gone; socket server stopping");
            return;
        }
    }
}

async fn handle_connection(mut stream: UnixStream, requests: mpsc::Sender<PendingRequest>) {
    let request = match read_request(&mut stream).await {
        Ok(request) => request,
        Err(err) => {
            warn!(code = %err.code, message = %err.message, "Failed to read request");
            let response = Response::error_with_info(None, err);
            let _ = write_response(&mut stream, response).await;
            return;
        }
    };

    debug!(method = ?request.method, id = ?request.id, "Daemon request received");
    let id = request.id.clone();
    let (reply, response) = oneshot::channel();
    if requests.send(PendingRequest { request, reply }).await.is_err() {
        let response = Response::error(id, "shutting_down", "daemon is shutting down");
        let _ = write_response(&mut stream, response).await;
        return;
    }

    let response = response
        .await
        .unwrap_or_else(|_| Response::error(id, "shutting_down", "daemon is shutting down"));
    let _ = write_response(&mut stream, response).await;
}

async fn read_request(stream: &mut UnixStream) -> Result<Request, ErrorInfo> {
    match tokio::time::timeout(
        Duration::from_secs(READ_TIMEOUT_SECS),
        read_request_bytes(stream),
    )
    .await
    {
        Ok(result) => parse_request(&result?),
        Err(_) => Err(ErrorInfo::new("read_timeout", "request timed out")),
    }
}

async fn read_request_bytes(stream: &mut UnixStream) -> Result<Vec<u8>, ErrorInfo> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_REQUEST_BYTES {
                    return Err(ErrorInfo::new(
                        "request_too_large",
                        "request exceeded maximum size",
                    ));
                }
                if chunk[..n].contains(&b'\n') {
                    break;
                }
            }
            Err(err) => {
                return Err(ErrorInfo::new(
                    "read_error",
                    format!("failed to read request: {}", err),
                ));
            }
        }
    }
    Ok(buffer)
}

fn parse_request(buffer: &[u8]) -> Result<Request, ErrorInfo> {
    let request_bytes = match buffer.iter().position(|b| *b == b'\n') {
        Some(index) => {
            let trailing = &buffer[index + 1..];
            if trailing.iter().any(|b| !b.is_ascii_whitespace()) {
                warn!("Extra bytes detected after newline; ignoring trailing data");
            }
            &buffer[..index]
        }
        None => buffer,
    };

    if request_bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ErrorInfo::new("empty_request", "request body was empty"));
    }

    serde_json::from_slice(request_bytes).map_err(|err| {
        ErrorInfo::new(
            "invalid_json",
            format!("request was not valid JSON: {}", err),
        )
    })
}

async fn write_response(stream: &mut UnixStream, response: Response) -> Result<(), String> {
    let mut payload = serde_json::to_vec(&response)
        .map_err(|err| format!("Failed to serialize response: {}", err))?;
    payload.push(b'\n');
    stream
        .write_all(&payload)
        .await
        .map_err(|err| format!("Failed to write response: {}", err))?;
    stream
        .flush()
        .await
        .map_err(|err| format!("Failed to flush response: {}", err))
}
