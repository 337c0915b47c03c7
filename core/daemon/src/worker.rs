//! Session worker: one thread per session handle.
//!
//! The IPC client blocks, so each session runs its transport on a dedicated
//! thread. Commands are processed strictly in the order they were sent, which
//! is what serializes presence updates; completions go back to the event loop
//! as `(SessionId, TransportSignal)` pairs and never touch daemon state here.

use presence_core::{PresencePayload, SessionId, TransportSignal};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::transport::PresenceTransport;

pub type SessionSignal = (SessionId, TransportSignal);

#[derive(Debug)]
pub enum WorkerCommand {
    Login,
    SetActivity(PresencePayload),
    Destroy,
}

pub struct SessionWorker {
    id: SessionId,
    commands: mpsc::Sender<WorkerCommand>,
    /// Closed when the worker thread exits, including by panic.
    done: mpsc::Receiver<()>,
    handle: Option<JoinHandle<()>>,
}

impl SessionWorker {
    pub fn spawn(
        id: SessionId,
        transport: Box<dyn PresenceTransport>,
        signals: UnboundedSender<SessionSignal>,
    ) -> std::io::Result<Self> {
        let (commands, receiver) = mpsc::channel();
        let (finished, done) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name(format!("presence-session-{}", id.0))
            .spawn(move || {
                let _finished = finished;
                run_worker(id, transport, receiver, signals);
            })?;

        Ok(Self {
            id,
            commands,
            done,
            handle: Some(handle),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Queues a command. Returns false if the worker has already exited.
    pub fn send(&self, command: WorkerCommand) -> bool {
        self.commands.send(command).is_ok()
    }

    /// Asks the worker to destroy its session without waiting for it. Any
    /// destroy failure still arrives as a signal.
    pub fn retire(mut self) {
        let _ = self.commands.send(WorkerCommand::Destroy);
        self.handle.take();
    }

    /// Asks the worker to destroy its session and waits up to `timeout` for
    /// the thread to finish. Never blocks longer than that.
    pub fn shutdown(mut self, timeout: Duration) {
        let _ = self.commands.send(WorkerCommand::Destroy);
        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => return,
        };

        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                let _ = handle.join();
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!(session = self.id.0, "Session worker did not finish before shutdown");
            }
        }
    }
}

fn run_worker(
    id: SessionId,
    mut transport: Box<dyn PresenceTransport>,
    commands: mpsc::Receiver<WorkerCommand>,
    signals: UnboundedSender<SessionSignal>,
) {
    let emit = |signal: TransportSignal| {
        let _ = signals.send((id, signal));
    };

    while let Ok(command) = commands.recv() {
        match command {
            WorkerCommand::Login => match transport.login() {
                Ok(()) => emit(TransportSignal::LoginSucceeded),
                Err(err) => emit(TransportSignal::LoginFailed(err.to_string())),
            },
            WorkerCommand::SetActivity(payload) => match transport.set_activity(&payload) {
                Ok(()) => emit(TransportSignal::SendSucceeded),
                Err(err) => {
                    let dropped = err.is_disconnect();
                    emit(TransportSignal::SendFailed(err.to_string()));
                    if dropped {
                        emit(TransportSignal::Dropped(Some(err.to_string())));
                    }
                }
            },
            WorkerCommand::Destroy => {
                if let Err(err) = transport.destroy() {
                    emit(TransportSignal::DestroyFailed(err.to_string()));
                }
                debug!(session = id.0, "Session worker finished");
                return;
            }
        }
    }

    // Sender dropped without an explicit destroy.
    if let Err(err) = transport.destroy() {
        emit(TransportSignal::DestroyFailed(err.to_string()));
    }
}
