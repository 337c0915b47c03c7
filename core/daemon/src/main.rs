//! vault-presence daemon entrypoint.
//!
//! A small, single-writer service that mirrors vault activity into Discord
//! rich presence. One event loop owns all state; the socket server and the
//! session worker only talk to it through channels.

use clap::Parser;
use std::env;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::net::UnixListener;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod driver;
mod server;
mod transport;
mod worker;

use config::DaemonConfig;
use driver::{Daemon, DaemonPaths};
use server::PendingRequest;

const REQUEST_QUEUE_DEPTH: usize = 64;
const SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(name = "vault-presence-daemon")]
#[command(about = "Mirror vault activity into Discord rich presence")]
#[command(version)]
struct Args {
    /// Runtime config (defaults to ~/.vault-presence/daemon.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Socket path (defaults to $VAULT_PRESENCE_SOCKET or ~/.vault-presence/daemon.sock)
    #[arg(long)]
    socket: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_logging();
    let args = Args::parse();

    if let Err(err) = run(args).await {
        error!(error = %err, "Presence daemon failed");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), String> {
    let config = load_runtime_config(args.config)?;
    info!(
        transport = ?config.transport,
        refresh_secs = config.refresh.interval_secs,
        max_retries = config.connection.max_retries,
        retry_delay_ms = config.connection.retry_delay_ms,
        login_timeout_ms = config.connection.login_timeout_ms,
        "Daemon config loaded"
    );

    let socket_path = match args.socket {
        Some(path) => path,
        None => presence_core::resolve_socket_path()
            .ok_or_else(|| "Home directory not found".to_string())?,
    };
    server::prepare_socket_dir(&socket_path)?;
    server::remove_existing_socket(&socket_path)?;
    let listener = UnixListener::bind(&socket_path)
        .map_err(|err| format!("Failed to bind {}: {}", socket_path.display(), err))?;
    info!(path = %socket_path.display(), "Presence daemon started");

    let paths = DaemonPaths {
        settings: presence_core::get_settings_path(),
        status: presence_core::get_status_path(),
    };
    let settings = presence_core::load_settings();

    let (request_tx, mut request_rx) = mpsc::channel::<PendingRequest>(REQUEST_QUEUE_DEPTH);
    let (signal_tx, mut signal_rx) = mpsc::unbounded_channel();
    let server_task = tokio::spawn(server::serve(listener, request_tx));

    let transport_config = config.clone();
    let mut daemon = Daemon::new(
        settings,
        paths,
        config.retry_policy(),
        Box::new(move || transport::make_transport(&transport_config)),
        signal_tx,
    );
    daemon.start();

    let mut refresh = tokio::time::interval(config.refresh_interval());
    refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; connecting already refreshes.
    refresh.tick().await;

    let mut terminate = signal(SignalKind::terminate())
        .map_err(|err| format!("Failed to install SIGTERM handler: {}", err))?;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let retry_at = daemon.retry_deadline();
        let login_at = daemon.login_deadline();
        tokio::select! {
            Some(pending) = request_rx.recv() => {
                let response = daemon.handle_request(pending.request);
                let _ = pending.reply.send(response);
                if daemon.shutdown_requested() {
                    info!("Shutdown requested over the socket");
                    break;
                }
            }
            Some((session, transport_signal)) = signal_rx.recv() => {
                daemon.handle_signal(session, transport_signal);
            }
            _ = refresh.tick() => daemon.refresh_tick(),
            _ = sleep_until(retry_at) => daemon.fire_retry(Instant::now()),
            _ = sleep_until(login_at) => daemon.fire_login_timeout(Instant::now()),
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
            _ = terminate.recv() => {
                info!("Terminated");
                break;
            }
        }
    }

    // Let connection tasks flush responses already handed back.
    tokio::time::sleep(SHUTDOWN_GRACE).await;
    server_task.abort();
    daemon.shutdown();

    if let Err(err) = server::remove_existing_socket(&socket_path) {
        warn!(error = %err, "Failed to clean up socket");
    }
    info!("Presence daemon stopped");
    Ok(())
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending::<()>().await,
    }
}

fn load_runtime_config(path: Option<PathBuf>) -> Result<DaemonConfig, String> {
    let path = match path {
        Some(path) => path,
        None => config::default_config_path()?,
    };
    let mut config = match config::load_config(&path) {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %err, "Failed to load daemon config; using defaults");
            DaemonConfig::default()
        }
    };
    config.apply_env_overrides();
    Ok(config)
}

fn init_logging() {
    let debug_enabled = env::var("VAULT_PRESENCE_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
