//! File logging for the hook.
//!
//! The hook runs inside editor callbacks, so it never writes diagnostics to
//! stdout or stderr. Logs go to a daily rolling file under
//! `~/.vault-presence/logs`.

use fs_err as fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_DIR_NAME: &str = "logs";
const LOG_FILE_PREFIX: &str = "presence-hook.log";
const DEBUG_ENV: &str = "VAULT_PRESENCE_DEBUG_LOG";

/// Installs the file subscriber. The returned guard flushes on drop, so keep
/// it alive for the whole process. Returns `None` when no log directory is
/// available; the hook then runs without logging.
pub fn init() -> Option<WorkerGuard> {
    let log_dir = presence_core::get_presence_dir()?.join(LOG_DIR_NAME);
    if fs::create_dir_all(&log_dir).is_err() {
        return None;
    }

    let appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let debug_enabled = std::env::var(DEBUG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .ok()?;

    Some(guard)
}
