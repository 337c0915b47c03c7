//! presence-hook: reports vault activity to the vault-presence daemon.
//!
//! Called from editor hooks and shell aliases. Event subcommands never fail
//! loudly so they cannot disrupt the editor; commands print the daemon's answer
//! and exit non-zero on failure.
//!
//! ## Subcommands
//!
//! - `vault-open`, `file-open`, `file-close`, `activity`: host events
//! - `reconnect`, `toggle-privacy`: user commands
//! - `status`, `set`, `shutdown`: inspection and settings

mod daemon_client;
mod error;
mod logging;

use clap::{Parser, Subcommand};
use daemon_client::EventContext;
use error::{HookError, Result};
use presence_core::Settings;
use serde_json::Value;
use vault_presence_protocol::{CommandKind, EventType};

#[derive(Parser)]
#[command(name = "presence-hook")]
#[command(about = "Report vault activity to the presence daemon")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// A vault was opened or switched to
    VaultOpen {
        /// Vault name
        #[arg(value_name = "NAME")]
        name: String,
    },

    /// A file became the active document
    FileOpen {
        /// Vault-relative path of the file
        #[arg(value_name = "PATH")]
        path: String,

        /// Vault the file belongs to
        #[arg(long)]
        vault: Option<String>,

        /// File creation time in epoch milliseconds
        #[arg(long)]
        created: Option<i64>,
    },

    /// The active file was closed
    FileClose,

    /// User input (keeps the presence out of idle)
    Activity,

    /// Reset the retry budget and reconnect to Discord
    Reconnect,

    /// Flip privacy mode
    TogglePrivacy,

    /// Print the daemon status as JSON
    Status,

    /// Change one setting (text settings take VALUE verbatim; others parse it as JSON)
    Set {
        #[arg(value_name = "KEY")]
        key: String,

        #[arg(value_name = "VALUE")]
        value: String,
    },

    /// Stop the daemon
    Shutdown,
}

fn main() {
    let _logging_guard = logging::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::VaultOpen { name } => report_event(
            EventType::VaultOpen,
            EventContext {
                vault: Some(name),
                ..EventContext::default()
            },
        ),
        Commands::FileOpen {
            path,
            vault,
            created,
        } => report_event(
            EventType::FileOpen,
            EventContext {
                vault,
                file_path: Some(path),
                file_created: created,
            },
        ),
        Commands::FileClose => report_event(EventType::FileClose, EventContext::default()),
        Commands::Activity => report_event(EventType::Activity, EventContext::default()),
        Commands::Reconnect => {
            print_result(daemon_client::send_command(CommandKind::Reconnect))
        }
        Commands::TogglePrivacy => {
            print_result(daemon_client::send_command(CommandKind::TogglePrivacy))
        }
        Commands::Status => print_result(daemon_client::get_status()),
        Commands::Set { key, value } => {
            print_result(settings_patch(&key, &value).and_then(daemon_client::update_settings))
        }
        Commands::Shutdown => print_result(daemon_client::shutdown()),
    }
}

/// Events are best effort: log and exit 0 so editor hooks never fail.
fn report_event(event_type: EventType, context: EventContext) {
    if let Err(e) = daemon_client::send_event(event_type, context) {
        tracing::warn!(error = %e, event_type = ?event_type, "presence-hook event failed");
    }
}

fn print_result(result: Result<Value>) {
    match result {
        Ok(data) => {
            let rendered = serde_json::to_string_pretty(&data).unwrap_or_else(|_| data.to_string());
            println!("{}", rendered);
        }
        Err(e) => {
            tracing::error!(error = %e, "presence-hook command failed");
            eprintln!("presence-hook: {}", e);
            std::process::exit(1);
        }
    }
}

/// Builds a one-key settings patch. Text settings always get a string, so
/// `set state 5` stores `"5"`; a quoted value is unquoted. For other keys
/// `true`, `5` and quoted strings parse as JSON and anything else is sent as
/// a plain string for the daemon to validate.
fn settings_patch(key: &str, raw: &str) -> Result<Value> {
    let key = key.trim();
    if key.is_empty() {
        return Err(HookError::InvalidArgument(
            "setting key must not be empty".to_string(),
        ));
    }
    let parsed = serde_json::from_str::<Value>(raw);
    let value = if is_text_setting(key) {
        match parsed {
            Ok(Value::String(text)) => Value::String(text),
            _ => Value::String(raw.to_string()),
        }
    } else {
        match parsed {
            Ok(value @ (Value::Bool(_) | Value::Number(_) | Value::String(_))) => value,
            _ => Value::String(raw.to_string()),
        }
    };
    let mut patch = serde_json::Map::new();
    patch.insert(key.to_string(), value);
    Ok(Value::Object(patch))
}

/// Whether `key` names a string-valued setting, judged by its default.
fn is_text_setting(key: &str) -> bool {
    serde_json::to_value(Settings::default())
        .ok()
        .and_then(|defaults| defaults.get(key).map(Value::is_string))
        .unwrap_or(false)
}
