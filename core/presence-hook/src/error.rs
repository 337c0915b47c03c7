//! Errors surfaced by the hook.

#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to reach daemon at {socket}: {source}")]
    Connect {
        socket: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Daemon I/O failed: {0}")]
    Transport(String),

    #[error("Daemon rejected request: {code}: {message}")]
    Rejected { code: String, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, HookError>;
