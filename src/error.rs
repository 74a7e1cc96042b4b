/// Error types
/// Internal failures of the streaming core. Flattened to `String` at the
/// Tauri IPC boundary.

use crate::models::RunStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("{0} is not mounted")]
    NotMounted(String),
    #[error("failed to start command: {0}")]
    Spawn(String),
    #[error("cannot {action} while session is {from:?}")]
    InvalidTransition { from: RunStatus, action: &'static str },
    #[error("failed to emit on {channel}: {message}")]
    Emit { channel: String, message: String },
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ShellError>;
