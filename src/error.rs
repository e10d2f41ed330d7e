//! Error types for shell-bot
//!
//! Uses `thiserror` for ergonomic error definitions with automatic `Display` and `Error` impls.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for shell-bot
#[derive(Error, Debug)]
pub enum Error {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Tmux error: {0}")]
    Tmux(#[from] TmuxError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error must abort startup before any daemon runs
    pub fn is_fatal_startup(&self) -> bool {
        matches!(
            self,
            Error::Tmux(TmuxError::NotInstalled) | Error::Session(SessionError::InvalidName { .. })
        )
    }
}

/// Session lifecycle errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid session name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("No running process")]
    NotRunning,

    #[error("Failed to start session: {0}")]
    StartFailed(String),

    #[error("Failed to spawn process '{command}': {reason}")]
    SpawnFailed { command: String, reason: String },
}

/// Tmux integration errors
#[derive(Error, Debug)]
pub enum TmuxError {
    #[error("Tmux is not installed or not in PATH")]
    NotInstalled,

    #[error("Tmux command failed: {command} - {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Failed to capture pane content: {0}")]
    CaptureFailed(String),

    #[error("Session '{0}' not found in tmux")]
    SessionNotFound(String),

    #[error("Tmux command timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Failed to parse tmux output: {0}")]
    ParseError(String),

    #[error("Semaphore acquire failed")]
    SemaphoreError,
}

/// Remote chat transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("No bot token configured")]
    MissingToken,

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("API call '{method}' rejected: {description}")]
    Api { method: String, description: String },

    /// The edited text is identical to what the message already shows
    #[error("Message is not modified")]
    NotModified,

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Failed to download file: {0}")]
    Download(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError::Http(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(TransportError::Http(e.to_string()))
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),

    #[error("Invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("Failed to create config directory: {0}")]
    DirectoryCreationFailed(PathBuf),
}

/// Result type alias using our error type
pub type Result<T> = std::result::Result<T, Error>;
