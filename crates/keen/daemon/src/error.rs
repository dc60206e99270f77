//! Error types for keen-daemon.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Reading commands or writing replies failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The coordinator refused to start.
    #[error("Coordinator error: {0}")]
    Coordinator(#[from] keen_coordinator::KeenError),
}

impl From<config::ConfigError> for DaemonError {
    fn from(err: config::ConfigError) -> Self {
        DaemonError::Config(err.to_string())
    }
}

pub type DaemonResult<T> = Result<T, DaemonError>;
