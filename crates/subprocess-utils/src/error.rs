//! Error types for running and reaping subprocesses

use thiserror::Error;

/// Unified error type for subprocess operations
#[derive(Error, Debug)]
pub enum Error {
    /// A checked command exited with a nonzero return code
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Failed to spawn a process
    #[error("failed to spawn process: {reason}")]
    SpawnFailed {
        /// The reason for the spawn failure
        reason: String,
    },

    /// Failed to send signal to process
    #[error("failed to send signal {signal}: {reason}")]
    SignalFailed {
        /// The signal number that failed to send
        signal: i32,
        /// The reason for the signal failure
        reason: String,
    },

    /// The command could not be turned into a process invocation
    #[error("invalid command: {reason}")]
    InvalidCommand {
        /// Why the command was rejected
        reason: String,
    },

    /// Configuration could not be loaded or is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a spawn failed error
    pub fn spawn_failed(reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            reason: reason.into(),
        }
    }

    /// Create a signal failed error
    pub fn signal_failed(signal: i32, reason: impl Into<String>) -> Self {
        Self::SignalFailed {
            signal,
            reason: reason.into(),
        }
    }

    /// Create an invalid command error
    pub fn invalid_command(reason: impl Into<String>) -> Self {
        Self::InvalidCommand {
            reason: reason.into(),
        }
    }

    /// The return code carried by a [`CommandError`], if this is one
    pub fn return_code(&self) -> Option<i32> {
        match self {
            Error::Command(err) => Some(err.return_code),
            _ => None,
        }
    }
}

/// A command finished with a nonzero return code
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Command {} failed with return code {return_code}.\n{message}", truncate_command(.command))]
pub struct CommandError {
    /// Return code observed for the command
    pub return_code: i32,
    /// The command text that was run
    pub command: String,
    /// Human readable summary of the failure
    pub message: String,
    /// Captured standard error, if any was collected
    pub stderr: Option<String>,
}

impl CommandError {
    /// Create a new command error
    pub fn new(
        return_code: i32,
        command: impl Into<String>,
        message: impl Into<String>,
        stderr: Option<String>,
    ) -> Self {
        Self {
            return_code,
            command: command.into(),
            message: message.into(),
            stderr,
        }
    }
}

const MAX_COMMAND_DISPLAY: usize = 100;

// Long generated commands would otherwise drown the message.
fn truncate_command(command: &str) -> String {
    if command.chars().count() <= MAX_COMMAND_DISPLAY {
        return command.to_string();
    }
    let head: String = command.chars().take(MAX_COMMAND_DISPLAY).collect();
    format!("{head}...")
}

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse YAML
    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
