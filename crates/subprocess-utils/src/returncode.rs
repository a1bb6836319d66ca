//! Turning a return code into success or a highlighted [`CommandError`]

use colored::Colorize;
use std::fmt;
use tracing::{debug, error};

use crate::error::{CommandError, Result};

/// Message reported when a command fails.
///
/// Either literal text or a closure that is only evaluated on the failure
/// path, so expensive formatting costs nothing when the command succeeds.
pub enum ErrorMessage {
    /// Ready-made text
    Text(String),
    /// Text produced on demand
    Lazy(Box<dyn FnOnce() -> String + Send>),
}

impl ErrorMessage {
    /// Defer building the message until a failure is observed
    pub fn lazy<F>(f: F) -> Self
    where
        F: FnOnce() -> String + Send + 'static,
    {
        ErrorMessage::Lazy(Box::new(f))
    }

    /// Produce the message text
    pub fn resolve(self) -> String {
        match self {
            ErrorMessage::Text(text) => text,
            ErrorMessage::Lazy(f) => f(),
        }
    }
}

impl fmt::Debug for ErrorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorMessage::Text(text) => f.debug_tuple("Text").field(text).finish(),
            ErrorMessage::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

impl From<String> for ErrorMessage {
    fn from(text: String) -> Self {
        ErrorMessage::Text(text)
    }
}

impl From<&str> for ErrorMessage {
    fn from(text: &str) -> Self {
        ErrorMessage::Text(text.to_string())
    }
}

/// Check the return code of a finished command.
///
/// Zero is a no-op. Otherwise the captured `stderr` is logged (at error level
/// when `stream_logs` is set, at debug level when it is not), the message is
/// resolved and highlighted, and a [`CommandError`] is returned.
pub fn handle_returncode(
    return_code: i32,
    command: &str,
    error_msg: impl Into<ErrorMessage>,
    stderr: Option<&str>,
    stream_logs: bool,
) -> Result<()> {
    if return_code == 0 {
        return Ok(());
    }

    if let Some(stderr) = stderr {
        if stream_logs {
            error!("{}", stderr);
        } else {
            debug!("{}", stderr);
        }
    }

    let message = error_msg.into().resolve();
    Err(CommandError::new(
        return_code,
        command,
        message.red().to_string(),
        stderr.map(str::to_string),
    )
    .into())
}
