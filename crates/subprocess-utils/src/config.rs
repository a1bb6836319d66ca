//! YAML-backed settings for the runner, retry executor, dispatcher and terminator

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::command::{Command, DEFAULT_SHELL};
use crate::error::ConfigError;
use crate::parallel::get_parallel_threads;
use crate::retry::RetryPolicy;
use crate::terminate::{ProcessTreeTerminator, TerminationPolicy};

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Root configuration structure
///
/// Every field has a default, so an empty document is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecConfig {
    /// Shell used for shell-form commands
    pub shell: PathBuf,

    /// Worker count for the parallel dispatcher
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_threads: Option<usize>,

    /// Default retry policy
    pub retry: RetryPolicy,

    /// Process tree termination timing
    pub termination: TerminationPolicy,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            shell: PathBuf::from(DEFAULT_SHELL),
            parallel_threads: None,
            retry: RetryPolicy::default(),
            termination: TerminationPolicy::default(),
        }
    }
}

impl ExecConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: ExecConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Check values that deserialize fine but cannot be used
    pub fn validate(&self) -> Result<()> {
        if self.shell.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "shell must not be empty".to_string(),
            ));
        }
        if self.parallel_threads == Some(0) {
            return Err(ConfigError::ValidationError(
                "parallel_threads must be at least 1".to_string(),
            ));
        }
        if self.termination.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "termination.poll_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// A shell-form command that runs under the configured shell
    pub fn shell_command<S: Into<String>>(&self, text: S) -> Command {
        Command::shell(text).executable(&self.shell)
    }

    /// Worker count for the parallel dispatcher
    pub fn threads(&self) -> usize {
        self.parallel_threads.unwrap_or_else(get_parallel_threads)
    }

    /// A terminator for the local host using the configured timing
    pub fn terminator(&self) -> ProcessTreeTerminator {
        ProcessTreeTerminator::new(self.termination)
    }
}
