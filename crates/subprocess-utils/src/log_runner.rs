//! Logged command execution consumed by the retry executor

use async_trait::async_trait;
use futures_lite::io::AsyncWriteExt;
use std::path::Path;
use tracing::debug;

use crate::command::Command;
use crate::error::Result;
use crate::runner::{self, CommandResult};

/// Runs a command and records its output to a log destination
#[async_trait]
pub trait LogRunner: Send + Sync {
    /// Run `command`, writing its output to `log_path`.
    ///
    /// Streams are returned in the result only when `require_outputs` is
    /// set. A nonzero exit is reported through the return code, never as an
    /// error; errors mean the command could not be run at all.
    async fn run_with_log(
        &self,
        command: &str,
        log_path: &Path,
        require_outputs: bool,
        shell: bool,
    ) -> Result<CommandResult>;
}

/// [`LogRunner`] that appends the command's output to a file
#[derive(Debug, Clone, Default)]
pub struct FileLogRunner {
    shell: Option<std::path::PathBuf>,
}

impl FileLogRunner {
    /// Create a runner using the default shell
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different shell executable for shell-form commands
    pub fn with_shell<P: AsRef<Path>>(mut self, shell: P) -> Self {
        self.shell = Some(shell.as_ref().to_owned());
        self
    }
}

#[async_trait]
impl LogRunner for FileLogRunner {
    async fn run_with_log(
        &self,
        command: &str,
        log_path: &Path,
        require_outputs: bool,
        shell: bool,
    ) -> Result<CommandResult> {
        let mut cmd = Command::shell(command)
            .use_shell(shell)
            .check(false)
            .capture();
        if let Some(executable) = &self.shell {
            cmd = cmd.executable(executable);
        }

        let result = runner::run(&cmd).await?;
        append_log(log_path, &result).await?;
        debug!(
            command,
            log = %log_path.display(),
            return_code = result.return_code,
            "Logged command finished"
        );

        if require_outputs {
            Ok(result)
        } else {
            Ok(CommandResult::new(result.return_code, None, None))
        }
    }
}

async fn append_log(log_path: &Path, result: &CommandResult) -> Result<()> {
    if let Some(parent) = log_path.parent() {
        if !parent.as_os_str().is_empty() {
            async_fs::create_dir_all(parent).await?;
        }
    }

    let mut file = async_fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .await?;
    file.write_all(result.stdout_str().as_bytes()).await?;
    file.write_all(result.stderr_str().as_bytes()).await?;
    file.flush().await?;
    Ok(())
}
