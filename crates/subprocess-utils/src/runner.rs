//! Command runner: spawn one child, wait for it, optionally check its exit

use futures_lite::io::{AsyncRead, AsyncReadExt};
use std::process::ExitStatus;
use tracing::debug;

use crate::command::{Command, Redirect};
use crate::error::{CommandError, Error, Result};

/// Outcome of a single command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Exit code; `-N` when the child was killed by signal `N`
    pub return_code: i32,
    /// Captured standard output, if it was captured
    pub stdout: Option<String>,
    /// Captured standard error, if it was captured
    pub stderr: Option<String>,
}

impl CommandResult {
    /// Create a new result
    pub fn new(return_code: i32, stdout: Option<String>, stderr: Option<String>) -> Self {
        Self {
            return_code,
            stdout,
            stderr,
        }
    }

    /// Returns true if the command exited with code 0
    pub fn success(&self) -> bool {
        self.return_code == 0
    }

    /// Captured stderr, or the empty string when nothing was captured
    pub fn stderr_str(&self) -> &str {
        self.stderr.as_deref().unwrap_or("")
    }

    /// Captured stdout, or the empty string when nothing was captured
    pub fn stdout_str(&self) -> &str {
        self.stdout.as_deref().unwrap_or("")
    }
}

/// Run a command to completion.
///
/// The returned future resolves only once the child has exited; there is no
/// timeout. A child that outlives a torn-down caller must be reaped with
/// [`kill_children_processes`](crate::kill_children_processes).
///
/// With `check` enabled a nonzero return code becomes
/// [`Error::Command`] carrying the code, the command text and any captured
/// stderr.
pub async fn run(command: &Command) -> Result<CommandResult> {
    let mut cmd = command.prepare()?;
    let text = command.display();
    debug!(command = %text, shell = command.is_shell(), "Running command");

    let mut child = cmd
        .spawn()
        .map_err(|e| Error::spawn_failed(format!("Failed to spawn `{}`: {}", text, e)))?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let (status, stdout, stderr) =
        futures::try_join!(child.status(), read_stream(stdout), read_stream(stderr))?;

    let result = CommandResult::new(return_code(status), stdout, stderr);
    debug!(command = %text, return_code = result.return_code, "Command finished");

    if command.is_checked() && !result.success() {
        return Err(CommandError::new(
            result.return_code,
            text,
            format!("process exited with return code {}", result.return_code),
            result.stderr,
        )
        .into());
    }
    Ok(result)
}

/// Run a command with both output streams discarded
pub async fn run_no_outputs(command: Command) -> Result<CommandResult> {
    run(&command.stdout(Redirect::Null).stderr(Redirect::Null)).await
}

async fn read_stream<R>(stream: Option<R>) -> std::io::Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    let Some(mut stream) = stream else {
        return Ok(None);
    };
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

fn return_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_returns_result() {
        futures::executor::block_on(async {
            let result = run(&Command::shell("echo hello").capture()).await.unwrap();
            assert!(result.success());
            assert_eq!(result.stdout.as_deref(), Some("hello\n"));
            assert_eq!(result.stderr.as_deref(), Some(""));
        });
    }

    #[test]
    fn test_uncaptured_streams_are_absent() {
        futures::executor::block_on(async {
            let result = run(&Command::shell("true")).await.unwrap();
            assert_eq!(result.return_code, 0);
            assert_eq!(result.stdout, None);
            assert_eq!(result.stderr, None);
        });
    }

    #[test]
    fn test_checked_failure_carries_return_code() {
        futures::executor::block_on(async {
            let err = run(&Command::shell("echo oops >&2; exit 3").capture())
                .await
                .unwrap_err();
            match err {
                Error::Command(err) => {
                    assert_eq!(err.return_code, 3);
                    assert_eq!(err.command, "echo oops >&2; exit 3");
                    assert_eq!(err.stderr.as_deref(), Some("oops\n"));
                }
                other => panic!("unexpected error: {other}"),
            }
        });
    }

    #[test]
    fn test_unchecked_failure_returns_result() {
        futures::executor::block_on(async {
            let result = run(&Command::shell("exit 5").check(false)).await.unwrap();
            assert_eq!(result.return_code, 5);
        });
    }

    #[cfg(unix)]
    #[test]
    fn test_signal_exit_is_negative() {
        futures::executor::block_on(async {
            let result = run(&Command::shell("kill -9 $$").check(false))
                .await
                .unwrap();
            assert_eq!(result.return_code, -9);
        });
    }

    #[test]
    fn test_argv_command() {
        futures::executor::block_on(async {
            let result = run(&Command::argv(["echo", "a b"]).capture()).await.unwrap();
            assert_eq!(result.stdout_str(), "a b\n");
        });
    }

    #[test]
    fn test_run_no_outputs() {
        futures::executor::block_on(async {
            let result = run_no_outputs(Command::shell("echo discarded; echo gone >&2"))
                .await
                .unwrap();
            assert!(result.success());
            assert_eq!(result.stdout, None);
            assert_eq!(result.stderr, None);
        });
    }

    #[test]
    fn test_missing_program_fails_to_spawn() {
        futures::executor::block_on(async {
            let err = run(&Command::argv(["this_command_does_not_exist_12345"]))
                .await
                .unwrap_err();
            assert!(matches!(err, Error::SpawnFailed { .. }));
        });
    }
}
