//! Process execution and lifecycle utilities
//!
//! Building blocks an orchestration tool uses to run shell commands, retry
//! the flaky ones, fan work out over a bounded pool, and reliably kill every
//! process it spawned (grandchildren included) during cleanup.
//!
//! Everything that waits on a child is an `async fn` that any executor can
//! drive; nothing here installs a tracing subscriber.

#![warn(missing_docs)]

pub mod command;
pub mod config;
pub mod error;
pub mod log_runner;
pub mod parallel;
pub mod process;
pub mod retry;
pub mod returncode;
pub mod runner;
pub mod terminate;

pub use command::{Command, CommandLine, DEFAULT_SHELL, Redirect};
pub use config::ExecConfig;
pub use error::{CommandError, ConfigError, Error, Result};
pub use log_runner::{FileLogRunner, LogRunner};
pub use parallel::{get_parallel_threads, run_in_parallel, run_in_parallel_blocking};
pub use process::{ProcessHandle, ProcessTable, SystemProcess, SystemProcessTable, TermSignal};
pub use retry::{RetryDecision, RetryPolicy, run_with_retries};
pub use returncode::{ErrorMessage, handle_returncode};
pub use runner::{CommandResult, run, run_no_outputs};
pub use terminate::{KillTarget, ProcessTreeTerminator, TerminationPolicy, kill_children_processes};
