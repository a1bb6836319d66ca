//! Retry executor for commands known to fail transiently

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::Result;
use crate::log_runner::LogRunner;
use crate::runner::CommandResult;

/// Log destination used for retried commands; only the captured outputs matter
pub const RETRY_LOG_PATH: &str = "/dev/null";

/// When a failed command is worth running again
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    pub max_retry: u32,
    /// Return codes that trigger a retry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_on_returncodes: Option<BTreeSet<i32>>,
    /// Substrings of stderr that trigger a retry
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_on_stderr_substrings: Option<Vec<String>>,
    /// Upper bound (exclusive) of the random delay before a retry, in milliseconds
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retry: 3,
            retry_on_returncodes: None,
            retry_on_stderr_substrings: None,
            max_backoff_ms: 2000,
        }
    }
}

/// What to do after an attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// The result does not match the policy; return it
    Done,
    /// The retry budget is spent; return the last result
    Exhausted,
    /// Retry because of this return code
    RetryOnReturnCode(i32),
    /// Retry because stderr contained this substring
    RetryOnStderr(String),
}

impl RetryPolicy {
    /// Create a policy allowing `max_retry` retries and no retry triggers
    pub fn new(max_retry: u32) -> Self {
        Self {
            max_retry,
            ..Self::default()
        }
    }

    /// Retry when the command exits with one of these codes
    pub fn on_returncodes<I: IntoIterator<Item = i32>>(mut self, codes: I) -> Self {
        self.retry_on_returncodes = Some(codes.into_iter().collect());
        self
    }

    /// Retry when stderr contains any of these substrings
    pub fn on_stderr<I, S>(mut self, substrings: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.retry_on_stderr_substrings = Some(substrings.into_iter().map(Into::into).collect());
        self
    }

    /// Set the upper bound of the random delay between attempts
    pub fn max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff_ms = max_backoff.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    /// Decide what follows an attempt, given how many retries were already made.
    ///
    /// The return-code trigger is checked before the stderr trigger.
    pub fn decide(&self, retries: u32, result: &CommandResult) -> RetryDecision {
        if retries >= self.max_retry {
            return RetryDecision::Exhausted;
        }

        if let Some(codes) = &self.retry_on_returncodes {
            if codes.contains(&result.return_code) {
                return RetryDecision::RetryOnReturnCode(result.return_code);
            }
        }

        if let Some(substrings) = &self.retry_on_stderr_substrings {
            let stderr = result.stderr_str();
            if let Some(hit) = substrings.iter().find(|s| stderr.contains(s.as_str())) {
                return RetryDecision::RetryOnStderr(hit.clone());
            }
        }

        RetryDecision::Done
    }

    fn jitter(&self) -> Duration {
        if self.max_backoff_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..self.max_backoff_ms))
    }
}

/// Run a command through `runner`, retrying while `policy` asks for it.
///
/// Returns the last attempt's result whether or not it succeeded; turning a
/// failure into an error is left to the caller (see
/// [`handle_returncode`](crate::handle_returncode)). Only errors from the
/// runner itself are propagated.
pub async fn run_with_retries<R>(
    runner: &R,
    command: &str,
    policy: &RetryPolicy,
) -> Result<CommandResult>
where
    R: LogRunner + ?Sized,
{
    let mut retries = 0;
    loop {
        let result = runner
            .run_with_log(command, Path::new(RETRY_LOG_PATH), true, true)
            .await?;

        match policy.decide(retries, &result) {
            RetryDecision::Done | RetryDecision::Exhausted => return Ok(result),
            RetryDecision::RetryOnReturnCode(code) => {
                debug!(command, return_code = code, "Retrying command due to returncode");
            }
            RetryDecision::RetryOnStderr(pattern) => {
                debug!(command, %pattern, "Retrying command due to stderr");
            }
        }

        retries += 1;
        async_io::Timer::after(policy.jitter()).await;
    }
}
