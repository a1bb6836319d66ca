//! Tests for the retry executor

mod common;

use async_trait::async_trait;
use common::init_tracing;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use subprocess_utils::{
    CommandResult, Error, FileLogRunner, LogRunner, RetryPolicy, handle_returncode,
    run_with_retries,
};

/// Replays canned results and records every call
struct ScriptedRunner {
    results: Mutex<VecDeque<CommandResult>>,
    calls: Mutex<Vec<(String, PathBuf, bool, bool)>>,
}

impl ScriptedRunner {
    fn new(results: Vec<CommandResult>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn attempts(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LogRunner for ScriptedRunner {
    async fn run_with_log(
        &self,
        command: &str,
        log_path: &Path,
        require_outputs: bool,
        shell: bool,
    ) -> subprocess_utils::Result<CommandResult> {
        self.calls.lock().unwrap().push((
            command.to_string(),
            log_path.to_owned(),
            require_outputs,
            shell,
        ));
        let next = self.results.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| CommandResult::new(0, Some(String::new()), Some(String::new()))))
    }
}

fn code(return_code: i32) -> CommandResult {
    CommandResult::new(return_code, Some(String::new()), Some(String::new()))
}

fn stderr(return_code: i32, text: &str) -> CommandResult {
    CommandResult::new(return_code, Some(String::new()), Some(text.to_string()))
}

fn fast(policy: RetryPolicy) -> RetryPolicy {
    policy.max_backoff(Duration::from_millis(5))
}

#[smol_potat::test]
async fn test_retries_until_success() {
    init_tracing();
    let runner = ScriptedRunner::new(vec![code(1), code(1), code(0)]);
    let policy = fast(RetryPolicy::new(3).on_returncodes([1]));

    let result = run_with_retries(&runner, "flaky", &policy).await.unwrap();

    assert_eq!(result.return_code, 0);
    assert_eq!(runner.attempts(), 3);
    let calls = runner.calls.lock().unwrap();
    assert!(calls.iter().all(|(cmd, log, outputs, shell)| {
        cmd == "flaky" && log == Path::new("/dev/null") && *outputs && *shell
    }));
}

#[smol_potat::test]
async fn test_zero_budget_runs_once() {
    let runner = ScriptedRunner::new(vec![code(1), code(0)]);
    let policy = fast(
        RetryPolicy::new(0)
            .on_returncodes([1])
            .on_stderr(["anything"]),
    );

    let result = run_with_retries(&runner, "flaky", &policy).await.unwrap();

    assert_eq!(result.return_code, 1);
    assert_eq!(runner.attempts(), 1);
}

#[smol_potat::test]
async fn test_no_triggers_runs_once() {
    let runner = ScriptedRunner::new(vec![code(1), code(0)]);
    let result = run_with_retries(&runner, "flaky", &fast(RetryPolicy::new(5)))
        .await
        .unwrap();

    assert_eq!(result.return_code, 1);
    assert_eq!(runner.attempts(), 1);
}

#[smol_potat::test]
async fn test_exhausted_returns_last_failure() {
    let runner = ScriptedRunner::new(vec![code(255); 10]);
    let policy = fast(RetryPolicy::new(2).on_returncodes([255]));

    let result = run_with_retries(&runner, "ssh host true", &policy)
        .await
        .unwrap();

    assert_eq!(result.return_code, 255);
    assert_eq!(runner.attempts(), 3);

    // Callers turn the exhausted result into an error themselves.
    let err = handle_returncode(
        result.return_code,
        "ssh host true",
        "Failed to reach host",
        result.stderr.as_deref(),
        false,
    )
    .unwrap_err();
    assert_eq!(err.return_code(), Some(255));
}

#[smol_potat::test]
async fn test_retries_on_stderr_substring() {
    let runner = ScriptedRunner::new(vec![
        stderr(1, "ERROR: Rate limit exceeded, try later"),
        stderr(2, "fatal: connection reset by peer"),
        stderr(3, "permission denied"),
    ]);
    let policy = fast(RetryPolicy::new(5).on_stderr(["Rate limit", "connection reset"]));

    let result = run_with_retries(&runner, "upload", &policy).await.unwrap();

    assert_eq!(result.return_code, 3);
    assert_eq!(runner.attempts(), 3);
}

#[smol_potat::test]
async fn test_unmatched_code_falls_through_to_stderr() {
    let runner = ScriptedRunner::new(vec![stderr(7, "Throttled"), code(0)]);
    let policy = fast(
        RetryPolicy::new(3)
            .on_returncodes([1])
            .on_stderr(["Throttled"]),
    );

    let result = run_with_retries(&runner, "api call", &policy).await.unwrap();

    assert!(result.success());
    assert_eq!(runner.attempts(), 2);
}

/// Fails until it has been run three times, tracking runs in a counter file.
fn counting_script(counter: &Path) -> String {
    format!(
        "n=$(cat {f} 2>/dev/null || echo 0); n=$((n+1)); echo $n > {f}; \
         if [ $n -lt 3 ]; then echo 'transient failure' >&2; exit 1; fi; echo ok",
        f = counter.display()
    )
}

#[smol_potat::test]
async fn test_real_command_retried() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let counter = dir.path().join("count");
    let policy = fast(RetryPolicy::new(3).on_returncodes([1]));

    let result = run_with_retries(&FileLogRunner::new(), &counting_script(&counter), &policy)
        .await
        .unwrap();

    assert!(result.success());
    assert_eq!(result.stdout.as_deref(), Some("ok\n"));
    assert_eq!(std::fs::read_to_string(&counter).unwrap().trim(), "3");
}

#[smol_potat::test]
async fn test_real_command_retried_on_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let counter = dir.path().join("count");
    let policy = fast(RetryPolicy::new(1).on_stderr(["transient"]));

    let result = run_with_retries(&FileLogRunner::new(), &counting_script(&counter), &policy)
        .await
        .unwrap();

    // One retry allowed: the second run still fails and is returned as-is.
    assert_eq!(result.return_code, 1);
    assert_eq!(result.stderr.as_deref(), Some("transient failure\n"));
    assert_eq!(std::fs::read_to_string(&counter).unwrap().trim(), "2");
}

#[smol_potat::test]
async fn test_runner_errors_propagate() {
    let runner = FileLogRunner::new().with_shell("/nonexistent/shell");
    let err = run_with_retries(&runner, "true", &fast(RetryPolicy::new(3).on_returncodes([1])))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SpawnFailed { .. }));
}
