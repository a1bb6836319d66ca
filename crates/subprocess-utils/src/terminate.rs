//! Process tree terminator
//!
//! Kills the descendants of a set of root processes, or of the calling
//! process, so that nothing spawned keeps printing to the terminal or keeps
//! driving a multi-step operation after cleanup has started.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::process::{ProcessHandle, ProcessTable, SystemProcessTable, TermSignal};

/// Which process trees to kill
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KillTarget {
    /// Descendants of the calling process; the caller itself survives
    CurrentProcess,
    /// These processes and their descendants, in this order
    Pids(Vec<u32>),
}

impl From<u32> for KillTarget {
    fn from(pid: u32) -> Self {
        KillTarget::Pids(vec![pid])
    }
}

impl From<Vec<u32>> for KillTarget {
    fn from(pids: Vec<u32>) -> Self {
        KillTarget::Pids(pids)
    }
}

impl From<&[u32]> for KillTarget {
    fn from(pids: &[u32]) -> Self {
        KillTarget::Pids(pids.to_vec())
    }
}

impl From<Option<u32>> for KillTarget {
    fn from(pid: Option<u32>) -> Self {
        match pid {
            Some(pid) => KillTarget::Pids(vec![pid]),
            None => KillTarget::CurrentProcess,
        }
    }
}

/// Missing entries stand for processes that were never started and are
/// skipped. A lone `None` targets the calling process instead; inside a list
/// that reading would turn one unstarted entry into a kill of every child.
impl From<Vec<Option<u32>>> for KillTarget {
    fn from(pids: Vec<Option<u32>>) -> Self {
        KillTarget::Pids(pids.into_iter().flatten().collect())
    }
}

/// Timing of the terminate-then-kill escalation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminationPolicy {
    /// Seconds to wait after the first signal
    pub grace_period_secs: u64,
    /// Seconds to wait after escalating to SIGKILL
    pub kill_timeout_secs: u64,
    /// Milliseconds between liveness checks while waiting
    pub poll_interval_ms: u64,
}

impl Default for TerminationPolicy {
    fn default() -> Self {
        Self {
            grace_period_secs: 5,
            kill_timeout_secs: 5,
            poll_interval_ms: 50,
        }
    }
}

impl TerminationPolicy {
    /// Wait after the first signal
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    /// Wait after escalating to SIGKILL
    pub fn kill_timeout(&self) -> Duration {
        Duration::from_secs(self.kill_timeout_secs)
    }

    /// Interval between liveness checks
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Terminates process trees discovered through a [`ProcessTable`]
#[derive(Debug, Clone)]
pub struct ProcessTreeTerminator<T: ProcessTable = SystemProcessTable> {
    table: T,
    policy: TerminationPolicy,
}

impl ProcessTreeTerminator<SystemProcessTable> {
    /// Terminator for the local process table
    pub fn new(policy: TerminationPolicy) -> Self {
        Self::with_table(SystemProcessTable::new(policy.poll_interval()), policy)
    }
}

impl Default for ProcessTreeTerminator<SystemProcessTable> {
    fn default() -> Self {
        Self::new(TerminationPolicy::default())
    }
}

impl<T: ProcessTable> ProcessTreeTerminator<T> {
    /// Terminator over an arbitrary process table
    pub fn with_table(table: T, policy: TerminationPolicy) -> Self {
        Self { table, policy }
    }

    /// The escalation timing in use
    pub fn policy(&self) -> &TerminationPolicy {
        &self.policy
    }

    /// Kill the process trees named by `target`.
    ///
    /// Roots that no longer exist are skipped. Each root's descendants are
    /// discovered before the root is signalled; explicit roots die first,
    /// then their descendants in discovery order. With
    /// [`KillTarget::CurrentProcess`] only the descendants are killed.
    ///
    /// `force` sends SIGKILL straight away instead of SIGTERM. Running it on
    /// an already cleaned-up tree does nothing.
    pub async fn kill_tree(&self, target: impl Into<KillTarget>, force: bool) -> Result<()> {
        let (roots, kill_roots) = match target.into() {
            KillTarget::CurrentProcess => (vec![self.table.current()?], false),
            KillTarget::Pids(pids) => {
                let roots = pids
                    .into_iter()
                    .filter_map(|pid| {
                        let root = self.table.resolve(pid);
                        if root.is_none() {
                            debug!(pid, "Process already exited, skipping");
                        }
                        root
                    })
                    .collect();
                (roots, true)
            }
        };

        for root in &roots {
            let children = root.children(true);
            if kill_roots {
                self.terminate(root, force).await?;
            }
            if !children.is_empty() {
                let pids: Vec<u32> = children.iter().map(|c| c.pid()).collect();
                info!(parent = root.pid(), children = ?pids, "Killing child processes");
            }
            for child in &children {
                self.terminate(child, force).await?;
            }
        }
        Ok(())
    }

    async fn terminate(&self, process: &T::Handle, force: bool) -> Result<()> {
        let pid = process.pid();
        if !process.is_running() {
            debug!(pid, "Process not running, skipping");
            return Ok(());
        }

        info!(pid, force, "Killing process");
        let signal = if force {
            TermSignal::Kill
        } else {
            TermSignal::Terminate
        };
        process.signal(signal)?;
        if process.wait_timeout(self.policy.grace_period()).await {
            return Ok(());
        }

        warn!(
            pid,
            timeout = ?self.policy.grace_period(),
            "Process did not terminate in time"
        );
        if force || !process.is_running() {
            return Ok(());
        }

        info!(pid, "Force killing process");
        process.signal(TermSignal::Kill)?;
        if !process.wait_timeout(self.policy.kill_timeout()).await {
            warn!(pid, "Process still running after SIGKILL");
        }
        Ok(())
    }
}

/// Kill process trees with the local process table and default timing.
///
/// `KillTarget::CurrentProcess` (or `None`) cleans up everything the calling
/// process spawned; a pid or list of pids kills those processes and their
/// descendants in order.
pub async fn kill_children_processes(target: impl Into<KillTarget>, force: bool) -> Result<()> {
    ProcessTreeTerminator::default().kill_tree(target, force).await
}
