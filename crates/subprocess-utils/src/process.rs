//! Process table access: handles to live processes and their descendants

use async_io::Timer;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};
use sysinfo::{Pid, Process, ProcessStatus, System};

use crate::error::{Error, Result};

/// Signals used to stop a process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermSignal {
    /// Ask the process to exit (SIGTERM)
    Terminate,
    /// Stop the process unconditionally (SIGKILL)
    Kill,
}

impl TermSignal {
    /// Conventional Unix signal number
    pub fn number(self) -> i32 {
        match self {
            TermSignal::Terminate => 15,
            TermSignal::Kill => 9,
        }
    }
}

/// A reference to an operating-system process.
///
/// A handle is only a snapshot: the process may exit, and its PID may be
/// reused, at any moment after the handle was created. Callers re-check
/// [`is_running`](ProcessHandle::is_running) right before acting on it.
#[async_trait]
pub trait ProcessHandle: Send + Sync + Sized {
    /// Get the process ID
    fn pid(&self) -> u32;

    /// Whether this exact process is still alive
    fn is_running(&self) -> bool;

    /// Descendants at the time of the call, in a stable order
    fn children(&self, recursive: bool) -> Vec<Self>;

    /// Deliver a signal; a process that is already gone counts as success
    fn signal(&self, signal: TermSignal) -> Result<()>;

    /// Wait until the process exits; returns false if `timeout` elapsed first
    async fn wait_timeout(&self, timeout: Duration) -> bool;
}

/// Resolves process IDs to handles
pub trait ProcessTable: Send + Sync {
    /// The handle type this table produces
    type Handle: ProcessHandle;

    /// Handle to the calling process
    fn current(&self) -> Result<Self::Handle>;

    /// Handle to `pid`, or `None` if no such process exists
    fn resolve(&self, pid: u32) -> Option<Self::Handle>;
}

/// Process table of the local host
#[derive(Debug, Clone, Copy)]
pub struct SystemProcessTable {
    poll_interval: Duration,
}

impl SystemProcessTable {
    /// Create a table whose handles poll for exit every `poll_interval`
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

impl Default for SystemProcessTable {
    fn default() -> Self {
        Self::new(Duration::from_millis(50))
    }
}

impl ProcessTable for SystemProcessTable {
    type Handle = SystemProcess;

    fn current(&self) -> Result<SystemProcess> {
        self.resolve(std::process::id()).ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "current process is missing from the process table",
            ))
        })
    }

    fn resolve(&self, pid: u32) -> Option<SystemProcess> {
        let pid = Pid::from_u32(pid);
        let mut system = System::new();
        if !system.refresh_process(pid) {
            return None;
        }
        let process = system.process(pid)?;
        Some(SystemProcess::from_process(process, self.poll_interval))
    }
}

/// A process of the local host, identified by PID and start time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemProcess {
    pid: Pid,
    start_time: u64,
    poll_interval: Duration,
}

impl SystemProcess {
    fn from_process(process: &Process, poll_interval: Duration) -> Self {
        Self {
            pid: process.pid(),
            start_time: process.start_time(),
            poll_interval,
        }
    }

    /// Start time in seconds since the epoch, as recorded at discovery.
    ///
    /// The PID-reuse guard in [`is_running`](ProcessHandle::is_running)
    /// compares this value, so a PID recycled within the same second as the
    /// original process started is not told apart from it.
    pub fn start_time(&self) -> u64 {
        self.start_time
    }
}

#[async_trait]
impl ProcessHandle for SystemProcess {
    fn pid(&self) -> u32 {
        self.pid.as_u32()
    }

    fn is_running(&self) -> bool {
        let mut system = System::new();
        if !system.refresh_process(self.pid) {
            return false;
        }
        match system.process(self.pid) {
            // Same start time (whole seconds) guards against a recycled PID.
            Some(process) => {
                process.start_time() == self.start_time
                    && process.status() != ProcessStatus::Zombie
            }
            None => false,
        }
    }

    fn children(&self, recursive: bool) -> Vec<SystemProcess> {
        let mut system = System::new();
        system.refresh_processes();
        let tree = ChildIndex::build(&system);

        let mut found = Vec::new();
        let mut seen = HashSet::from([self.pid]);
        let mut queue = VecDeque::from([self.pid]);
        while let Some(parent) = queue.pop_front() {
            for child in tree.children_of(parent) {
                if !seen.insert(child.pid()) {
                    continue;
                }
                found.push(SystemProcess::from_process(child, self.poll_interval));
                if recursive {
                    queue.push_back(child.pid());
                }
            }
        }
        found
    }

    fn signal(&self, signal: TermSignal) -> Result<()> {
        send_signal(self.pid, signal)
    }

    async fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.is_running() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            Timer::after(self.poll_interval.min(deadline - now)).await;
        }
    }
}

#[cfg(unix)]
fn send_signal(pid: Pid, signal: TermSignal) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid as NixPid;

    let sig = match signal {
        TermSignal::Terminate => Signal::SIGTERM,
        TermSignal::Kill => Signal::SIGKILL,
    };
    match signal::kill(NixPid::from_raw(pid.as_u32() as i32), sig) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(Error::signal_failed(signal.number(), e.to_string())),
    }
}

// Without Unix signals, SIGTERM maps to whatever sysinfo supports and
// falls back to a plain kill.
#[cfg(not(unix))]
fn send_signal(pid: Pid, signal: TermSignal) -> Result<()> {
    let mut system = System::new();
    if !system.refresh_process(pid) {
        return Ok(());
    }
    let Some(process) = system.process(pid) else {
        return Ok(());
    };
    let delivered = match signal {
        TermSignal::Terminate => process
            .kill_with(sysinfo::Signal::Term)
            .unwrap_or_else(|| process.kill()),
        TermSignal::Kill => process.kill(),
    };
    if delivered {
        Ok(())
    } else {
        Err(Error::signal_failed(
            signal.number(),
            format!("process {pid} did not accept the signal"),
        ))
    }
}

/// Parent -> children index over one snapshot of the process table
struct ChildIndex<'a> {
    by_parent: HashMap<Pid, Vec<&'a Process>>,
}

impl<'a> ChildIndex<'a> {
    fn build(system: &'a System) -> Self {
        // On Linux threads show up as tasks of their process; they are not children.
        let mut threads = HashSet::new();
        for (pid, process) in system.processes() {
            if let Some(tasks) = process.tasks() {
                threads.extend(tasks.iter().copied().filter(|task| task != pid));
            }
        }

        let mut by_parent: HashMap<Pid, Vec<&Process>> = HashMap::new();
        for (pid, process) in system.processes() {
            if threads.contains(pid) {
                continue;
            }
            if let Some(parent) = process.parent() {
                by_parent.entry(parent).or_default().push(process);
            }
        }
        for siblings in by_parent.values_mut() {
            siblings.sort_by_key(|p| (p.start_time(), p.pid().as_u32()));
        }
        Self { by_parent }
    }

    fn children_of(&self, pid: Pid) -> impl Iterator<Item = &'a Process> + '_ {
        self.by_parent
            .get(&pid)
            .into_iter()
            .flat_map(|children| children.iter().copied())
    }
}
