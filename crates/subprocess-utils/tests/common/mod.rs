//! Shared helpers for subprocess-utils integration tests

#![allow(dead_code)]

use std::time::{Duration, Instant};
use subprocess_utils::{ProcessHandle, ProcessTable, SystemProcessTable};

/// Install a fmt subscriber that writes through the test harness
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Whether `pid` names a live, non-zombie process
pub fn is_running(pid: u32) -> bool {
    SystemProcessTable::default()
        .resolve(pid)
        .is_some_and(|p| p.is_running())
}

/// Pids of the live descendants of `pid`
pub fn descendants(pid: u32) -> Vec<u32> {
    SystemProcessTable::default()
        .resolve(pid)
        .map(|p| {
            p.children(true)
                .into_iter()
                .filter(|c| c.is_running())
                .map(|c| c.pid())
                .collect()
        })
        .unwrap_or_default()
}

/// Poll until `pid` has at least `count` live descendants
pub fn wait_for_descendants(pid: u32, count: usize) -> Vec<u32> {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let found = descendants(pid);
        if found.len() >= count || Instant::now() >= deadline {
            return found;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

/// Poll until none of `pids` is running, giving up after `timeout`
pub fn wait_all_gone(pids: &[u32], timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if pids.iter().all(|pid| !is_running(*pid)) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}
