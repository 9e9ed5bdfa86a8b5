//! Advisory liveness checks against the running application.
//!
//! There is no locking: a process can start right after
//! [`ProcessSupervisor::is_running`] returns `false`. The check exists to
//! warn the operator before a snapshot that may be torn, and to pause the
//! application before restore rewrites its directories.

use sysinfo::{Signal, System};

/// Capability to query and stop application processes by pattern.
pub trait ProcessSupervisor: Send + Sync {
    /// Whether any process matches `pattern`.
    fn is_running(&self, pattern: &str) -> bool;

    /// Ask every process matching `pattern` to stop.
    ///
    /// Returns `false` if any matching process could not be signalled.
    fn stop(&self, pattern: &str) -> bool;
}

/// Supervisor backed by the OS process table.
///
/// A process matches when `pattern` occurs in its command line (arguments
/// joined by spaces) or, for processes without a readable command line,
/// in its name. This mirrors `pgrep -f` / `pkill -f`.
#[derive(Debug, Default)]
pub struct SystemSupervisor;

impl SystemSupervisor {
    fn matching_pids(sys: &System, pattern: &str) -> Vec<sysinfo::Pid> {
        let own = sysinfo::get_current_pid().ok();
        sys.processes()
            .iter()
            .filter(|(pid, _)| Some(**pid) != own)
            .filter(|(_, process)| {
                let cmdline = process.cmd().join(" ");
                if cmdline.is_empty() {
                    process.name().contains(pattern)
                } else {
                    cmdline.contains(pattern)
                }
            })
            .map(|(pid, _)| *pid)
            .collect()
    }

    fn snapshot() -> System {
        let mut sys = System::new();
        sys.refresh_processes();
        sys
    }
}

impl ProcessSupervisor for SystemSupervisor {
    fn is_running(&self, pattern: &str) -> bool {
        let sys = Self::snapshot();
        !Self::matching_pids(&sys, pattern).is_empty()
    }

    fn stop(&self, pattern: &str) -> bool {
        let sys = Self::snapshot();
        let pids = Self::matching_pids(&sys, pattern);
        let mut ok = true;
        for pid in pids {
            if let Some(process) = sys.process(pid) {
                // SIGTERM first, like pkill; kill() only where TERM is unsupported.
                let signalled = process
                    .kill_with(Signal::Term)
                    .unwrap_or_else(|| process.kill());
                if signalled {
                    tracing::info!(pid = %pid, pattern, "sent stop signal");
                } else {
                    tracing::warn!(pid = %pid, pattern, "failed to signal process");
                    ok = false;
                }
            }
        }
        ok
    }
}
