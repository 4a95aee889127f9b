//! Child process supervision.
//!
//! The supervisor owns every child handle from spawn to reap and is the only
//! component that signals children. Runners hold the supervisor-assigned id
//! and request kills through it. On POSIX each child is spawned into its own
//! process group so one signal reaches the whole subtree; elsewhere the
//! platform's native tree-kill is used as the functional equivalent.

use std::collections::HashMap;
use std::path::Path;
use std::process::ExitStatus;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::process::Child;
use tokio::process::ChildStderr;
use tokio::process::ChildStdin;
use tokio::process::ChildStdout;
use tokio::process::Command;
use tracing::debug;
use tracing::warn;

use crate::error::HookError;
use crate::error::Result;

/// Grace between a polite kill and the forced one.
pub const KILL_GRACE: Duration = Duration::from_secs(2);

const CLEANUP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Which signal a kill request carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillSignal {
    /// SIGTERM: give the child a chance to exit on its own.
    Polite,
    /// SIGKILL: the child is past negotiating.
    Force,
}

struct ChildEntry {
    pid: Option<u32>,
    child: Arc<tokio::sync::Mutex<Child>>,
}

#[derive(Default)]
struct Inner {
    children: Mutex<HashMap<String, ChildEntry>>,
    shutting_down: AtomicBool,
}

/// Arena of active children, shared by runners and the shutdown coordinator.
#[derive(Clone, Default)]
pub struct ProcessSupervisor {
    inner: Arc<Inner>,
}

/// Pipes handed to the runner at spawn time. The child handle itself stays in
/// the arena.
#[derive(Debug)]
pub struct SpawnedChild {
    pub id: String,
    pub pid: Option<u32>,
    pub stdin: Option<ChildStdin>,
    pub stdout: Option<ChildStdout>,
    pub stderr: Option<ChildStderr>,
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `argv` in its own process group with `cwd` as working directory
    /// and `extra_env` layered over the inherited environment.
    ///
    /// Refused once shutdown has started.
    pub fn spawn(
        &self,
        id: &str,
        argv: &[String],
        cwd: &Path,
        extra_env: &[(String, String)],
    ) -> Result<SpawnedChild> {
        let (program, args) = argv.split_first().ok_or_else(|| {
            HookError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "command is empty",
            ))
        })?;

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in extra_env {
            command.env(key, value);
        }
        #[cfg(unix)]
        command.process_group(0);

        let mut children = self
            .inner
            .children
            .lock()
            .expect("supervisor arena poisoned");
        if self.inner.shutting_down.load(Ordering::SeqCst) {
            return Err(HookError::ShutdownInProgress);
        }

        let mut child = command.spawn()?;
        let pid = child.id();
        debug!(id, pid, program = %program, "spawned hook child");

        let spawned = SpawnedChild {
            id: id.to_string(),
            pid,
            stdin: child.stdin.take(),
            stdout: child.stdout.take(),
            stderr: child.stderr.take(),
        };
        children.insert(
            id.to_string(),
            ChildEntry {
                pid,
                child: Arc::new(tokio::sync::Mutex::new(child)),
            },
        );
        Ok(spawned)
    }

    /// Signal the child's whole group.
    pub fn kill(&self, id: &str, signal: KillSignal) {
        let pid = {
            let children = self.inner.children.lock().expect("supervisor arena poisoned");
            children.get(id).and_then(|entry| entry.pid)
        };
        match pid {
            Some(pid) => kill_tree(pid, signal),
            None => warn!(id, "kill requested for a child with no pid"),
        }
    }

    /// Wait for the child to exit and reap it. Each id is waited by exactly
    /// one runner.
    pub async fn wait(&self, id: &str) -> std::io::Result<ExitStatus> {
        let child = {
            let children = self.inner.children.lock().expect("supervisor arena poisoned");
            children
                .get(id)
                .map(|entry| Arc::clone(&entry.child))
                .ok_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::NotFound, "unknown child id")
                })?
        };
        let status = child.lock().await.wait().await;
        self.inner
            .children
            .lock()
            .expect("supervisor arena poisoned")
            .remove(id);
        status
    }

    /// Terminate everything still alive: polite signal to each group, a grace
    /// period, then a forced kill for survivors. New spawns are refused from
    /// the moment this starts.
    pub async fn cleanup(&self) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);

        let targets: Vec<(String, u32)> = {
            let children = self.inner.children.lock().expect("supervisor arena poisoned");
            children
                .iter()
                .filter_map(|(id, entry)| entry.pid.map(|pid| (id.clone(), pid)))
                .collect()
        };
        if targets.is_empty() {
            return;
        }

        debug!(count = targets.len(), "cleanup: terminating remaining children");
        for (_, pid) in &targets {
            kill_tree(*pid, KillSignal::Polite);
        }

        let deadline = tokio::time::Instant::now() + KILL_GRACE;
        let mut survivors = targets;
        while !survivors.is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(CLEANUP_POLL_INTERVAL).await;
            survivors.retain(|(_, pid)| process_alive(*pid));
        }

        for (id, pid) in &survivors {
            warn!(id, pid, "cleanup: force-killing unresponsive child");
            kill_tree(*pid, KillSignal::Force);
        }

        self.inner
            .children
            .lock()
            .expect("supervisor arena poisoned")
            .clear();
    }

    /// Synchronous last-resort kill of every tracked group, safe to call from
    /// a panic hook.
    pub fn force_kill_all_blocking(&self) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        let Ok(children) = self.inner.children.try_lock() else {
            return;
        };
        for entry in children.values() {
            if let Some(pid) = entry.pid {
                kill_tree(pid, KillSignal::Force);
            }
        }
    }

    /// Number of children currently tracked.
    pub fn active_children(&self) -> usize {
        self.inner
            .children
            .lock()
            .expect("supervisor arena poisoned")
            .len()
    }
}

#[cfg(unix)]
fn kill_tree(pid: u32, signal: KillSignal) {
    let sig = match signal {
        KillSignal::Polite => libc::SIGTERM,
        KillSignal::Force => libc::SIGKILL,
    };
    // The child was spawned with process_group(0), so its pgid is its pid.
    let rc = unsafe { libc::killpg(pid as libc::pid_t, sig) };
    if rc == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            warn!(pid, %err, "failed to signal process group");
        }
    }
}

#[cfg(not(unix))]
fn kill_tree(pid: u32, _signal: KillSignal) {
    // taskkill /T takes the whole tree down; there is no polite variant.
    let result = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .output();
    if let Err(err) = result {
        warn!(pid, %err, "failed to run taskkill");
    }
}

#[cfg(unix)]
fn process_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    false
}
