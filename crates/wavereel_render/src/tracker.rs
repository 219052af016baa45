//! Transient-file and child-process bookkeeping.
//!
//! One [`TempTracker`] is created by the batch driver and shared (cheaply
//! cloned) with the executor and the signal task. All operations are
//! idempotent so cleanup may run from any point of the main flow, more than
//! once, and concurrently with the signal path.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;

/// Names of transient files a crashed run may have left in the output folder.
pub const STALE_PATTERNS: &[&str] = &["_tmp_audio.wav", "_tmp_*.wav", "_tmp_*.mp4", "_tmp_text_*.png"];

#[derive(Debug, Default)]
struct State {
    paths: Vec<PathBuf>,
    running: Option<u32>,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<State>,
    cancel: watch::Sender<bool>,
}

#[derive(Debug, Clone)]
pub struct TempTracker {
    inner: Arc<Inner>,
}

/// What a [`TempTracker::cleanup_all`] pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub terminated: bool,
    pub removed: usize,
    pub left: usize,
}

impl Default for TempTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl TempTracker {
    pub fn new() -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                cancel,
            }),
        }
    }

    // A poisoned lock still holds a usable path list.
    fn state(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn track(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut state = self.state();
        if !state.paths.contains(&path) {
            state.paths.push(path);
        }
    }

    /// Forget a path without deleting it.
    pub fn untrack(&self, path: &Path) {
        self.state().paths.retain(|p| p != path);
    }

    pub fn tracked(&self) -> Vec<PathBuf> {
        self.state().paths.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.state().paths.is_empty()
    }

    /// Delete a tracked file and forget it. A file that is already gone
    /// counts as deleted; one that cannot be removed stays tracked.
    pub fn discard(&self, path: &Path) -> bool {
        match remove_if_present(path) {
            Ok(()) => {
                self.untrack(path);
                true
            }
            Err(e) => {
                tracing::warn!("could not remove {}: {e}", path.display());
                false
            }
        }
    }

    pub fn set_running(&self, pid: u32) {
        self.state().running = Some(pid);
    }

    /// Clear the process handle if it still refers to `pid`.
    pub fn clear_running(&self, pid: u32) {
        let mut state = self.state();
        if state.running == Some(pid) {
            state.running = None;
        }
    }

    pub fn running(&self) -> Option<u32> {
        self.state().running
    }

    /// Ask the in-flight run and the batch loop to stop.
    pub fn interrupt(&self) {
        self.inner.cancel.send_replace(true);
    }

    pub fn is_interrupted(&self) -> bool {
        *self.inner.cancel.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.cancel.subscribe()
    }

    /// Terminate any registered child (graceful, then forced after
    /// `grace`) and delete every tracked path, ignoring individual failures.
    pub fn cleanup_all(&self, grace: Duration) -> CleanupReport {
        let mut report = CleanupReport::default();

        let running = self.state().running.take();
        if let Some(pid) = running {
            tracing::debug!("terminating child process {pid}");
            terminate_pid(pid, grace);
            report.terminated = true;
        }

        let paths = std::mem::take(&mut self.state().paths);
        for path in paths {
            match remove_if_present(&path) {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    // Left for the next run's startup sweep to overwrite.
                    tracing::debug!("leaving {}: {e}", path.display());
                    report.left += 1;
                }
            }
        }

        report
    }
}

fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Remove leftovers matching [`STALE_PATTERNS`] from `dir`. Returns how
/// many files were deleted; undeletable files are skipped.
pub fn sweep_stale(dir: &Path) -> usize {
    let base = glob::Pattern::escape(&dir.to_string_lossy());
    let mut cleaned = 0;

    for pattern in STALE_PATTERNS {
        let full = format!("{base}/{pattern}");
        let Ok(paths) = glob::glob(&full) else {
            continue;
        };
        for path in paths.flatten() {
            if std::fs::remove_file(&path).is_ok() {
                cleaned += 1;
            }
        }
    }

    if cleaned > 0 {
        tracing::info!("cleaned up {cleaned} leftover temp file(s)");
    }
    cleaned
}

// ---------------------------------------------------------------------------
// Process signals
// ---------------------------------------------------------------------------

/// Ask `pid` to exit. Returns false if it is already gone.
#[cfg(unix)]
pub(crate) fn send_terminate(pid: u32) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok()
}

#[cfg(not(unix))]
pub(crate) fn send_terminate(_pid: u32) -> bool {
    false
}

/// Reaps `pid` if it has exited. A child that is not ours (`ECHILD`) or
/// was already reaped counts as gone.
#[cfg(unix)]
fn is_alive(pid: u32) -> bool {
    use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
    use nix::unistd::Pid;

    matches!(
        waitpid(Pid::from_raw(pid as i32), Some(WaitPidFlag::WNOHANG)),
        Ok(WaitStatus::StillAlive)
    )
}

#[cfg(unix)]
fn force_kill(pid: u32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
}

#[cfg(unix)]
fn terminate_pid(pid: u32, grace: Duration) {
    use std::time::Instant;

    if !send_terminate(pid) {
        return;
    }
    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if !is_alive(pid) {
            return;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    force_kill(pid);
}

// Children are spawned with kill-on-drop, which covers platforms without
// signals.
#[cfg(not(unix))]
fn terminate_pid(_pid: u32, _grace: Duration) {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
