//! Parent-process liveness supervision.
//!
//! When the editor passes its `processId` at `initialize`, the session arms a
//! [`Watchdog`] that probes the process on a fixed interval. The first probe
//! that finds it gone runs the exit callback once and stops ticking.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(60);

/// Answers whether a process id still names a running process.
pub trait ProcessProbe: Send + Sync + 'static {
    fn is_alive(&self, pid: u32) -> bool;
}

/// Probe backed by the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

impl ProcessProbe for SystemProbe {
    #[cfg(unix)]
    fn is_alive(&self, pid: u32) -> bool {
        let Ok(pid) = libc::pid_t::try_from(pid) else {
            return false;
        };
        if pid <= 0 {
            return false;
        }
        // SAFETY: signal 0 performs only the existence and permission check.
        let rc = unsafe { libc::kill(pid, 0) };
        if rc == 0 {
            return true;
        }
        // EPERM: the process exists but belongs to someone else.
        std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }

    #[cfg(windows)]
    fn is_alive(&self, pid: u32) -> bool {
        use windows_sys::Win32::Foundation::{
            CloseHandle, ERROR_ACCESS_DENIED, GetLastError, HANDLE, STILL_ACTIVE,
        };
        use windows_sys::Win32::System::Threading::{
            GetExitCodeProcess, OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION,
        };

        // SAFETY: Win32 API call.
        let handle = unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid) } as HANDLE;
        if handle.is_null() {
            // SAFETY: reads the calling thread's last-error value.
            return unsafe { GetLastError() } == ERROR_ACCESS_DENIED;
        }
        let mut exit_code: u32 = 0;
        // SAFETY: handle is valid and exit_code outlives the call.
        let ok = unsafe { GetExitCodeProcess(handle, &raw mut exit_code) };
        // SAFETY: handle is valid and closed exactly once.
        unsafe {
            CloseHandle(handle);
        }
        ok != 0 && exit_code == STILL_ACTIVE as u32
    }

    #[cfg(not(any(unix, windows)))]
    fn is_alive(&self, _pid: u32) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogState {
    Idle,
    Armed,
    /// The parent was found dead and the exit callback has run.
    Terminating,
}

pub struct Watchdog {
    interval: Duration,
    probe: Arc<dyn ProcessProbe>,
    state: watch::Sender<WatchdogState>,
    task: Option<JoinHandle<()>>,
}

impl Watchdog {
    #[must_use]
    pub fn new(interval: Duration, probe: Arc<dyn ProcessProbe>) -> Self {
        let (state, _) = watch::channel(WatchdogState::Idle);
        Self {
            interval,
            probe,
            state,
            task: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> WatchdogState {
        *self.state.borrow()
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start watching `pid`. Re-arming replaces the previous watch.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm<F>(&mut self, pid: u32, on_parent_exit: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.stop();

        let interval = self.interval;
        let probe = Arc::clone(&self.probe);
        let state = self.state.clone();
        state.send_replace(WatchdogState::Armed);
        tracing::debug!(pid, interval_secs = interval.as_secs(), "Watching parent process");

        self.task = Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if probe.is_alive(pid) {
                    tracing::trace!(pid, "Parent process alive");
                    continue;
                }
                tracing::info!(pid, "Parent process is gone, shutting down");
                state.send_replace(WatchdogState::Terminating);
                on_parent_exit();
                break;
            }
        }));
    }

    /// Cancel any pending tick. Does not run the exit callback.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if self.state() == WatchdogState::Armed {
            self.state.send_replace(WatchdogState::Idle);
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
