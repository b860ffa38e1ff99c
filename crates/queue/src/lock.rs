//! Cross-process queue file lock.
//!
//! Mutual exclusion rests on an exclusive-create marker file placed next to the
//! queue file (`<queue file>.lock`). The marker holds the owner's process id
//! for diagnostics only. A marker older than the staleness threshold is
//! presumed to belong to a crashed process and is reclaimed.
//!
//! Acquisition is bounded: on timeout the caller gets a guard that reports
//! `acquired() == false` and is expected to proceed with a warning rather than
//! block the application.

use encode_queue_config::LockConfig;
use parking_lot::{Mutex, MutexGuard};
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, error, warn};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Returns the marker path for a queue file: `<queue file>.lock`.
pub fn lock_path(queue_file: &Path) -> PathBuf {
    let mut name: OsString = queue_file.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// Lock acquisition policy plus the process-local lock serializing callers.
#[derive(Debug)]
pub struct QueueLock {
    local: Mutex<()>,
    timeout: Duration,
    stale_after: Duration,
    poll_interval: Duration,
}

impl QueueLock {
    /// `poll_interval` is raised to at least 1ms so a held lock is never
    /// waited on in a busy loop.
    pub fn new(timeout: Duration, stale_after: Duration, poll_interval: Duration) -> Self {
        Self {
            local: Mutex::new(()),
            timeout,
            stale_after,
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
        }
    }

    pub fn from_config(cfg: &LockConfig) -> Self {
        Self::new(cfg.timeout(), cfg.stale_after(), cfg.poll_interval())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Acquire the lock for `queue_file` with the configured timeout.
    pub fn acquire(&self, queue_file: &Path) -> LockGuard<'_> {
        self.acquire_with_timeout(queue_file, self.timeout)
    }

    /// Acquire the lock for `queue_file`, waiting at most `timeout` for the
    /// marker file.
    ///
    /// The process-local lock is always taken first and is held by the
    /// returned guard, even when the marker could not be created.
    pub fn acquire_with_timeout(&self, queue_file: &Path, timeout: Duration) -> LockGuard<'_> {
        let local = self.local.lock();
        let marker = lock_path(queue_file);
        let start = Instant::now();

        loop {
            match create_marker(&marker) {
                Ok(()) => {
                    debug!(lock = %marker.display(), "Acquired queue lock");
                    return LockGuard {
                        _local: local,
                        marker: Some(marker),
                    };
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if let Some(age) = marker_age(&marker) {
                        if age > self.stale_after {
                            warn!(
                                lock = %marker.display(),
                                age_secs = age.as_secs_f64(),
                                "Removing stale queue lock file"
                            );
                            match fs::remove_file(&marker) {
                                Ok(()) => continue,
                                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                                Err(e) => {
                                    warn!(lock = %marker.display(), "Could not remove stale lock: {}", e)
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(lock = %marker.display(), "Error acquiring queue lock: {}", e);
                }
            }

            if start.elapsed() >= timeout {
                error!(
                    lock = %marker.display(),
                    timeout_secs = timeout.as_secs_f64(),
                    "Timeout waiting for queue lock"
                );
                return LockGuard {
                    _local: local,
                    marker: None,
                };
            }
            thread::sleep(self.poll_interval.min(timeout.saturating_sub(start.elapsed())));
        }
    }
}

impl Default for QueueLock {
    fn default() -> Self {
        Self::from_config(&LockConfig::default())
    }
}

/// Scoped ownership of a queue lock; the marker file is removed on drop.
#[derive(Debug)]
pub struct LockGuard<'a> {
    _local: MutexGuard<'a, ()>,
    marker: Option<PathBuf>,
}

impl LockGuard<'_> {
    /// Whether the cross-process marker was created. `false` means the wait
    /// timed out and only the process-local lock is held.
    pub fn acquired(&self) -> bool {
        self.marker.is_some()
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Some(marker) = self.marker.take() {
            match fs::remove_file(&marker) {
                Ok(()) => debug!(lock = %marker.display(), "Released queue lock"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(lock = %marker.display(), "Could not remove queue lock: {}", e),
            }
        }
    }
}

fn create_marker(marker: &Path) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(marker)?;
    // Content is diagnostic; a failed write still leaves a valid lock.
    if let Err(e) = file.write_all(std::process::id().to_string().as_bytes()) {
        debug!(lock = %marker.display(), "Could not write pid to lock file: {}", e);
    }
    Ok(())
}

fn marker_age(marker: &Path) -> Option<Duration> {
    let modified = fs::metadata(marker).and_then(|m| m.modified()).ok()?;
    // A clock skewed into the future counts as fresh.
    Some(SystemTime::now().duration_since(modified).unwrap_or(Duration::ZERO))
}
