//! Run-level exclusion, cancellation, and the hashing worker pool
//!
//! Only one pipeline run may touch a corpus at a time. The run lock is an
//! advisory lock file created exclusively in the data directory; its token is
//! recorded in the run's audit entry.

use crate::error::ApiError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const LOCK_FILE: &str = "run.lock";

/// Contents of the lock file, shown to a second run that finds it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockHolder {
    pub token: String,
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
}

/// A lock file that was moved aside so a new run could start.
#[derive(Debug, Clone)]
pub struct ReplacedLock {
    /// Unset when the old file could not be decoded
    pub previous: Option<LockHolder>,
    /// Replaced on request rather than because its process was gone
    pub forced: bool,
    pub archived_to: PathBuf,
}

impl ReplacedLock {
    pub fn describe(&self) -> String {
        let why = if self.forced { "Force-unlocked" } else { "Replaced stale" };
        match &self.previous {
            Some(h) => format!(
                "{} run lock of run {} (pid {}, since {}); kept as {}",
                why,
                h.token,
                h.pid,
                h.acquired_at.to_rfc3339(),
                self.archived_to.display()
            ),
            None => format!(
                "{} unreadable run lock; kept as {}",
                why,
                self.archived_to.display()
            ),
        }
    }
}

/// Advisory run lock. Released when dropped.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    holder: LockHolder,
    replaced: Option<ReplacedLock>,
}

impl RunLock {
    /// Acquire the lock in `dir`, failing with `ConcurrentRunDetected` if a
    /// live run holds it. A lock left by a process that no longer exists is
    /// moved aside and replaced.
    pub fn acquire(dir: &Path) -> Result<Self, ApiError> {
        Self::acquire_with(dir, false)
    }

    /// Acquire the lock in `dir`, moving aside any existing lock file.
    pub fn acquire_forced(dir: &Path) -> Result<Self, ApiError> {
        Self::acquire_with(dir, true)
    }

    fn acquire_with(dir: &Path, force: bool) -> Result<Self, ApiError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(LOCK_FILE);
        let now = Utc::now();
        let holder = LockHolder {
            token: format!("{}-{}", now.timestamp_millis(), std::process::id()),
            pid: std::process::id(),
            acquired_at: now,
        };

        let mut replaced: Option<ReplacedLock> = None;
        let mut file = loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => break file,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    let existing = read_holder(&path);
                    let stale = existing.as_ref().map(|h| !pid_is_alive(h.pid)).unwrap_or(false);
                    // One replacement per attempt; losing the race after it is a real conflict.
                    if replaced.is_some() || !(force || stale) {
                        return Err(ApiError::ConcurrentRunDetected(describe_holder(
                            &path,
                            existing.as_ref(),
                        )));
                    }
                    let archived_to = archive_lock(&path, if stale { "stale" } else { "forced" })?;
                    let entry = ReplacedLock {
                        previous: existing,
                        forced: !stale,
                        archived_to,
                    };
                    tracing::warn!(path = %path.display(), "{}", entry.describe());
                    replaced = Some(entry);
                }
                Err(e) => return Err(ApiError::Io(e)),
            }
        };

        let body = serde_json::to_string(&holder)
            .map_err(|e| ApiError::ConfigError(format!("Failed to encode lock holder: {}", e)))?;
        file.write_all(body.as_bytes())?;

        tracing::debug!(token = %holder.token, path = %path.display(), "Acquired run lock");
        Ok(Self {
            path,
            holder,
            replaced,
        })
    }

    pub fn token(&self) -> &str {
        &self.holder.token
    }

    pub fn holder(&self) -> &LockHolder {
        &self.holder
    }

    /// The lock file this run moved aside, if any.
    pub fn replaced(&self) -> Option<&ReplacedLock> {
        self.replaced.as_ref()
    }
}

fn read_holder(path: &Path) -> Option<LockHolder> {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| serde_json::from_str::<LockHolder>(&s).ok())
}

fn describe_holder(path: &Path, holder: Option<&LockHolder>) -> String {
    match holder {
        Some(h) => format!(
            "run {} (pid {}) holds {} since {}",
            h.token,
            h.pid,
            path.display(),
            h.acquired_at.to_rfc3339()
        ),
        None => format!("lock file {} exists", path.display()),
    }
}

fn archive_lock(path: &Path, reason: &str) -> Result<PathBuf, ApiError> {
    let archived = path.with_file_name(format!(
        "{}.{}.{}.json",
        LOCK_FILE,
        reason,
        Utc::now().timestamp_millis()
    ));
    std::fs::rename(path, &archived)?;
    Ok(archived)
}

#[cfg(target_os = "linux")]
fn pid_is_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{}", pid)).exists()
}

#[cfg(not(target_os = "linux"))]
fn pid_is_alive(_pid: u32) -> bool {
    true
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release run lock");
        }
    }
}

/// Cooperative cancellation, checked between per-disk units of work.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Bounded pool for CPU-bound hashing, separate from network workers.
#[derive(Clone)]
pub struct HashingPool {
    pool: Arc<rayon::ThreadPool>,
}

impl HashingPool {
    /// Build a pool with `workers` threads; 0 means one per available core.
    pub fn new(workers: usize) -> Result<Self, ApiError> {
        let workers = if workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            workers
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("muster-hash-{}", i))
            .build()
            .map_err(|e| ApiError::ConfigError(format!("Failed to build hashing pool: {}", e)))?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }
}
