//! File-based exclusive locking for the `--exclusive` CLI flag, keyed on
//! the command line rather than a session+tool pair.
//!
//! Uses raw `libc::flock` directly rather than an RAII crate, for the same
//! reason as the teacher's session-lock crate: owning just the `File`
//! keeps the lock guard self-contained, with `Drop` releasing via
//! `flock(fd, LOCK_UN)`.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock held at {lock_path} timed out after {timeout_secs}s")]
    TimedOut {
        lock_path: PathBuf,
        timeout_secs: f64,
    },
    #[error("lock i/o error at {lock_path}: {source}")]
    Io {
        lock_path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct LockDiagnostic {
    pid: u32,
    command_line: Vec<String>,
    acquired_at: DateTime<Utc>,
}

/// Guard holding an acquired exclusive lock. Releases on `Drop`.
pub struct ExclusiveLock {
    file: File,
    lock_path: PathBuf,
}

impl std::fmt::Debug for ExclusiveLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExclusiveLock")
            .field("lock_path", &self.lock_path)
            .finish()
    }
}

impl ExclusiveLock {
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for ExclusiveLock {
    fn drop(&mut self) {
        let fd = self.file.as_raw_fd();
        // SAFETY: fd is a valid descriptor owned by self.file for its
        // entire lifetime; LOCK_UN releases the advisory lock taken in
        // `acquire`.
        unsafe {
            libc::flock(fd, libc::LOCK_UN);
        }
    }
}

/// Derive the deterministic lock path for a command line: a canonical
/// (shell-quoted join) form of `command_line` hashed with SHA-256, stored
/// under a stable per-user cache directory. The same command line yields
/// the same path across processes.
pub fn get_lock_path(command_line: &[String]) -> PathBuf {
    let canonical = xc_core::quote(command_line);
    let digest = Sha256::digest(canonical.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();

    let base = ProjectDirs::from("", "", "executor")
        .map(|dirs| dirs.cache_dir().join("locks"))
        .unwrap_or_else(|| std::env::temp_dir().join("executor-locks"));
    base.join(format!("{hex}.lock"))
}

/// Acquire an exclusive, non-blocking-by-default lock on `command_line`'s
/// derived path. With `timeout` set, retries until acquired or the
/// timeout elapses; with `timeout` absent, blocks indefinitely (the
/// kernel's own `flock(2)` wait).
pub async fn acquire(
    command_line: &[String],
    timeout: Option<Duration>,
) -> Result<ExclusiveLock, LockError> {
    let lock_path = get_lock_path(command_line);
    let command_line = command_line.to_vec();
    let path_for_blocking = lock_path.clone();
    tokio::task::spawn_blocking(move || acquire_blocking(path_for_blocking, command_line, timeout))
        .await
        .unwrap_or_else(|_| {
            Err(LockError::Io {
                lock_path: lock_path.clone(),
                source: std::io::Error::other("lock task panicked"),
            })
        })
}

fn acquire_blocking(
    lock_path: PathBuf,
    command_line: Vec<String>,
    timeout: Option<Duration>,
) -> Result<ExclusiveLock, LockError> {
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent).map_err(|source| LockError::Io {
            lock_path: lock_path.clone(),
            source,
        })?;
    }

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|source| LockError::Io {
            lock_path: lock_path.clone(),
            source,
        })?;

    let fd = file.as_raw_fd();
    match timeout {
        None => {
            // SAFETY: fd owned by `file`, open for the duration of this call.
            let ret = unsafe { libc::flock(fd, libc::LOCK_EX) };
            if ret != 0 {
                return Err(LockError::Io {
                    lock_path,
                    source: std::io::Error::last_os_error(),
                });
            }
        }
        Some(timeout) => {
            let start = Instant::now();
            loop {
                // SAFETY: see above; LOCK_NB makes this a non-blocking poll.
                let ret = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
                if ret == 0 {
                    break;
                }
                if start.elapsed() >= timeout {
                    return Err(LockError::TimedOut {
                        lock_path,
                        timeout_secs: timeout.as_secs_f64(),
                    });
                }
                std::thread::sleep(Duration::from_millis(50));
            }
        }
    }

    let diagnostic = LockDiagnostic {
        pid: std::process::id(),
        command_line,
        acquired_at: Utc::now(),
    };
    if let Ok(json) = serde_json::to_string(&diagnostic) {
        let _ = file.set_len(0);
        let _ = file.write_all(json.as_bytes());
        let _ = file.flush();
    }

    Ok(ExclusiveLock { file, lock_path })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_lock_path_is_deterministic() {
        let a = get_lock_path(&["echo".into(), "hi".into()]);
        let b = get_lock_path(&["echo".into(), "hi".into()]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_get_lock_path_differs_by_command() {
        let a = get_lock_path(&["echo".into(), "hi".into()]);
        let b = get_lock_path(&["echo".into(), "bye".into()]);
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_acquire_then_timeout_while_held() {
        let command_line = vec!["sleep".to_string(), "100".to_string()];
        let _held = acquire(&command_line, None).await.unwrap();
        let result = acquire(&command_line, Some(Duration::from_millis(200))).await;
        assert!(matches!(result, Err(LockError::TimedOut { .. })));
    }

    #[tokio::test]
    async fn test_lock_released_on_drop_allows_reacquire() {
        let command_line = vec!["sleep".to_string(), "101".to_string()];
        {
            let _held = acquire(&command_line, None).await.unwrap();
        }
        let reacquired = acquire(&command_line, Some(Duration::from_secs(2))).await;
        assert!(reacquired.is_ok());
    }
}
