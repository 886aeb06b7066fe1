//! A handle over an OS process identified by a bare PID.
//!
//! Unlike [`crate::command::ExternalCommand`], a [`ControllableProcess`]
//! does not own a spawned child — it may reference any process the caller
//! knows the PID of. This mirrors the Python `executor` package's
//! `ControllableProcess`, which `ExternalCommand` is itself built on top
//! of (the command owns a process and delegates signal delivery to it).

use std::io;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A handle that can query and signal an arbitrary OS process by PID.
#[derive(Debug, Clone, Copy)]
pub struct ControllableProcess {
    pid: u32,
}

impl ControllableProcess {
    /// Create a handle over the process identified by `pid`.
    pub fn new(pid: u32) -> Self {
        Self { pid }
    }

    /// The PID this handle controls.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// True iff the PID denotes a live process.
    ///
    /// A child of ours that has exited but not yet been `wait()`-ed on is a
    /// zombie: it still has a process-table entry, so plain `kill(pid, 0)`
    /// reports it as "alive" until something reaps it. `waitid(...,
    /// WNOHANG | WNOWAIT)` peeks at exit state without consuming it, so it
    /// detects that death promptly without racing whatever else (a
    /// `tokio::process::Child::wait()` elsewhere) performs the real reap.
    /// For a PID that isn't our child at all (`ECHILD`), `waitid` can't be
    /// used — signal-0 existence probing is the only option there.
    pub fn is_running(&self) -> bool {
        let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
        // SAFETY: `info` is a valid, zeroed out-param; WNOHANG never blocks
        // and WNOWAIT never consumes the child's exit status.
        let ret = unsafe {
            libc::waitid(
                libc::P_PID,
                self.pid as libc::id_t,
                &mut info,
                libc::WEXITED | libc::WNOHANG | libc::WNOWAIT,
            )
        };
        if ret == 0 {
            // POSIX: with WNOHANG and no state change to report, si_pid is
            // left at 0 (hence zeroing `info` up front rather than trusting
            // the kernel to do it).
            return unsafe { info.si_pid() } == 0;
        }

        // SAFETY: signal 0 is the POSIX-blessed way to probe for process
        // existence; it never actually signals the target.
        let ret = unsafe { libc::kill(self.pid as libc::pid_t, 0) };
        if ret == 0 {
            return true;
        }
        io::Error::last_os_error().raw_os_error() != Some(libc::ESRCH)
    }

    /// Deliver `SIGSTOP`. Idempotent: stopping an already-stopped process
    /// is a no-op as far as the caller is concerned.
    pub fn suspend(&self) -> io::Result<()> {
        self.signal(libc::SIGSTOP)
    }

    /// Deliver `SIGCONT`. Idempotent.
    pub fn resume(&self) -> io::Result<()> {
        self.signal(libc::SIGCONT)
    }

    /// Deliver a polite termination request (`SIGTERM`).
    ///
    /// If `wait` and `timeout` are given, polls [`is_running`](Self::is_running)
    /// until it returns false or the timeout elapses, and returns whether the
    /// process actually stopped. A suspended process does not respond to
    /// `SIGTERM` until resumed, so this can legitimately time out.
    pub async fn terminate(&self, wait: bool, timeout: Option<Duration>) -> io::Result<bool> {
        self.signal(libc::SIGTERM)?;
        self.await_exit_if_requested(wait, timeout).await
    }

    /// Deliver a non-ignorable termination signal (`SIGKILL`).
    ///
    /// Same waiting semantics as [`terminate`](Self::terminate).
    pub async fn kill(&self, wait: bool, timeout: Option<Duration>) -> io::Result<bool> {
        self.signal(libc::SIGKILL)?;
        self.await_exit_if_requested(wait, timeout).await
    }

    async fn await_exit_if_requested(&self, wait: bool, timeout: Option<Duration>) -> io::Result<bool> {
        if !wait {
            return Ok(!self.is_running());
        }
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
        loop {
            if !self.is_running() {
                return Ok(true);
            }
            if let Some(deadline) = deadline
                && tokio::time::Instant::now() >= deadline
            {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Synchronous, non-waiting `SIGTERM` for use from `Drop` impls where
    /// an `.await` is not available.
    pub(crate) fn signal_term_best_effort(&self) -> io::Result<()> {
        self.signal(libc::SIGTERM)
    }

    fn signal(&self, sig: i32) -> io::Result<()> {
        // SAFETY: sends a signal to an existing PID; a harmless no-op if the
        // process has already exited (returns ESRCH, which we ignore as
        // these operations are documented idempotent).
        let ret = unsafe { libc::kill(self.pid as libc::pid_t, sig) };
        if ret != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ESRCH) {
                return Ok(());
            }
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    async fn spawn_sleep(secs: u64) -> tokio::process::Child {
        Command::new("sleep")
            .arg(secs.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("failed to spawn sleep")
    }

    #[tokio::test]
    async fn test_is_running_true_for_live_process() {
        let child = spawn_sleep(5).await;
        let pid = child.id().unwrap();
        let proc = ControllableProcess::new(pid);
        assert!(proc.is_running());
        let _ = proc.kill(true, Some(Duration::from_secs(2))).await;
    }

    #[tokio::test]
    async fn test_is_running_false_for_reaped_process() {
        let mut child = spawn_sleep(0).await;
        child.wait().await.unwrap();
        let proc = ControllableProcess::new(child.id().unwrap_or(1));
        // Give the kernel a moment to fully recycle the PID slot in CI.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!proc.is_running());
    }

    #[tokio::test]
    async fn test_suspend_blocks_terminate_until_resumed() {
        let mut child = spawn_sleep(60).await;
        let pid = child.id().unwrap();
        let proc = ControllableProcess::new(pid);

        proc.suspend().unwrap();
        let stopped = proc.terminate(false, None).await.unwrap();
        assert!(!stopped);
        assert!(
            proc.is_running(),
            "child responded to SIGTERM even though it was suspended"
        );

        proc.resume().unwrap();
        let killed = proc.kill(true, Some(Duration::from_secs(5))).await.unwrap();
        assert!(killed, "child didn't respond to SIGKILL after being resumed");
        let _ = child.wait().await;
    }

    #[tokio::test]
    async fn test_terminate_wait_false_returns_immediately() {
        let mut child = spawn_sleep(5).await;
        let pid = child.id().unwrap();
        let proc = ControllableProcess::new(pid);
        // wait=false never blocks on the poll loop.
        let _ = proc.terminate(false, None).await.unwrap();
        let _ = child.wait().await;
    }

    #[tokio::test]
    async fn test_kill_with_timeout_reaps_quickly() {
        let mut child = spawn_sleep(60).await;
        let pid = child.id().unwrap();
        let proc = ControllableProcess::new(pid);
        let killed = proc.kill(true, Some(Duration::from_secs(5))).await.unwrap();
        assert!(killed);
        let _ = child.wait().await;
    }

    #[tokio::test]
    async fn test_is_running_detects_unreaped_zombie_promptly() {
        // Nobody calls `child.wait()` until after the assertion: a bare
        // `kill(pid, 0)` probe would still report this exited-but-unreaped
        // child as alive, so this specifically exercises the `waitid`
        // peek that distinguishes a zombie from a live process.
        let mut child = spawn_sleep(60).await;
        let pid = child.id().unwrap();
        let proc = ControllableProcess::new(pid);

        proc.kill(false, None).await.unwrap();
        let became_dead = proc
            .await_exit_if_requested(true, Some(Duration::from_millis(500)))
            .await
            .unwrap();
        assert!(
            became_dead,
            "is_running() should see the zombie die well within 500ms, not just after a reap"
        );
        let _ = child.wait().await;
    }
}
