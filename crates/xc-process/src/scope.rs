//! RAII cleanup for an [`ExternalCommand`] whose caller wants "kill it if
//! I forget to" safety without giving up an explicit, awaitable teardown
//! path.
//!
//! `Drop` in Rust cannot run async code, so unlike the Python
//! `with command:` context manager (which can `await` a graceful
//! terminate-then-kill sequence on scope exit), this guard offers two
//! tiers: call [`close`](CommandScope::close) for the real thing, or let
//! the guard drop and fall back to a synchronous best-effort `SIGTERM`.
//! `ExternalCommand::spawn_internal` additionally sets `kill_on_drop(true)`
//! on the underlying `tokio::process::Command` as a last-resort net.

use std::time::Duration;

use tracing::warn;

use crate::command::ExternalCommand;
use crate::process::ControllableProcess;

/// Owns a started [`ExternalCommand`] and ensures it is not left running
/// past the guard's lifetime.
pub struct CommandScope {
    command: Option<ExternalCommand>,
}

impl CommandScope {
    pub fn new(command: ExternalCommand) -> Self {
        Self {
            command: Some(command),
        }
    }

    pub fn get(&self) -> &ExternalCommand {
        self.command.as_ref().expect("command taken")
    }

    pub fn get_mut(&mut self) -> &mut ExternalCommand {
        self.command.as_mut().expect("command taken")
    }

    /// Gracefully terminate (escalating to kill after `grace`) and reap the
    /// command, consuming the guard. This is the only path that can wait
    /// on the child asynchronously; prefer it over letting the guard drop.
    /// Returns the now-reaped command so the caller can inspect its final
    /// state (`is_finished`, `returncode`, ...).
    pub async fn close(mut self, grace: Duration) -> std::io::Result<ExternalCommand> {
        let mut command = self.command.take().expect("command taken");
        if command.is_running() {
            let _ = command.terminate(true, Some(grace)).await;
            if command.is_running() {
                let _ = command.kill(true, Some(grace)).await;
            }
            // Signals alone don't reap: without this, the command never
            // leaves `Spawned` for `Reaped` along this path.
            let _ = command.wait().await;
        }
        Ok(command)
    }

    pub fn into_inner(mut self) -> ExternalCommand {
        self.command.take().expect("command taken")
    }
}

impl Drop for CommandScope {
    fn drop(&mut self) {
        let Some(command) = &self.command else { return };
        if let Some(pid) = command.pid()
            && command.is_running()
        {
            warn!(pid, "CommandScope dropped without close(); sending best-effort SIGTERM");
            let proc = ControllableProcess::new(pid);
            let _ = proc.signal_term_best_effort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ExternalCommand;
    use std::time::Duration;

    #[tokio::test]
    async fn test_close_terminates_running_command() {
        let mut cmd = ExternalCommand::new(["sleep", "30"]).async_mode(true);
        cmd.start().await.unwrap();
        let scope = CommandScope::new(cmd);
        assert!(scope.get().is_running());
        let reaped = scope.close(Duration::from_secs(5)).await.unwrap();
        assert!(reaped.is_finished(), "close() should reap, not just signal");
        assert!(!reaped.is_running());
    }

    #[tokio::test]
    async fn test_drop_without_close_sends_sigterm() {
        let mut cmd = ExternalCommand::new(["sleep", "30"]).async_mode(true);
        cmd.start().await.unwrap();
        let pid = cmd.pid().unwrap();
        {
            let _scope = CommandScope::new(cmd);
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!ControllableProcess::new(pid).is_running());
    }
}
