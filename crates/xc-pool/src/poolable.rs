//! The capability set a [`crate::pool::CommandPool`] needs from a command,
//! so the pool can schedule both local `ExternalCommand`s and
//! ssh-wrapped `RemoteCommand`s without knowing which it holds.
//!
//! This is the composition the upstream library expressed as
//! subclassing (`RemoteCommand` inheriting `ExternalCommand`): here the
//! pool depends only on this trait, and each command type supplies its
//! own notion of "start", "reaped" and "failed".

use std::time::Duration;

pub trait Poolable: Send + std::fmt::Debug + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Start the command asynchronously (must not block on completion).
    async fn start(&mut self) -> Result<(), Self::Error>;

    /// Non-blocking: `true` once reaped, transitioning internal state as
    /// a side effect the first time it observes exit.
    async fn try_wait(&mut self) -> Result<bool, Self::Error>;

    fn is_running(&self) -> bool;
    fn is_finished(&self) -> bool;
    fn is_terminated(&self) -> bool;
    fn pid(&self) -> Option<u32>;
    fn stdout_bytes(&self) -> Option<&[u8]>;

    /// Turn stdout capture on, for a pool that needs every member's output
    /// available once it's reaped (e.g. a `logs_directory` pool, which
    /// writes each member's captured stdout to `<identifier>.log`).
    fn enable_capture(&mut self);

    /// Escalate: polite terminate, then forceful kill if still alive after
    /// `grace`. Returns whether the process is confirmed stopped.
    async fn terminate_then_kill(&self, grace: Duration) -> std::io::Result<bool>;
}

impl Poolable for xc_process::ExternalCommand {
    type Error = xc_core::Error;

    async fn start(&mut self) -> Result<(), Self::Error> {
        xc_process::ExternalCommand::start(self).await
    }

    async fn try_wait(&mut self) -> Result<bool, Self::Error> {
        xc_process::ExternalCommand::try_wait(self).await
    }

    fn is_running(&self) -> bool {
        xc_process::ExternalCommand::is_running(self)
    }

    fn is_finished(&self) -> bool {
        xc_process::ExternalCommand::is_finished(self)
    }

    fn is_terminated(&self) -> bool {
        xc_process::ExternalCommand::is_terminated(self)
    }

    fn pid(&self) -> Option<u32> {
        xc_process::ExternalCommand::pid(self)
    }

    fn stdout_bytes(&self) -> Option<&[u8]> {
        xc_process::ExternalCommand::stdout_bytes(self)
    }

    fn enable_capture(&mut self) {
        xc_process::ExternalCommand::set_capture(self, true);
    }

    async fn terminate_then_kill(&self, grace: Duration) -> std::io::Result<bool> {
        if xc_process::ExternalCommand::terminate(self, true, Some(grace)).await? {
            return Ok(true);
        }
        xc_process::ExternalCommand::kill(self, true, Some(grace)).await
    }
}

impl Poolable for xc_remote::RemoteCommand {
    type Error = xc_remote::RemoteError;

    async fn start(&mut self) -> Result<(), Self::Error> {
        xc_remote::RemoteCommand::start(self).await
    }

    async fn try_wait(&mut self) -> Result<bool, Self::Error> {
        xc_remote::RemoteCommand::try_wait(self).await
    }

    fn is_running(&self) -> bool {
        xc_remote::RemoteCommand::is_running(self)
    }

    fn is_finished(&self) -> bool {
        xc_remote::RemoteCommand::is_finished(self)
    }

    fn is_terminated(&self) -> bool {
        xc_remote::RemoteCommand::is_terminated(self)
    }

    fn pid(&self) -> Option<u32> {
        xc_remote::RemoteCommand::pid(self)
    }

    fn stdout_bytes(&self) -> Option<&[u8]> {
        xc_remote::RemoteCommand::stdout_bytes(self)
    }

    fn enable_capture(&mut self) {
        xc_remote::RemoteCommand::set_capture(self, true);
    }

    async fn terminate_then_kill(&self, grace: Duration) -> std::io::Result<bool> {
        if xc_remote::RemoteCommand::terminate(self, true, Some(grace)).await? {
            return Ok(true);
        }
        xc_remote::RemoteCommand::kill(self, true, Some(grace)).await
    }
}
