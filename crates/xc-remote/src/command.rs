//! `RemoteCommand`: an external command whose argv is wrapped for
//! execution over `ssh`, with remote-specific exit-code translation.

use std::path::PathBuf;
use std::time::Duration;

use xc_core::quote;
use xc_process::{argv as local_argv, ExternalCommand};

use crate::error::RemoteError;
use crate::ssh::{build_ssh_argv, SshOptions};

/// The host-facing knobs unique to a remote invocation; local stream
/// disposition (capture, timeouts, ...) is configured on the returned
/// `ExternalCommand` builder the same way as a local one.
#[derive(Debug, Clone, Default)]
pub struct RemoteOptions {
    pub directory: Option<PathBuf>,
    pub sudo: bool,
    pub fakeroot: bool,
}

/// Composes [`xc_process::ExternalCommand`] with an `ssh`-wrapped argv:
/// the remote program and its privilege wrappers are quoted into a single
/// shell string that `ssh` hands to the remote user's shell.
#[derive(Debug)]
pub struct RemoteCommand {
    host: String,
    check: bool,
    inner: ExternalCommand,
}

impl RemoteCommand {
    pub fn new<I, S>(ssh: SshOptions, remote: RemoteOptions, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let remote_argv: Vec<String> = argv.into_iter().map(Into::into).collect();
        // Privilege wrapping happens on the remote side; we cannot know the
        // remote effective user ahead of a connection, so `sudo` is never
        // locally suppressed here (unlike the local-command case).
        let wrapped = local_argv::wrap_privileges(remote_argv, remote.sudo, remote.fakeroot, false);
        let joined = quote(&wrapped);
        let remote_shell_string = match &remote.directory {
            Some(dir) => format!("cd {} && {}", quote([dir.to_string_lossy()]), joined),
            None => joined,
        };

        let host = ssh.host.clone();
        let ssh_argv = build_ssh_argv(&ssh, &remote_shell_string);
        let inner = ExternalCommand::new(ssh_argv).check(false);

        Self {
            host,
            check: true,
            inner,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn check(mut self, check: bool) -> Self {
        self.check = check;
        self
    }

    pub fn capture(mut self, capture: bool) -> Self {
        self.inner = self.inner.capture(capture);
        self
    }

    pub fn set_capture(&mut self, capture: bool) {
        self.inner.set_capture(capture);
    }

    pub fn capture_stderr(mut self, capture: bool) -> Self {
        self.inner = self.inner.capture_stderr(capture);
        self
    }

    pub fn async_mode(mut self, async_mode: bool) -> Self {
        self.inner = self.inner.async_mode(async_mode);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.inner = self.inner.timeout(timeout);
        self
    }

    pub fn input(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.inner = self.inner.input(data);
        self
    }

    pub fn command_line(&self) -> &[String] {
        self.inner.command_line()
    }

    pub fn pid(&self) -> Option<u32> {
        self.inner.pid()
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.is_terminated()
    }

    pub fn output(&self) -> Option<String> {
        self.inner.output()
    }

    pub fn stdout_bytes(&self) -> Option<&[u8]> {
        self.inner.stdout_bytes()
    }

    pub fn stderr_output(&self) -> Option<String> {
        self.inner.stderr_output()
    }

    pub async fn suspend(&self) -> std::io::Result<()> {
        self.inner.suspend().await
    }

    pub async fn resume(&self) -> std::io::Result<()> {
        self.inner.resume().await
    }

    pub async fn terminate(&self, wait: bool, timeout: Option<Duration>) -> std::io::Result<bool> {
        self.inner.terminate(wait, timeout).await
    }

    pub async fn kill(&self, wait: bool, timeout: Option<Duration>) -> std::io::Result<bool> {
        self.inner.kill(wait, timeout).await
    }

    /// Start the underlying `ssh` invocation. The inner command never
    /// raises on a nonzero exit (`check` is always disabled on it); this
    /// method applies the remote-specific translation instead.
    pub async fn start(&mut self) -> Result<(), RemoteError> {
        self.inner.start().await?;
        self.translate_check()
    }

    pub async fn wait(&mut self) -> Result<(), RemoteError> {
        self.inner.wait().await?;
        self.translate_check()
    }

    /// Non-blocking poll, for use by a pool scheduler.
    pub async fn try_wait(&mut self) -> Result<bool, RemoteError> {
        let finished = self.inner.try_wait().await?;
        if finished {
            self.translate_check()?;
        }
        Ok(finished)
    }

    fn translate_check(&self) -> Result<(), RemoteError> {
        if !self.check {
            return Ok(());
        }
        match self.inner.returncode() {
            None | Some(0) => Ok(()),
            Some(255) => Err(RemoteError::RemoteConnectFailed {
                host: self.host.clone(),
            }),
            Some(code) => Err(RemoteError::RemoteCommandFailed {
                host: self.host.clone(),
                returncode: code,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_shell_string_includes_directory_and_sudo() {
        let ssh = SshOptions::new("box1");
        let remote = RemoteOptions {
            directory: Some(PathBuf::from("/srv/app")),
            sudo: true,
            fakeroot: false,
        };
        let cmd = RemoteCommand::new(ssh, remote, ["systemctl", "restart", "app"]);
        let line = cmd.command_line().join(" ");
        assert!(line.contains("cd /srv/app &&"));
        assert!(line.contains("sudo -n systemctl restart app"));
    }

    #[test]
    fn test_host_accessor() {
        let cmd = RemoteCommand::new(SshOptions::new("box2"), RemoteOptions::default(), ["true"]);
        assert_eq!(cmd.host(), "box2");
    }
}
