//! A remote-machine execution context, bound to one `ssh` host.

use std::fmt;
use std::path::PathBuf;

use tracing::warn;
use xc_remote::{RemoteCommand, RemoteError, RemoteOptions, SshOptions};

/// Uniform façade over a single remote host, mirroring [`crate::local::LocalContext`].
pub struct RemoteContext {
    ssh: SshOptions,
    directory: Option<PathBuf>,
    cleanup_queue: Vec<Vec<String>>,
}

impl RemoteContext {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            ssh: SshOptions::new(host),
            directory: None,
            cleanup_queue: Vec::new(),
        }
    }

    pub fn ssh_user(mut self, user: impl Into<String>) -> Self {
        self.ssh.ssh_user = Some(user.into());
        self
    }

    pub fn directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.directory = Some(dir.into());
        self
    }

    pub fn host(&self) -> &str {
        &self.ssh.host
    }

    fn build<I, S>(&self, argv: I) -> RemoteCommand
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let remote = RemoteOptions {
            directory: self.directory.clone(),
            ..RemoteOptions::default()
        };
        RemoteCommand::new(self.ssh.clone(), remote, argv)
    }

    pub async fn execute<I, S>(&self, argv: I) -> Result<(), RemoteError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.build(argv).start().await
    }

    pub async fn capture<I, S>(&self, argv: I) -> Result<String, RemoteError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut cmd = self.build(argv).capture(true);
        cmd.start().await?;
        Ok(cmd.output().unwrap_or_default())
    }

    pub fn cleanup<I, S>(&mut self, argv: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cleanup_queue
            .push(argv.into_iter().map(Into::into).collect());
    }

    pub async fn run_cleanup(&mut self) -> Vec<RemoteError> {
        let mut errors = Vec::new();
        while let Some(argv) = self.cleanup_queue.pop() {
            if let Err(e) = self.build(argv).check(false).start().await {
                errors.push(e);
            }
        }
        errors
    }
}

impl Drop for RemoteContext {
    fn drop(&mut self) {
        if !self.cleanup_queue.is_empty() {
            warn!(
                host = %self.ssh.host,
                pending = self.cleanup_queue.len(),
                "RemoteContext dropped with unrun cleanup commands; call run_cleanup().await first"
            );
        }
    }
}

impl fmt::Display for RemoteContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "remote system {}", self.ssh.host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_contains_system_and_host() {
        let ctx = RemoteContext::new("box1");
        let s = ctx.to_string();
        assert!(s.contains("system"));
        assert!(s.contains("box1"));
    }

    #[test]
    fn test_host_accessor() {
        let ctx = RemoteContext::new("box2");
        assert_eq!(ctx.host(), "box2");
    }
}
