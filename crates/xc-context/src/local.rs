//! A local-machine execution context.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use tracing::warn;
use xc_process::ExternalCommand;

/// Uniform façade over the local machine: `execute`, `capture`, and a
/// cleanup queue run in reverse insertion order.
///
/// Cleanup commands cannot run inside `Drop` (no async there); call
/// [`run_cleanup`](Self::run_cleanup) explicitly before the context goes
/// out of scope. `Drop` only warns if cleanup was left unrun, the same
/// safety-net texture as `xc_process::CommandScope`.
pub struct LocalContext {
    directory: Option<PathBuf>,
    environment: HashMap<String, String>,
    cleanup_queue: Vec<Vec<String>>,
}

impl LocalContext {
    pub fn new() -> Self {
        Self {
            directory: None,
            environment: HashMap::new(),
            cleanup_queue: Vec::new(),
        }
    }

    pub fn directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.directory = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    fn build<I, S>(&self, argv: I) -> ExternalCommand
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut cmd = ExternalCommand::new(argv).environment(self.environment.clone());
        if let Some(dir) = &self.directory {
            cmd = cmd.directory(dir.clone());
        }
        cmd
    }

    pub async fn execute<I, S>(&self, argv: I) -> Result<(), xc_core::Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.build(argv).start().await
    }

    pub async fn capture<I, S>(&self, argv: I) -> Result<String, xc_core::Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut cmd = self.build(argv).capture(true);
        cmd.start().await?;
        Ok(cmd.output().unwrap_or_default())
    }

    /// Enqueue a command to run when cleanup is invoked. Enqueued commands
    /// run in reverse insertion order.
    pub fn cleanup<I, S>(&mut self, argv: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cleanup_queue
            .push(argv.into_iter().map(Into::into).collect());
    }

    /// Run every enqueued cleanup command in reverse order. Every command
    /// is attempted exactly once; a failure is reported in the returned
    /// list but does not stop the remaining cleanups from running.
    pub async fn run_cleanup(&mut self) -> Vec<xc_core::Error> {
        let mut errors = Vec::new();
        while let Some(argv) = self.cleanup_queue.pop() {
            if let Err(e) = self.build(argv).check(false).start().await {
                errors.push(e);
            }
        }
        errors
    }
}

impl Default for LocalContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LocalContext {
    fn drop(&mut self) {
        if !self.cleanup_queue.is_empty() {
            warn!(
                pending = self.cleanup_queue.len(),
                "LocalContext dropped with unrun cleanup commands; call run_cleanup().await first"
            );
        }
    }
}

impl fmt::Display for LocalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local system")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_execute_runs_command() {
        let ctx = LocalContext::new();
        ctx.execute(["true"]).await.unwrap();
    }

    #[tokio::test]
    async fn test_capture_returns_stdout() {
        let ctx = LocalContext::new();
        let output = ctx.capture(["echo", "hi"]).await.unwrap();
        assert_eq!(output, "hi");
    }

    #[tokio::test]
    async fn test_cleanup_runs_in_reverse_order() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("order.txt");
        let mut ctx = LocalContext::new();
        ctx.cleanup([
            "sh".to_string(),
            "-c".to_string(),
            format!("echo first >> {}", marker.display()),
        ]);
        ctx.cleanup([
            "sh".to_string(),
            "-c".to_string(),
            format!("echo second >> {}", marker.display()),
        ]);
        let errors = ctx.run_cleanup().await;
        assert!(errors.is_empty());
        let content = std::fs::read_to_string(&marker).unwrap();
        assert_eq!(content, "second\nfirst\n");
    }

    #[test]
    fn test_display_contains_system() {
        let ctx = LocalContext::new();
        assert!(ctx.to_string().contains("system"));
    }
}
