//! Secure-shell argv synthesis.

use std::fmt;
use std::time::Duration;

/// Mirrors `ssh -o StrictHostKeyChecking=...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrictHostKeyChecking {
    Yes,
    No,
    Ask,
}

impl fmt::Display for StrictHostKeyChecking {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Yes => "yes",
            Self::No => "no",
            Self::Ask => "ask",
        })
    }
}

/// Default connect timeout, matching the upstream library's default.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct SshOptions {
    pub host: String,
    pub ssh_user: Option<String>,
    pub batch_mode: bool,
    pub connect_timeout: Duration,
    pub strict_host_key_checking: StrictHostKeyChecking,
    pub ignore_known_hosts: bool,
}

impl SshOptions {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ssh_user: None,
            batch_mode: true,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            strict_host_key_checking: StrictHostKeyChecking::No,
            ignore_known_hosts: false,
        }
    }
}

/// Build the `ssh` invocation argv, embedding `remote_shell_string` as the
/// final token (ssh hands it to the remote user's shell verbatim).
pub fn build_ssh_argv(opts: &SshOptions, remote_shell_string: &str) -> Vec<String> {
    let mut argv = vec!["ssh".to_string()];

    argv.push("-o".into());
    argv.push(format!(
        "BatchMode={}",
        if opts.batch_mode { "yes" } else { "no" }
    ));

    argv.push("-o".into());
    argv.push(format!(
        "ConnectTimeout={}",
        opts.connect_timeout.as_secs()
    ));

    if opts.ignore_known_hosts {
        argv.push("-o".into());
        argv.push("UserKnownHostsFile=/dev/null".into());
        argv.push("-o".into());
        argv.push("StrictHostKeyChecking=no".into());
    } else {
        argv.push("-o".into());
        argv.push(format!(
            "StrictHostKeyChecking={}",
            opts.strict_host_key_checking
        ));
    }

    if let Some(user) = &opts.ssh_user {
        argv.push("-l".into());
        argv.push(user.clone());
    }

    argv.push(opts.host.clone());
    argv.push(remote_shell_string.to_string());
    argv
}
