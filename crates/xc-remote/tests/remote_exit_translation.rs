use std::time::Duration;

use xc_remote::{RemoteCommand, RemoteError, RemoteOptions, SshOptions};

/// Unreachable-host runs exercise the real `ssh` binary end to end: no
/// network fixture can be relied on in CI, so this only asserts the two
/// outcomes the translation layer is responsible for distinguishing.
#[tokio::test]
async fn test_unreachable_host_surfaces_as_connect_failure_or_missing_binary() {
    let ssh = SshOptions {
        connect_timeout: Duration::from_secs(1),
        ..SshOptions::new("unreachable-host.invalid")
    };
    let mut cmd = RemoteCommand::new(ssh, RemoteOptions::default(), ["true"]);

    match cmd.start().await {
        Err(RemoteError::RemoteConnectFailed { host }) => assert_eq!(host, "unreachable-host.invalid"),
        Err(RemoteError::Local(xc_core::Error::CommandNotFound(name))) => assert_eq!(name, "ssh"),
        other => panic!("expected a connect failure or missing ssh binary, got {other:?}"),
    }
}

#[tokio::test]
async fn test_remote_command_line_includes_ssh_and_host() {
    let ssh = SshOptions::new("example.invalid");
    let cmd = RemoteCommand::new(ssh, RemoteOptions::default(), ["echo", "hi"]);

    let line = cmd.command_line();
    assert_eq!(line[0], "ssh");
    assert!(line.iter().any(|a| a == "example.invalid"));
}
