//! `foreach`: fan a single remote command out across many hosts.

use std::time::Duration;

use xc_remote::{RemoteCommand, RemoteOptions, SshOptions};

use crate::pool::{CommandPool, RunError};

/// Run the same argv on every host in `hosts` with bounded concurrency
/// `concurrency`, returning one completed [`RemoteCommand`] per host, in
/// the order `hosts` was given. Each result is tagged with its
/// originating host via [`RemoteCommand::host`].
pub async fn foreach<I, S>(
    hosts: &[String],
    argv: I,
    concurrency: usize,
    capture: bool,
) -> Result<Vec<RemoteCommand>, RunError<RemoteCommand, xc_remote::RemoteError>>
where
    I: IntoIterator<Item = S> + Clone,
    S: Into<String>,
{
    let mut pool = CommandPool::new(concurrency);
    for (index, host) in hosts.iter().enumerate() {
        let cmd = RemoteCommand::new(SshOptions::new(host.clone()), RemoteOptions::default(), argv.clone())
            .async_mode(true)
            .capture(capture);
        pool.add(cmd, Some(index.to_string()));
    }

    let mut results = pool.run().await?;

    let mut ordered = Vec::with_capacity(hosts.len());
    for index in 0..hosts.len() {
        if let Some(cmd) = results.remove(&index.to_string()) {
            ordered.push(cmd);
        }
    }
    Ok(ordered)
}

/// Termination grace used when a `foreach` caller cancels the whole fan-out.
pub const FOREACH_TERMINATE_GRACE: Duration = Duration::from_secs(10);
