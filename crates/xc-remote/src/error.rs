//! Error taxonomy for remote command execution.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("failed to connect to {host} (ssh exited 255)")]
    RemoteConnectFailed { host: String },

    #[error("remote command on {host} exited with status {returncode}")]
    RemoteCommandFailed { host: String, returncode: i32 },

    #[error(transparent)]
    Local(#[from] xc_core::Error),
}
