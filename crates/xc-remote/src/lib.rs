//! Command execution over `ssh`: argv synthesis for the secure-shell
//! client and translation of remote exit codes into typed errors.

pub mod command;
pub mod error;
pub mod ssh;

pub use command::{RemoteCommand, RemoteOptions};
pub use error::RemoteError;
pub use ssh::{SshOptions, StrictHostKeyChecking};
