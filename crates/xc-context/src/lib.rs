//! A uniform façade over local and remote command execution, with
//! scope-exit cleanup queues.

pub mod local;
pub mod remote;

pub use local::LocalContext;
pub use remote::RemoteContext;
