//! Local process execution: argv synthesis, spawning, stdio capture,
//! timeouts, suspend/resume/terminate/kill, and RAII scope cleanup.

pub mod argv;
mod command;
mod process;
mod scope;
mod stdio;

pub use command::{CommandOptions, Encoding, ExternalCommand, DEFAULT_KILL_GRACE, DEFAULT_SHELL};
pub use process::ControllableProcess;
pub use scope::CommandScope;
