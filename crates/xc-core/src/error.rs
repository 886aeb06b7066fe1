/// Error taxonomy shared by the command engine, the remote transport and
/// the pool scheduler (see each crate's own error type for the variants
/// specific to it).
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("external command failed: {command_line:?} (exit code {returncode})")]
    ExternalCommandFailed {
        command_line: Vec<String>,
        returncode: i32,
    },

    #[error("command timed out after {timeout_secs}s: {command_line:?}")]
    CommandTimedOut {
        command_line: Vec<String>,
        timeout_secs: f64,
    },
}

impl Error {
    /// The exit code a caller should propagate for this error, if any.
    pub fn returncode(&self) -> Option<i32> {
        match self {
            Error::ExternalCommandFailed { returncode, .. } => Some(*returncode),
            _ => None,
        }
    }
}
