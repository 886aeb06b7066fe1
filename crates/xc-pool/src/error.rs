//! Pool-level error taxonomy.

use thiserror::Error;

/// One command's failure as surfaced by a pool, carrying the identifier
/// that was assigned to it.
#[derive(Debug, Error)]
#[error("command {identifier} failed: {source}")]
pub struct PoolFailure<E: std::error::Error + Send + Sync + 'static> {
    pub identifier: String,
    #[source]
    pub source: E,
}

/// Aggregate error raised once by a `delay_checks` pool's `run()` after
/// every command has finished.
#[derive(Debug, Error)]
#[error("{} command(s) in the pool failed", failures.len())]
pub struct CommandPoolFailed<E: std::error::Error + Send + Sync + 'static> {
    pub failures: Vec<PoolFailure<E>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_pool_failure_display() {
        let failure = PoolFailure {
            identifier: "3".to_string(),
            source: io::Error::other("boom"),
        };
        assert_eq!(failure.to_string(), "command 3 failed: boom");
    }

    #[test]
    fn test_command_pool_failed_display() {
        let err = CommandPoolFailed {
            failures: vec![PoolFailure {
                identifier: "1".to_string(),
                source: io::Error::other("x"),
            }],
        };
        assert_eq!(err.to_string(), "1 command(s) in the pool failed");
    }
}
