//! Bounded-concurrency scheduler over a set of commands.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{CommandPoolFailed, PoolFailure};
use crate::poolable::Poolable;

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const DEFAULT_TERMINATE_GRACE: Duration = Duration::from_secs(10);
/// Upper bound on how long `run()`'s failure path waits for a terminated
/// survivor to actually be reaped, on top of the grace `terminate()`
/// itself already waited out.
const REAP_AFTER_TERMINATE_TIMEOUT: Duration = Duration::from_secs(2);

struct Entry<C> {
    identifier: String,
    command: C,
    started: bool,
    reaped: bool,
}

/// Error a `run()` call can terminate with: either the first failure
/// encountered (default failure policy) or the aggregate of every
/// failure (`delay_checks`).
#[derive(Debug, thiserror::Error)]
pub enum RunError<C: std::fmt::Debug, E: std::error::Error + Send + Sync + 'static> {
    /// The first failure encountered, plus every other pool member as it
    /// stood once `run()` terminated them: a member that was still
    /// running at the time of the failure is signaled and reaped before
    /// this variant is returned, so `survivors.get(id).is_terminated()`
    /// reflects reality rather than a still-`Spawned` member that merely
    /// received a signal.
    #[error("{failure}")]
    Single {
        failure: PoolFailure<E>,
        survivors: HashMap<String, C>,
    },
    #[error(transparent)]
    Aggregate(#[from] CommandPoolFailed<E>),
}

/// Holds an insertion-ordered set of commands and runs up to `concurrency`
/// of them at a time.
///
/// Commands added to a pool must already be configured for asynchronous
/// start (`async_mode(true)` on an `ExternalCommand`, or the `RemoteCommand`
/// equivalent) — the pool's own non-blocking contract for `spawn()` depends
/// on `start()` returning as soon as the child is spawned.
pub struct CommandPool<C: Poolable> {
    concurrency: usize,
    delay_checks: bool,
    logs_directory: Option<PathBuf>,
    entries: Vec<Entry<C>>,
    next_id: u64,
}

impl<C: Poolable> CommandPool<C> {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            delay_checks: false,
            logs_directory: None,
            entries: Vec::new(),
            next_id: 1,
        }
    }

    pub fn delay_checks(mut self, delay_checks: bool) -> Self {
        self.delay_checks = delay_checks;
        self
    }

    pub fn logs_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.logs_directory = Some(dir.into());
        for entry in &mut self.entries {
            entry.command.enable_capture();
        }
        self
    }

    /// Append a command, assigning a sequential identifier unless one is
    /// given. Panics if `identifier` collides with an existing entry, per
    /// the pool's uniqueness invariant. A `logs_directory` pool enables
    /// stdout capture on every member as it's added, since `write_log`
    /// has nothing to write otherwise.
    pub fn add(&mut self, mut command: C, identifier: Option<String>) -> String {
        let identifier = identifier.unwrap_or_else(|| {
            let id = self.next_id;
            self.next_id += 1;
            id.to_string()
        });
        assert!(
            !self.entries.iter().any(|e| e.identifier == identifier),
            "duplicate pool identifier: {identifier}"
        );
        if self.logs_directory.is_some() {
            command.enable_capture();
        }
        self.entries.push(Entry {
            identifier: identifier.clone(),
            command,
            started: false,
            reaped: false,
        });
        identifier
    }

    pub fn is_finished(&self) -> bool {
        self.entries.iter().all(|e| e.reaped)
    }

    /// Inspect a member by identifier, e.g. to confirm a still-running
    /// command was actually terminated after `terminate()`/a failed `run()`.
    pub fn get(&self, identifier: &str) -> Option<&C> {
        self.entries
            .iter()
            .find(|e| e.identifier == identifier)
            .map(|e| &e.command)
    }

    /// Start as many unstarted commands as the concurrency bound allows.
    /// Non-blocking: returns as soon as spawning, not completion.
    pub async fn spawn(&mut self) -> Result<(), PoolFailure<C::Error>> {
        let running = self
            .entries
            .iter()
            .filter(|e| e.started && !e.reaped)
            .count();
        let mut available = self.concurrency.saturating_sub(running);
        for entry in &mut self.entries {
            if available == 0 {
                break;
            }
            if entry.started {
                continue;
            }
            debug!(identifier = %entry.identifier, "starting pooled command");
            if let Err(source) = entry.command.start().await {
                entry.started = true;
                entry.reaped = true;
                return Err(PoolFailure {
                    identifier: entry.identifier.clone(),
                    source,
                });
            }
            entry.started = true;
            available -= 1;
        }
        Ok(())
    }

    /// Reap every command that has finished since the last call. Returns
    /// the first failure encountered in insertion order (outside
    /// `delay_checks`); subsequent calls resume scanning where the last
    /// one left off, surfacing remaining failures one at a time.
    pub async fn collect(&mut self) -> Result<(), PoolFailure<C::Error>> {
        let mut just_reaped = Vec::new();
        let mut failure = None;

        for entry in &mut self.entries {
            if !entry.started || entry.reaped {
                continue;
            }
            match entry.command.try_wait().await {
                Ok(false) => continue,
                Ok(true) => {
                    entry.reaped = true;
                    just_reaped.push(entry.identifier.clone());
                }
                Err(source) => {
                    entry.reaped = true;
                    just_reaped.push(entry.identifier.clone());
                    failure = Some(PoolFailure {
                        identifier: entry.identifier.clone(),
                        source,
                    });
                    break;
                }
            }
        }

        for identifier in just_reaped {
            self.write_log(&identifier);
        }

        match failure {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    fn write_log(&self, identifier: &str) {
        let Some(dir) = &self.logs_directory else {
            return;
        };
        let Some(entry) = self.entries.iter().find(|e| e.identifier == identifier) else {
            return;
        };
        let Some(bytes) = entry.command.stdout_bytes() else {
            return;
        };
        if std::fs::create_dir_all(dir).is_err() {
            return;
        }
        let path = dir.join(format!("{identifier}.log"));
        if let Err(e) = std::fs::write(&path, bytes) {
            warn!(path = %path.display(), "failed to write pool log: {e}");
        }
    }

    /// Send termination (politely, then forcefully after `grace`) to every
    /// still-running member.
    pub async fn terminate(&self, grace: Duration) {
        for entry in &self.entries {
            if entry.started && !entry.reaped {
                let _ = entry.command.terminate_then_kill(grace).await;
            }
        }
    }

    /// After `terminate()` has signaled every survivor, perform the actual
    /// reap on each so its final state (`is_terminated`, `returncode`, ...)
    /// is observable rather than left dangling in `Spawned`. Errors
    /// (a terminated member's nonzero exit failing its own `check`) are
    /// swallowed here: the caller is already unwinding on a different
    /// failure and only wants the final state of the rest.
    async fn reap_after_terminate(&mut self) {
        let deadline = Instant::now() + REAP_AFTER_TERMINATE_TIMEOUT;
        for entry in &mut self.entries {
            if !entry.started || entry.reaped {
                continue;
            }
            loop {
                match entry.command.try_wait().await {
                    Ok(true) | Err(_) => break,
                    Ok(false) if Instant::now() >= deadline => break,
                    Ok(false) => tokio::time::sleep(POLL_INTERVAL).await,
                }
            }
            entry.reaped = true;
        }
    }

    fn into_entries(self) -> HashMap<String, C> {
        self.entries.into_iter().map(|e| (e.identifier, e.command)).collect()
    }

    /// Drive `spawn`/`collect` to completion, applying the pool's failure
    /// policy, and return the completed commands keyed by identifier.
    pub async fn run(mut self) -> Result<HashMap<String, C>, RunError<C, C::Error>> {
        let mut aggregate = Vec::new();

        loop {
            if let Err(failure) = self.spawn().await {
                if self.delay_checks {
                    aggregate.push(failure);
                } else {
                    self.terminate(DEFAULT_TERMINATE_GRACE).await;
                    self.reap_after_terminate().await;
                    return Err(RunError::Single {
                        failure,
                        survivors: self.into_entries(),
                    });
                }
            }

            if self.is_finished() {
                break;
            }

            if let Err(failure) = self.collect().await {
                if self.delay_checks {
                    aggregate.push(failure);
                } else {
                    self.terminate(DEFAULT_TERMINATE_GRACE).await;
                    self.reap_after_terminate().await;
                    return Err(RunError::Single {
                        failure,
                        survivors: self.into_entries(),
                    });
                }
            }

            if self.is_finished() {
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        if !aggregate.is_empty() {
            return Err(RunError::Aggregate(CommandPoolFailed { failures: aggregate }));
        }

        Ok(self.into_entries())
    }
}
