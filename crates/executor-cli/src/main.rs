//! Thin CLI wrapper around `xc-process`/`xc-lock`: parses flags, builds one
//! `ExternalCommand` from the trailing argv, and propagates its exit code.

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use xc_process::ExternalCommand;

/// Run an external command with timeout, fudge-factor delay, and
/// exclusive-lock controls.
#[derive(Parser, Debug)]
#[command(name = "executor", version, about)]
struct Cli {
    /// Kill the command after SECS seconds.
    #[arg(short = 't', long = "timeout", value_name = "SECS")]
    timeout: Option<f64>,

    /// Sleep for a random duration in [0, SECS] before starting.
    #[arg(short = 'f', long = "fudge-factor", value_name = "SECS")]
    fudge_factor: Option<f64>,

    /// Acquire a file lock keyed on the command before running it.
    #[arg(short = 'e', long = "exclusive")]
    exclusive: bool,

    /// Maximum time to wait for the exclusive lock.
    #[arg(short = 'l', long = "lock-timeout", value_name = "SECS")]
    lock_timeout: Option<f64>,

    /// Increase log verbosity (repeatable).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all but error-level logs.
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// The program and its arguments.
    #[arg(trailing_var_arg = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_logging(cli.verbose, cli.quiet) {
        eprintln!("executor: failed to initialize logging: {e:#}");
        std::process::exit(1);
    }

    if cli.command.is_empty() {
        println!("Usage: executor [OPTIONS] COMMAND [ARG...]");
        std::process::exit(0);
    }

    std::process::exit(run(cli).await);
}

/// Install the global tracing subscriber. Fallible (a second call in the
/// same process, or a malformed `RUST_LOG`, both return `Err` rather than
/// panicking) so the CLI can report setup failures through the same
/// `anyhow`-layered path the teacher uses at its outer call sites.
fn init_logging(verbose: u8, quiet: bool) -> anyhow::Result<()> {
    let default_level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .context("installing global tracing subscriber")
}

async fn run(cli: Cli) -> i32 {
    if let Some(fudge) = cli.fudge_factor {
        tokio::time::sleep(fudge_delay(Duration::from_secs_f64(fudge))).await;
    }

    let _lock = if cli.exclusive {
        let lock_timeout = cli.lock_timeout.map(Duration::from_secs_f64);
        match xc_lock::acquire(&cli.command, lock_timeout).await {
            Ok(lock) => Some(lock),
            Err(e) => {
                eprintln!("executor: failed to acquire exclusive lock: {e}");
                return 1;
            }
        }
    } else {
        None
    };

    let mut cmd = ExternalCommand::new(cli.command.clone()).check(false);
    if let Some(secs) = cli.timeout {
        cmd = cmd.timeout(Duration::from_secs_f64(secs));
    }

    match cmd.start().await {
        Ok(()) => cmd.returncode().unwrap_or(0),
        Err(xc_core::Error::CommandTimedOut { .. }) => {
            eprintln!("executor: command timed out");
            124
        }
        Err(xc_core::Error::CommandNotFound(name)) => {
            eprintln!("executor: command not found: {name}");
            127
        }
        Err(e) => {
            eprintln!("executor: {e}");
            cmd.returncode().unwrap_or(1)
        }
    }
}

/// A pseudo-random delay in `[0, max]`. No corpus example depends on a
/// random-number crate for anything this small, so this is stdlib-only
/// (seeded off the clock) rather than pulling in `rand` for one call site.
fn fudge_delay(max: Duration) -> Duration {
    use std::time::{SystemTime, UNIX_EPOCH};
    if max.is_zero() {
        return Duration::ZERO;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let fraction = f64::from(nanos) / f64::from(u32::MAX);
    Duration::from_secs_f64(max.as_secs_f64() * fraction)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fudge_delay_zero_max_is_zero() {
        assert_eq!(fudge_delay(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_fudge_delay_never_exceeds_max() {
        let max = Duration::from_secs(3);
        assert!(fudge_delay(max) <= max);
    }
}
