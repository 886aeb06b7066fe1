//! The external-command state machine: argv synthesis, spawn, stdio
//! plumbing, timeouts and reaping.

use std::collections::HashMap;
use std::fs::File;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use xc_core::{Error, which};

use crate::argv;
use crate::process::ControllableProcess;
use crate::stdio::{self, StderrSink, StdoutSink};

/// Default grace period between a polite `terminate` and a forceful `kill`
/// when a timeout or scope-exit fires.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(10);
/// Default shell used to interpret single-token shell-syntax commands.
pub const DEFAULT_SHELL: &str = "bash";

/// Text decoding applied by the `output`/`stderr_output` accessors.
///
/// The upstream Python library supports arbitrary codecs; POSIX command
/// output in practice is UTF-8 or binary, so this engine supports exactly
/// one (lossy UTF-8) and leaves raw bytes available via
/// [`ExternalCommand::stdout_bytes`] for anything else.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Encoding {
    #[default]
    Utf8Lossy,
}

/// Boolean/flag knobs that don't need their own constructor argument.
#[derive(Debug, Clone)]
pub struct CommandOptions {
    pub capture: bool,
    pub capture_stderr: bool,
    pub merge_streams: bool,
    pub silent: bool,
    pub check: bool,
    pub async_mode: bool,
    pub sudo: bool,
    pub fakeroot: bool,
    pub encoding: Encoding,
    pub timeout: Option<Duration>,
    pub kill_grace: Duration,
}

impl Default for CommandOptions {
    fn default() -> Self {
        Self {
            capture: false,
            capture_stderr: false,
            merge_streams: false,
            silent: false,
            check: true,
            async_mode: false,
            sudo: false,
            fakeroot: false,
            encoding: Encoding::default(),
            timeout: None,
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }
}

struct SpawnedState {
    child: tokio::process::Child,
    pid: u32,
    stdout_task: Option<JoinHandle<Vec<u8>>>,
    stderr_task: Option<JoinHandle<Vec<u8>>>,
    stdin_task: Option<JoinHandle<()>>,
    #[allow(dead_code)]
    started_at: Instant,
}

struct ReapedState {
    pid: Option<u32>,
    returncode: i32,
    stdout_bytes: Option<Vec<u8>>,
    stderr_bytes: Option<Vec<u8>>,
    terminated: bool,
    timed_out: bool,
}

enum CommandState {
    Init,
    Spawned(SpawnedState),
    Reaped(ReapedState),
}

/// The central entity: a specification of an external program invocation
/// plus the machinery to run it.
///
/// Lifecycle: `INIT -> SPAWNED -> (RUNNING|SUSPENDED)* -> REAPED`.
/// `was_started` becomes true on leaving `INIT`; `is_finished` implies
/// `was_started`; `returncode` is defined iff `is_finished`.
pub struct ExternalCommand {
    argv: Vec<String>,
    shell: String,
    environment: HashMap<String, String>,
    directory: Option<PathBuf>,
    input: Option<Vec<u8>>,
    options: CommandOptions,
    stdout_file: Option<File>,
    stderr_file: Option<File>,
    virtual_environment: Option<PathBuf>,
    command_line: Vec<String>,
    state: CommandState,
}

impl ExternalCommand {
    /// Construct a command from an argument vector. A single-element argv
    /// containing shell metacharacters is treated as shell syntax (see
    /// [`crate::argv::synthesize_base`]); anything else is exec'd directly.
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let argv: Vec<String> = argv.into_iter().map(Into::into).collect();
        Self {
            argv,
            shell: DEFAULT_SHELL.to_string(),
            environment: HashMap::new(),
            directory: None,
            input: None,
            options: CommandOptions::default(),
            stdout_file: None,
            stderr_file: None,
            virtual_environment: None,
            command_line: Vec::new(),
            state: CommandState::Init,
        }
    }

    /// Convenience constructor for a single shell-syntax string, e.g.
    /// `ExternalCommand::shell("exit 42")`.
    pub fn shell(command: impl Into<String>) -> Self {
        Self::new([command.into()])
    }

    pub fn environment(mut self, vars: HashMap<String, String>) -> Self {
        self.environment = vars;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.directory = Some(dir.into());
        self
    }

    pub fn input(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.input = Some(data.into());
        self
    }

    pub fn capture(mut self, capture: bool) -> Self {
        self.options.capture = capture;
        self
    }

    /// `&mut self` form of [`capture`](Self::capture), for callers that
    /// only hold a command after it's already been built (e.g. a pool
    /// turning capture on for every member once a `logs_directory` is set).
    pub fn set_capture(&mut self, capture: bool) {
        self.options.capture = capture;
    }

    pub fn capture_stderr(mut self, capture: bool) -> Self {
        self.options.capture_stderr = capture;
        self
    }

    pub fn merge_streams(mut self, merge: bool) -> Self {
        self.options.merge_streams = merge;
        self
    }

    pub fn silent(mut self, silent: bool) -> Self {
        self.options.silent = silent;
        self
    }

    pub fn check(mut self, check: bool) -> Self {
        self.options.check = check;
        self
    }

    pub fn async_mode(mut self, async_mode: bool) -> Self {
        self.options.async_mode = async_mode;
        self
    }

    pub fn sudo(mut self, sudo: bool) -> Self {
        self.options.sudo = sudo;
        self
    }

    pub fn fakeroot(mut self, fakeroot: bool) -> Self {
        self.options.fakeroot = fakeroot;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    pub fn kill_grace(mut self, grace: Duration) -> Self {
        self.options.kill_grace = grace;
        self
    }

    pub fn virtual_environment(mut self, venv: impl Into<PathBuf>) -> Self {
        self.virtual_environment = Some(venv.into());
        self
    }

    pub fn stdout_file(mut self, file: File) -> Self {
        self.stdout_file = Some(file);
        self
    }

    pub fn stderr_file(mut self, file: File) -> Self {
        self.stderr_file = Some(file);
        self
    }

    pub fn shell_program(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// The synthesized argv this command will actually (or did) exec.
    /// Populated once [`start`](Self::start) has been called at least once.
    pub fn command_line(&self) -> &[String] {
        &self.command_line
    }

    pub fn was_started(&self) -> bool {
        !matches!(self.state, CommandState::Init)
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, CommandState::Spawned(_))
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.state, CommandState::Reaped(_))
    }

    pub fn is_terminated(&self) -> bool {
        matches!(&self.state, CommandState::Reaped(r) if r.terminated)
    }

    pub fn failed(&self) -> bool {
        match &self.state {
            CommandState::Reaped(r) => r.timed_out || (self.options.check && r.returncode != 0),
            _ => false,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        match &self.state {
            CommandState::Spawned(s) => Some(s.pid),
            CommandState::Reaped(r) => r.pid,
            CommandState::Init => None,
        }
    }

    pub fn returncode(&self) -> Option<i32> {
        match &self.state {
            CommandState::Reaped(r) => Some(r.returncode),
            _ => None,
        }
    }

    pub fn stdout_bytes(&self) -> Option<&[u8]> {
        match &self.state {
            CommandState::Reaped(r) => r.stdout_bytes.as_deref(),
            _ => None,
        }
    }

    pub fn stderr_bytes(&self) -> Option<&[u8]> {
        match &self.state {
            CommandState::Reaped(r) => r.stderr_bytes.as_deref(),
            _ => None,
        }
    }

    /// Decoded stdout, stripped of a single trailing newline to match shell
    /// command-substitution semantics (`` `echo hi` `` yields `hi`, not
    /// `hi\n`) — mirrors the upstream Python library's `output` property.
    pub fn output(&self) -> Option<String> {
        self.stdout_bytes().map(|b| decode_and_strip(b, self.options.encoding))
    }

    pub fn stderr_output(&self) -> Option<String> {
        self.stderr_bytes().map(|b| decode_and_strip(b, self.options.encoding))
    }

    async fn controllable(&self) -> Option<ControllableProcess> {
        self.pid().map(ControllableProcess::new)
    }

    pub async fn suspend(&self) -> std::io::Result<()> {
        match self.controllable().await {
            Some(p) => p.suspend(),
            None => Ok(()),
        }
    }

    pub async fn resume(&self) -> std::io::Result<()> {
        match self.controllable().await {
            Some(p) => p.resume(),
            None => Ok(()),
        }
    }

    pub async fn terminate(&self, wait: bool, timeout: Option<Duration>) -> std::io::Result<bool> {
        match self.controllable().await {
            Some(p) => p.terminate(wait, timeout).await,
            None => Ok(true),
        }
    }

    pub async fn kill(&self, wait: bool, timeout: Option<Duration>) -> std::io::Result<bool> {
        match self.controllable().await {
            Some(p) => p.kill(wait, timeout).await,
            None => Ok(true),
        }
    }

    /// Resolve and spawn the child, wiring up stdio per the configured
    /// options. Does not wait for completion.
    fn spawn_internal(&mut self) -> Result<(), Error> {
        let effective_user_is_root = unsafe { libc::geteuid() } == 0;

        let (mut base, mut uses_shell) =
            argv::synthesize_base(&self.argv, &self.shell, false);
        if let Some(venv) = &self.virtual_environment {
            base = argv::wrap_virtual_environment(base, &self.shell, venv);
            uses_shell = true;
        }
        let effective = argv::wrap_privileges(
            base,
            self.options.sudo,
            self.options.fakeroot,
            effective_user_is_root,
        );
        self.command_line = effective.clone();

        let program = effective.first().cloned().ok_or_else(|| {
            Error::CommandNotFound(String::new())
        })?;

        if !uses_shell && !program.contains('/') && which(&program).is_empty() {
            return Err(Error::CommandNotFound(program));
        }

        let mut cmd = Command::new(&program);
        cmd.args(&effective[1..]);
        if let Some(dir) = &self.directory {
            cmd.current_dir(dir);
        }
        for (k, v) in &self.environment {
            cmd.env(k, v);
        }

        let stdin_needs_pipe = self.input.is_some();
        let (stdout_sink, stderr_sink) = if self.options.silent {
            (StdoutSink::Null, StderrSink::Null)
        } else {
            let stdout_sink = match self.stdout_file.take() {
                Some(f) => StdoutSink::File(f),
                None if self.options.capture => StdoutSink::Capture,
                None => StdoutSink::Inherit,
            };
            let stderr_sink = if self.options.merge_streams {
                StderrSink::MergeWithStdout
            } else if let Some(f) = self.stderr_file.take() {
                StderrSink::File(f)
            } else if self.options.capture_stderr {
                StderrSink::Capture
            } else {
                StderrSink::Inherit
            };
            (stdout_sink, stderr_sink)
        };

        let (stdin_stdio, stdout_stdio, stderr_stdio, merged_reader) =
            stdio::build_stdio(stdin_needs_pipe, stdout_sink, stderr_sink)
                .map_err(|_| Error::CommandNotFound(program.clone()))?;

        cmd.stdin(stdin_stdio);
        cmd.stdout(stdout_stdio);
        cmd.stderr(stderr_stdio);
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|_| Error::CommandNotFound(program.clone()))?;
        let pid = child.id().unwrap_or(0);

        let stdin_task = self.input.take().map(|data| {
            let mut stdin = child.stdin.take();
            tokio::spawn(async move {
                use tokio::io::AsyncWriteExt;
                if let Some(stdin) = stdin.as_mut() {
                    if let Err(e) = stdin.write_all(&data).await {
                        warn!("stdin write error: {e}");
                    }
                    let _ = stdin.shutdown().await;
                }
            })
        });

        let mut stdout_task = None;
        let mut stderr_task = None;
        if let Some(reader) = merged_reader {
            stdout_task = Some(stdio::spawn_drain_blocking_pipe(reader));
        } else {
            if let Some(out) = child.stdout.take() {
                stdout_task = Some(stdio::spawn_drain(out));
            }
            if let Some(err) = child.stderr.take() {
                stderr_task = Some(stdio::spawn_drain(err));
            }
        }

        debug!(pid, command = ?effective, "spawned external command");

        self.state = CommandState::Spawned(SpawnedState {
            child,
            pid,
            stdout_task,
            stderr_task,
            stdin_task,
            started_at: Instant::now(),
        });
        Ok(())
    }

    /// Start the command. In synchronous mode (`async_mode == false`,
    /// the default), blocks until reaped and returns an error if `check`
    /// and the exit code is nonzero, or if the timeout elapsed. In
    /// asynchronous mode, returns as soon as the child is spawned and
    /// drainers are launched; call [`wait`](Self::wait) later.
    pub async fn start(&mut self) -> Result<(), Error> {
        self.spawn_internal()?;
        if !self.options.async_mode {
            self.wait().await?;
        }
        Ok(())
    }

    /// Non-blocking poll for pool scheduling: returns `true` once the
    /// command has been reaped (transitioning state to `Reaped` if it just
    /// exited), `false` while still running. Never blocks on the child.
    pub async fn try_wait(&mut self) -> Result<bool, Error> {
        match &mut self.state {
            CommandState::Reaped(_) => Ok(true),
            CommandState::Init => Ok(false),
            CommandState::Spawned(s) => match s.child.try_wait() {
                Ok(Some(_status)) => {
                    self.wait().await?;
                    Ok(true)
                }
                Ok(None) => Ok(false),
                Err(_) => {
                    self.wait().await?;
                    Ok(true)
                }
            },
        }
    }

    /// Wait for the spawned child to finish, enforcing `check` and the
    /// configured timeout. A no-op (returns immediately) if the command is
    /// already reaped.
    pub async fn wait(&mut self) -> Result<(), Error> {
        let spawned = match std::mem::replace(&mut self.state, CommandState::Init) {
            CommandState::Spawned(s) => s,
            other @ CommandState::Reaped(_) => {
                self.state = other;
                return self.check_result();
            }
            CommandState::Init => return Ok(()),
        };
        let SpawnedState {
            mut child,
            pid,
            stdout_task,
            stderr_task,
            stdin_task,
            ..
        } = spawned;

        let mut terminated = false;
        let mut timed_out = false;

        let status = if let Some(timeout) = self.options.timeout {
            match tokio::time::timeout(timeout, child.wait()).await {
                Ok(result) => result,
                Err(_elapsed) => {
                    timed_out = true;
                    terminated = true;
                    warn!(pid, timeout_secs = timeout.as_secs_f64(), "command timed out; terminating");
                    let proc = ControllableProcess::new(pid);
                    let grace = self.options.kill_grace;
                    // Deliver the signal only; `child.wait()` below is the
                    // actual completion signal. `is_running()`'s `kill(pid,
                    // 0)` probe reports success for an exited-but-unreaped
                    // zombie, so polling it during the grace window would
                    // report the child as alive for the whole grace period
                    // no matter how fast it actually died. Racing
                    // `child.wait()` against the grace timeout reaps the
                    // instant the kernel makes the exit status available.
                    let _ = proc.terminate(false, None).await;
                    match tokio::time::timeout(grace, child.wait()).await {
                        Ok(result) => result,
                        Err(_elapsed) => {
                            warn!(pid, "command did not exit within kill grace; sending SIGKILL");
                            let _ = proc.kill(false, None).await;
                            child.wait().await
                        }
                    }
                }
            }
        } else {
            child.wait().await
        };

        if let Some(task) = stdin_task {
            let _ = task.await;
        }
        let stdout_bytes = match stdout_task {
            Some(task) => task.await.ok(),
            None => None,
        };
        let stderr_bytes = match stderr_task {
            Some(task) => task.await.ok(),
            None => None,
        };

        let returncode = match status {
            Ok(status) => status.code().unwrap_or_else(|| {
                terminated = true;
                128 + status.signal().unwrap_or(1)
            }),
            Err(e) => {
                warn!("failed to wait for child: {e}");
                terminated = true;
                1
            }
        };

        self.state = CommandState::Reaped(ReapedState {
            pid: Some(pid),
            returncode,
            stdout_bytes,
            stderr_bytes,
            terminated,
            timed_out,
        });

        self.check_result()
    }

    fn check_result(&self) -> Result<(), Error> {
        match &self.state {
            CommandState::Reaped(r) if r.timed_out => Err(Error::CommandTimedOut {
                command_line: self.command_line.clone(),
                timeout_secs: self
                    .options
                    .timeout
                    .map(|t| t.as_secs_f64())
                    .unwrap_or_default(),
            }),
            CommandState::Reaped(r) if self.options.check && r.returncode != 0 => {
                Err(Error::ExternalCommandFailed {
                    command_line: self.command_line.clone(),
                    returncode: r.returncode,
                })
            }
            _ => Ok(()),
        }
    }
}

/// Single-line output loses its trailing whitespace (convenient for string
/// comparisons against a command's one-line result); output with an
/// embedded newline is returned verbatim, trailing newline included, since
/// stripping it would silently swallow the last line along with it.
fn decode_and_strip(bytes: &[u8], encoding: Encoding) -> String {
    let Encoding::Utf8Lossy = encoding;
    let s = String::from_utf8_lossy(bytes).into_owned();
    let without_trailing_newline = s.strip_suffix('\n').unwrap_or(&s);
    if without_trailing_newline.contains('\n') {
        s
    } else {
        s.trim_end().to_string()
    }
}

impl std::fmt::Debug for ExternalCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalCommand")
            .field("argv", &self.argv)
            .field("async_mode", &self.options.async_mode)
            .field("directory", &self.directory)
            .field("environment", &self.environment)
            .field("was_started", &self.was_started())
            .field("is_running", &self.is_running())
            .field("is_finished", &self.is_finished())
            .finish()
    }
}
