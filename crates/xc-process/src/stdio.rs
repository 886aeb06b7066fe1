//! Stream-disposition resolution and concurrent drain helpers.
//!
//! Drainers run as separate tasks so that a child which fills its stdout
//! pipe while we're still reading stderr (or vice versa) can never
//! deadlock — the same concern `csa_process::wait_and_capture_with_idle_timeout`
//! addresses with a `tokio::select!` loop, simplified here to two
//! independent read-to-end tasks since this engine buffers rather than
//! tees output in real time.

use std::fs::File;
use std::io::{PipeReader, pipe};
use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;

/// What a child's stdout should be connected to.
pub(crate) enum StdoutSink {
    Inherit,
    Null,
    Capture,
    File(File),
}

/// What a child's stderr should be connected to.
pub(crate) enum StderrSink {
    Inherit,
    Null,
    Capture,
    File(File),
    /// Redirected to wherever stdout is going (file or pipe).
    MergeWithStdout,
}

/// Resolve sinks into concrete `Stdio` handles for spawning, wiring up
/// whichever combination of pipes/files/merged-pipe the caller asked for.
///
/// Must be called immediately before `spawn()`; the returned child handles
/// are taken from the `tokio::process::Child` right after spawn.
pub(crate) fn build_stdio(
    stdin_needs_pipe: bool,
    stdout: StdoutSink,
    stderr: StderrSink,
) -> std::io::Result<(Stdio, Stdio, Stdio, Option<PipeReader>)> {
    let stdin = if stdin_needs_pipe {
        Stdio::piped()
    } else {
        Stdio::inherit()
    };

    // merge_streams needs stdout and stderr to end up on the exact same
    // underlying file description, which `Stdio::piped()` (two distinct
    // pipes) cannot express. When stdout is itself a file, duplicating
    // the file handle is enough; when stdout is captured, we open one
    // OS pipe and hand both ends the write side.
    if matches!(stderr, StderrSink::MergeWithStdout) {
        return match stdout {
            StdoutSink::File(file) => {
                let dup = file.try_clone()?;
                Ok((stdin, Stdio::from(file), Stdio::from(dup), None))
            }
            StdoutSink::Capture => {
                let (reader, writer) = pipe()?;
                let writer_dup = writer.try_clone()?;
                Ok((
                    stdin,
                    Stdio::from(writer),
                    Stdio::from(writer_dup),
                    Some(reader),
                ))
            }
            StdoutSink::Inherit => Ok((stdin, Stdio::inherit(), Stdio::inherit(), None)),
            StdoutSink::Null => Ok((stdin, Stdio::null(), Stdio::null(), None)),
        };
    }

    let stdout_stdio = match stdout {
        StdoutSink::Inherit => Stdio::inherit(),
        StdoutSink::Null => Stdio::null(),
        StdoutSink::Capture => Stdio::piped(),
        StdoutSink::File(file) => Stdio::from(file),
    };
    let stderr_stdio = match stderr {
        StderrSink::Inherit => Stdio::inherit(),
        StderrSink::Null => Stdio::null(),
        StderrSink::Capture => Stdio::piped(),
        StderrSink::File(file) => Stdio::from(file),
        StderrSink::MergeWithStdout => unreachable!("handled above"),
    };
    Ok((stdin, stdout_stdio, stderr_stdio, None))
}

/// Spawn a task that reads a pipe to EOF and returns the accumulated bytes.
pub(crate) fn spawn_drain<R>(mut reader: R) -> JoinHandle<Vec<u8>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = reader.read_to_end(&mut buf).await;
        buf
    })
}

/// Adapt a blocking `std::io::PipeReader` for async draining alongside the
/// tokio-native child stdout/stderr handles.
pub(crate) fn spawn_drain_blocking_pipe(reader: PipeReader) -> JoinHandle<Vec<u8>> {
    tokio::task::spawn_blocking(move || {
        use std::io::Read;
        let mut buf = Vec::new();
        let mut reader = reader;
        let _ = reader.read_to_end(&mut buf);
        buf
    })
}
