use std::time::Duration;

use xc_process::ExternalCommand;

#[tokio::test]
async fn test_suspend_then_resume_a_long_running_command() {
    let mut cmd = ExternalCommand::shell("sleep 5")
        .async_mode(true)
        .capture(false);
    cmd.start().await.expect("spawn sleep 5");

    let pid = cmd.pid().expect("pid available once spawned");
    assert!(cmd.is_running());

    cmd.suspend().await.expect("SIGSTOP delivered");
    // Still alive, just stopped; give the kernel a moment to apply it.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(cmd.is_running());

    cmd.resume().await.expect("SIGCONT delivered");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(cmd.is_running());

    cmd.kill(true, Some(Duration::from_secs(2)))
        .await
        .expect("kill the still-running sleep");
    assert!(!xc_process::ControllableProcess::new(pid).is_running());
}

#[tokio::test]
async fn test_merge_streams_interleaves_stdout_and_stderr_into_one_capture() {
    let mut cmd = ExternalCommand::shell("echo out && echo err 1>&2")
        .capture(true)
        .merge_streams(true);
    cmd.start().await.expect("run merged-stream command");

    let merged = cmd.output().expect("captured output");
    assert!(merged.contains("out"));
    assert!(merged.contains("err"));
    // stderr was never captured on its own side once merged into stdout.
    assert!(cmd.stderr_bytes().is_none() || cmd.stderr_bytes() == Some(&[][..]));
}

#[tokio::test]
async fn test_timeout_escalates_to_kill_and_reports_timed_out() {
    let mut cmd = ExternalCommand::shell("sleep 30")
        .timeout(Duration::from_millis(200))
        .kill_grace(Duration::from_millis(200))
        .check(false);
    let result = cmd.start().await;

    assert!(matches!(result, Err(xc_core::Error::CommandTimedOut { .. })));
    assert!(cmd.is_finished());
    assert!(cmd.is_terminated());
}
