use std::time::{Duration, Instant};

use xc_pool::{CommandPool, Poolable};
use xc_process::ExternalCommand;

#[tokio::test]
async fn test_bounded_concurrency_runs_batches_sequentially() {
    // 6 commands, concurrency 2, each sleeping 300ms: with true concurrency-2
    // scheduling this finishes in ~3 batches (~900ms), nowhere near the
    // ~1.8s a fully-serial run would take.
    let mut pool = CommandPool::new(2);
    for i in 0..6 {
        let cmd = ExternalCommand::shell("sleep 0.3")
            .async_mode(true)
            .capture(false);
        pool.add(cmd, Some(i.to_string()));
    }

    let start = Instant::now();
    let completed = pool.run().await.expect("all commands succeed");
    let elapsed = start.elapsed();

    assert_eq!(completed.len(), 6);
    assert!(
        elapsed < Duration::from_secs(2),
        "pool did not run concurrently: took {elapsed:?}"
    );
}

#[tokio::test]
async fn test_terminate_escalates_within_the_given_grace() {
    let mut pool = CommandPool::new(3);
    for i in 0..3 {
        let cmd = ExternalCommand::shell("sleep 30")
            .async_mode(true)
            .capture(false);
        pool.add(cmd, Some(i.to_string()));
    }
    pool.spawn().await.expect("spawn up to concurrency");

    let grace = Duration::from_millis(300);
    let start = Instant::now();
    pool.terminate(grace).await;
    let elapsed = start.elapsed();

    assert!(
        elapsed < grace + Duration::from_secs(2),
        "terminate() should escalate to SIGKILL within grace rather than hang: took {elapsed:?}"
    );
}

#[tokio::test]
async fn test_default_policy_terminates_the_surviving_sleep_after_a_fast_failure() {
    // Mirrors `run()`'s own fail-fast sequence (spawn, observe the failure
    // via collect, terminate the rest) one step at a time so the slow
    // command can be reaped and inspected afterward — `run()` itself drops
    // its entries on the error path, so this is the only way to assert the
    // surviving member actually reached `is_terminated()`.
    let mut pool = CommandPool::new(2);
    pool.add(
        ExternalCommand::new(["false"]).async_mode(true).check(true),
        Some("fails".into()),
    );
    pool.add(
        ExternalCommand::shell("sleep 60").async_mode(true),
        Some("slow".into()),
    );

    pool.spawn().await.expect("spawn both within the concurrency bound");

    let start = Instant::now();
    loop {
        if pool.collect().await.is_err() {
            break;
        }
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "fast failure should surface within seconds, not the sleep's 60s"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(start.elapsed() < Duration::from_secs(5));

    pool.terminate(Duration::from_secs(2)).await;
    // terminate() only signals; collect() performs the actual reap that
    // flips the survivor's state to `Reaped { terminated: true }`.
    let _ = pool.collect().await;

    let slow = pool.get("slow").expect("slow entry still present");
    assert!(slow.is_terminated(), "surviving sleep should have been terminated");
}
