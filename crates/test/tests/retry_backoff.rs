//! Transient fetch failures retry forever with capped exponential backoff.
//!
//! Runs under paused time: the virtual clock only advances through the
//! retry sleeps, so the backoff schedule is observable.

mod common;

use std::time::Duration;

use common::{eventually, heights, wait_ready, Harness};
use viridian_types::{Height, RequesterConfig};

#[tokio::test(start_paused = true)]
async fn transient_failures_back_off_then_recover() -> color_eyre::Result<()> {
    let harness = Harness::new(RequesterConfig::new(Height::new(10)));
    let sealed = harness.seal_with_remote_data(10).await;

    // three not-found responses before the tree becomes available
    harness.network.fail_times(sealed.execution_data_id, 3);

    let handle = harness.spawn();
    assert!(wait_ready(&handle, Duration::from_secs(5)).await);

    let began = tokio::time::Instant::now();
    handle.on_block_finalized();

    assert!(
        eventually(Duration::from_secs(600), || harness.received() == heights([10])).await,
        "height 10 was never delivered"
    );

    // delays of 10s, 20s and 40s with ±15% jitter
    let elapsed = began.elapsed();
    assert!(elapsed >= Duration::from_secs_f64(70.0 * 0.85), "retried too fast: {elapsed:?}");
    assert!(elapsed <= Duration::from_secs_f64(70.0 * 1.15 + 5.0), "retried too slow: {elapsed:?}");

    let snapshot = harness.metrics.snapshot();
    assert_eq!(snapshot.fetch_retries, 3);
    assert_eq!(snapshot.fetches_started, 4);
    assert_eq!(snapshot.fetches_failed, 3);
    assert_eq!(snapshot.fetches_succeeded, 1);
    assert_eq!(harness.network.gets_for(sealed.execution_data_id), 4);

    handle.shutdown().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn backoff_is_capped_at_the_configured_maximum() -> color_eyre::Result<()> {
    let mut config = RequesterConfig::new(Height::new(0));
    config.retry_delay_ms = 1_000;
    config.max_retry_delay_ms = 4_000;

    let harness = Harness::new(config);
    let sealed = harness.seal_with_remote_data(0).await;

    // schedule: 1s, 2s, 4s, then capped at 4s from there on
    harness.network.fail_times(sealed.execution_data_id, 6);

    let handle = harness.spawn();
    assert!(wait_ready(&handle, Duration::from_secs(5)).await);

    let began = tokio::time::Instant::now();
    handle.on_block_finalized();

    assert!(eventually(Duration::from_secs(120), || harness.received() == heights([0])).await);

    // 1 + 2 + 4 + 4 + 4 + 4 = 19s nominal
    let elapsed = began.elapsed();
    assert!(elapsed >= Duration::from_secs_f64(19.0 * 0.85), "cap not honored: {elapsed:?}");
    assert!(elapsed <= Duration::from_secs_f64(19.0 * 1.15 + 5.0), "cap overshot: {elapsed:?}");

    assert_eq!(harness.metrics.snapshot().fetch_retries, 6);

    handle.shutdown().await?;
    Ok(())
}
