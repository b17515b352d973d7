//! The search-ahead window bounds how far fetches outrun notifications.

mod common;

use std::{collections::HashSet, time::Duration};

use common::{eventually, heights, wait_ready, Harness};
use viridian_requester::ProgressStore;
use viridian_types::{BlobId, Height, RequesterConfig};

const WAIT: Duration = Duration::from_secs(10);

#[tokio::test(flavor = "multi_thread")]
async fn fetch_pool_stalls_until_notifications_drain() -> color_eyre::Result<()> {
    let mut config = RequesterConfig::new(Height::new(10));
    config.max_search_ahead = 5;
    config.fetch_workers = 4;

    let harness = Harness::new(config);

    let mut roots: Vec<(u64, BlobId)> = Vec::new();
    for height in 10..=30 {
        let sealed = harness.seal_with_remote_data(height).await;
        roots.push((height, sealed.execution_data_id));
    }

    // block the notification stream by stalling the first height
    let hold = harness.network.hold(roots[0].1);

    let handle = harness.spawn();
    assert!(wait_ready(&handle, WAIT).await);
    handle.on_block_finalized();

    // the pool fetches up to the window edge and no further
    assert!(
        eventually(WAIT, || {
            roots[1..5].iter().all(|(_, root)| harness.network.gets_for(*root) == 1)
        })
        .await,
        "heights 11..=14 were never fetched"
    );
    tokio::time::sleep(Duration::from_millis(200)).await;

    let window: HashSet<BlobId> = roots[..5].iter().map(|(_, root)| *root).collect();
    for requested in harness.network.recorded_gets() {
        assert!(
            window.contains(&requested),
            "height beyond the search-ahead window was fetched"
        );
    }
    assert!(harness.received().is_empty());

    // once notifications drain, the rest of the chain flows through
    hold.release();
    assert!(
        eventually(WAIT, || harness.received() == heights(10..=30)).await,
        "expected 10..=30 after release, got {:?}",
        harness.received()
    );
    assert_eq!(harness.progress.read().await?.notified, Some(Height::new(30)));

    handle.shutdown().await?;
    Ok(())
}
