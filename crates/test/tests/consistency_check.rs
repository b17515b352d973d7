//! Startup datastore check: repair what can be repaired, halt on what
//! cannot, touch nothing that is already consistent.

mod common;

use std::time::Duration;

use bytes::Bytes;
use common::{eventually, heights, test_block_id, wait_ready, Harness};
use viridian_execution_data::{
    blob_id, BlobStore, ExecutionDataService, LocalBlobService,
};
use viridian_requester::ProgressStore;
use viridian_types::{Height, RequesterConfig, SealedBlock};

const WAIT: Duration = Duration::from_secs(5);

fn check_config(start: u64) -> RequesterConfig {
    let mut config = RequesterConfig::new(Height::new(start));
    config.check_enabled = true;
    config
}

#[tokio::test(flavor = "multi_thread")]
async fn repairs_corrupt_and_missing_local_data() -> color_eyre::Result<()> {
    let harness = Harness::new(check_config(0));

    // three heights previously fetched and notified
    let mut sealed = Vec::new();
    for height in 0..=2 {
        let block = harness.seal_with_remote_data(height).await;
        harness.seed_local(height).await;
        sealed.push(block);
    }
    harness.progress.set_processed(Height::new(2)).await?;
    harness.progress.set_notified(Height::new(2)).await?;

    // height 1: bit rot on disk; height 2: blob went missing
    harness.local.corrupt(sealed[1].execution_data_id, Bytes::from_static(b"bit rot"));
    harness.local.delete(sealed[2].execution_data_id).await?;

    let handle = harness.spawn();
    assert!(wait_ready(&handle, WAIT).await, "check never completed");

    // both heights were refetched from the network
    assert!(harness.network.gets_for(sealed[1].execution_data_id) >= 1);
    assert!(harness.network.gets_for(sealed[2].execution_data_id) >= 1);

    // the repaired store passes a hash-on-read walk
    let verify = ExecutionDataService::new(
        LocalBlobService::new(harness.local.clone()).with_hash_on_read(true),
    );
    for block in &sealed {
        assert!(verify.check(block.execution_data_id).await?.is_ok());
    }

    // repaired heights are not re-notified; new heights flow normally
    assert!(harness.received().is_empty());
    harness.seal_with_remote_data(3).await;
    handle.on_block_finalized();
    assert!(eventually(WAIT, || harness.received() == heights([3])).await);

    handle.shutdown().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn check_over_consistent_store_changes_nothing() -> color_eyre::Result<()> {
    let harness = Harness::new(check_config(0));

    for height in 0..=2 {
        harness.seal_with_remote_data(height).await;
        harness.seed_local(height).await;
    }
    harness.progress.set_processed(Height::new(2)).await?;
    harness.progress.set_notified(Height::new(2)).await?;

    let blobs_before = harness.local.len();

    let handle = harness.spawn();
    assert!(wait_ready(&handle, WAIT).await);

    assert!(harness.network.recorded_gets().is_empty(), "consistent store triggered refetches");
    assert_eq!(harness.local.len(), blobs_before, "consistent store was mutated");
    assert!(harness.received().is_empty());

    handle.shutdown().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_local_data_halts_on_startup() -> color_eyre::Result<()> {
    let harness = Harness::new(check_config(0));

    // a malformed tree that was accepted by a previous run
    let garbage = Bytes::from_static(&[0x99; 40]);
    let root = blob_id(&garbage);
    harness.local.put(root, garbage).await?;
    harness.source.seal(SealedBlock::new(test_block_id(0), Height::new(0), root));
    harness.progress.set_processed(Height::new(0)).await?;
    harness.progress.set_notified(Height::new(0)).await?;

    let handle = harness.spawn();
    let err = handle.join().await.unwrap_err();
    assert!(err.is_halted(), "expected halt, got: {err}");
    assert!(harness.progress.read().await?.halted);
    assert!(harness.received().is_empty());

    Ok(())
}
