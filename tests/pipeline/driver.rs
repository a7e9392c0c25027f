use std::sync::Arc;

use crate::support::{
    helpers::{file_fetcher, init_tracing, test_client, RecordingPublisher, TEST_TIMEOUT},
    mock_site::{MockSite, MockSiteServer, Reply},
};
use anyhow::Result;
use profetch::{
    BatchDriver, Category, CheckpointStore, ChunkRecord, ChunkedJsonSink, ConcurrencyLimiter,
    FileCheckpoint, MemoryCheckpoint, NoopPublisher, ProfileFetcher, RetryScheduler,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn driver_resumes_after_stored_checkpoint() -> Result<()> {
    init_tracing();
    let site = MockSite::new();
    let server = MockSiteServer::start(site.clone()).await?;
    let dir = tempfile::tempdir()?;
    let checkpoint_path = dir.path().join("checkpoint.txt");
    std::fs::write(&checkpoint_path, "500")?;

    let (fetcher, sink) = file_fetcher(test_client(server.url())?, &dir.path().join("out"), 3);
    let checkpoint = Arc::new(FileCheckpoint::new(&checkpoint_path));
    let publisher = Arc::new(RecordingPublisher::default());
    let driver = BatchDriver::new(
        RetryScheduler::new(fetcher, 1),
        sink,
        checkpoint.clone(),
        publisher.clone(),
        4,
    );

    let report = driver.run(1, 510).await?;

    assert_eq!(report.resume_start, 501);
    assert_eq!(site.total_hits(), 10);
    assert_eq!(site.hits(500), 0);
    assert_eq!(site.hits(501), 1);
    assert_eq!(report.totals.get(Category::Success), 10);
    assert_eq!(report.last_checkpoint, Some(510));
    assert_eq!(checkpoint.load().await?, Some(510));
    assert_eq!(std::fs::read_to_string(&checkpoint_path)?.trim(), "510");

    let bounds: Vec<_> = report
        .batches
        .iter()
        .map(|batch| (batch.start, batch.end))
        .collect();
    assert_eq!(bounds, vec![(501, 504), (505, 508), (509, 510)]);
    assert!(report.batches.iter().all(|batch| batch.published));

    let calls = publisher.calls();
    assert_eq!(calls.len(), 3);
    let (first_files, first_message) = &calls[0];
    assert_eq!(first_message, "Profiles 501-504: 4 saved, 0 missing, 0 abandoned");
    assert_eq!(first_files.len(), 5, "four profiles plus the checkpoint file");
    assert!(first_files.contains(&checkpoint_path));

    let again = driver.run(1, 510).await?;
    assert!(again.batches.is_empty(), "checkpoint already covers the range");
    assert_eq!(site.total_hits(), 10);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn publish_failures_do_not_stop_the_run() -> Result<()> {
    init_tracing();
    let site = MockSite::new();
    site.script(2, Reply::NotFound);
    let server = MockSiteServer::start(site.clone()).await?;
    let dir = tempfile::tempdir()?;

    let (fetcher, sink) = file_fetcher(test_client(server.url())?, dir.path(), 2);
    let checkpoint = Arc::new(MemoryCheckpoint::default());
    let publisher = Arc::new(RecordingPublisher::failing());
    let driver = BatchDriver::new(
        RetryScheduler::new(fetcher, 0),
        sink,
        checkpoint.clone(),
        publisher.clone(),
        3,
    );

    let report = driver.run(1, 6).await?;

    assert_eq!(publisher.attempts(), 2);
    assert_eq!(report.publish_failures, 2);
    assert!(report.batches.iter().all(|batch| !batch.published));
    assert_eq!(checkpoint.last_completed(), Some(6));
    assert_eq!(report.summary.succeeded, 5);
    assert_eq!(report.summary.not_found, 1);
    assert_eq!(report.batches[0].stats.get(Category::NotFound), 1);
    assert_eq!(report.batches[1].stats.get(Category::NotFound), 0);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn chunked_sink_groups_profiles_by_id() -> Result<()> {
    init_tracing();
    let site = MockSite::new().with_json_bodies();
    site.script(4, Reply::Body("<html>not json</html>".to_owned()));
    let server = MockSiteServer::start(site.clone()).await?;
    let dir = tempfile::tempdir()?;

    let sink = Arc::new(ChunkedJsonSink::new(dir.path(), 5)?);
    let fetcher = Arc::new(ProfileFetcher::new(
        test_client(server.url())?,
        sink.clone(),
        Arc::new(ConcurrencyLimiter::new(3)),
        TEST_TIMEOUT,
    ));
    let driver = BatchDriver::new(
        RetryScheduler::new(fetcher, 1),
        sink.clone(),
        Arc::new(MemoryCheckpoint::default()),
        Arc::new(NoopPublisher),
        4,
    );

    let report = driver.run(1, 8).await?;

    assert_eq!(report.summary.abandoned, vec![4]);
    assert_eq!(report.totals.get(Category::Persistence), 2);
    assert_eq!(site.hits(4), 2, "persistence failures are retried");
    assert_eq!(sink.pending_records(), 0);

    let first: Vec<ChunkRecord> =
        serde_json::from_slice(&std::fs::read(sink.chunk_path(1))?)?;
    let ids: Vec<u64> = first.iter().map(|record| record.id).collect();
    assert_eq!(ids, vec![1, 2, 3, 5]);
    assert_eq!(first[0].profile["login"], "user_1");

    let second: Vec<ChunkRecord> =
        serde_json::from_slice(&std::fs::read(sink.chunk_path(2))?)?;
    let ids: Vec<u64> = second.iter().map(|record| record.id).collect();
    assert_eq!(ids, vec![6, 7, 8]);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn corrupt_checkpoint_aborts_before_downloading() -> Result<()> {
    init_tracing();
    let dir = tempfile::tempdir()?;
    let checkpoint_path = dir.path().join("checkpoint.txt");
    std::fs::write(&checkpoint_path, "not-a-number")?;

    // The base URL is never contacted.
    let (fetcher, sink) = file_fetcher(test_client("http://127.0.0.1:9")?, dir.path(), 1);
    let driver = BatchDriver::new(
        RetryScheduler::new(fetcher, 0),
        sink,
        Arc::new(FileCheckpoint::new(&checkpoint_path)),
        Arc::new(NoopPublisher),
        10,
    );

    let err = driver.run(1, 5).await.expect_err("corrupt checkpoint is fatal");
    assert!(
        format!("{err:#}").contains("failed to load checkpoint"),
        "unexpected error: {err:#}"
    );
    Ok(())
}
