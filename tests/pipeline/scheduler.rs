use std::sync::Arc;
use std::time::Duration;

use crate::support::{
    helpers::{file_fetcher, init_tracing, test_client, RecordingObserver},
    mock_site::{MockSite, MockSiteServer, Reply},
};
use anyhow::Result;
use profetch::{Category, RetryScheduler, StatsCounters};
use tokio_util::sync::CancellationToken;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scheduler_downloads_range_over_http() -> Result<()> {
    init_tracing();
    let site = MockSite::new();
    site.script(3, Reply::NotFound)
        .script(5, Reply::FailFirst { times: 2, status: 502 })
        .script(7, Reply::Status(500))
        .script(8, Reply::Hang(Duration::from_secs(2)));
    let server = MockSiteServer::start(site.clone()).await?;
    let dir = tempfile::tempdir()?;

    let (fetcher, sink) = file_fetcher(test_client(server.url())?, dir.path(), 4);
    let observer = Arc::new(RecordingObserver::default());
    let scheduler = RetryScheduler::new(fetcher.clone(), 2).with_observer(observer.clone());

    sink.prepare().await?;
    let mut stats = StatsCounters::new();
    let summary = scheduler.run(1..=10, &mut stats).await;

    assert_eq!(summary.succeeded, 7, "ids 1,2,4,5,6,9,10 end up saved");
    assert_eq!(summary.not_found, 1);
    let mut abandoned = summary.abandoned.clone();
    abandoned.sort_unstable();
    assert_eq!(abandoned, vec![7, 8]);
    assert!(!summary.interrupted);
    assert_eq!(summary.remaining, 0);

    assert_eq!(site.hits(3), 1, "404 is never retried");
    assert_eq!(site.hits(5), 3, "502 twice, then success");
    assert_eq!(site.hits(7), 3, "initial attempt plus two retries");
    assert_eq!(site.hits(8), 3);
    assert_eq!(site.hits(1), 1);

    assert_eq!(stats.get(Category::Success), 7);
    assert_eq!(stats.get(Category::NotFound), 1);
    assert_eq!(stats.get(Category::HttpStatus(502)), 2);
    assert_eq!(stats.get(Category::HttpStatus(500)), 3);
    assert_eq!(stats.get(Category::Timeout), 3);
    assert_eq!(stats.get(Category::Abandoned), 2);
    assert_eq!(summary.attempts, 1 + 1 + 1 + 1 + 3 + 1 + 3 + 3 + 1 + 1);

    let files = sink.flush().await?;
    assert_eq!(files.len(), 7);
    let saved = std::fs::read_to_string(dir.path().join("profile_5.html"))?;
    assert_eq!(saved, site.default_body(5));
    assert!(!dir.path().join("profile_3.html").exists());
    assert!(!dir.path().join("profile_7.html").exists());

    let waves = observer.waves();
    assert!(waves.iter().all(|wave| wave.dispatched <= 4));
    assert_eq!(waves.last().map(|wave| wave.remaining), Some(0));
    assert!(fetcher.limiter().peak_in_flight() <= 4);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unreachable_site_abandons_every_id() -> Result<()> {
    init_tracing();
    // Bind and drop a listener so the port is very likely closed.
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        listener.local_addr()?
    };
    let dir = tempfile::tempdir()?;
    let (fetcher, sink) = file_fetcher(test_client(&format!("http://{addr}"))?, dir.path(), 2);
    let scheduler = RetryScheduler::new(fetcher, 1);

    sink.prepare().await?;
    let mut stats = StatsCounters::new();
    let summary = scheduler.run(1..=3, &mut stats).await;

    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.abandoned.len(), 3);
    assert_eq!(summary.attempts, 6);
    assert_eq!(stats.get(Category::Abandoned), 3);
    assert!(sink.flush().await?.is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_scheduler_leaves_backlog_untouched() -> Result<()> {
    init_tracing();
    let site = MockSite::new();
    let server = MockSiteServer::start(site.clone()).await?;
    let dir = tempfile::tempdir()?;
    let (fetcher, _sink) = file_fetcher(test_client(server.url())?, dir.path(), 2);

    let token = CancellationToken::new();
    token.cancel();
    let scheduler = RetryScheduler::new(fetcher, 3).with_cancellation_token(token);

    let mut stats = StatsCounters::new();
    let summary = scheduler.run(1..=5, &mut stats).await;

    assert!(summary.interrupted);
    assert_eq!(summary.remaining, 5);
    assert_eq!(site.total_hits(), 0);
    assert!(stats.is_empty());

    server.shutdown().await;
    Ok(())
}
