use std::time::Duration;

use crate::support::{
    helpers::{init_tracing, test_client},
    mock_site::{MockSite, MockSiteServer, Reply},
};
use anyhow::Result;
use profetch::FetchError;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn client_reports_status_and_body() -> Result<()> {
    init_tracing();
    let site = MockSite::new();
    site.script(2, Reply::NotFound)
        .script(3, Reply::Status(503));
    let server = MockSiteServer::start(site.clone()).await?;
    let client = test_client(server.url())?;

    let found = client.fetch_profile(1).await?;
    assert_eq!(found.status, 200);
    assert_eq!(found.body, site.default_body(1).into_bytes());

    let missing = client.fetch_profile(2).await?;
    assert_eq!(missing.status, 404);
    assert!(missing.body.is_empty(), "non-200 bodies are not read");

    let unavailable = client.fetch_profile(3).await?;
    assert_eq!(unavailable.status, 503);

    let metrics = client.metrics();
    assert_eq!(metrics.total_requests, 3);
    assert_eq!(metrics.total_errors, 0);
    assert_eq!(site.total_hits(), 3);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn client_times_out_on_slow_profile() -> Result<()> {
    init_tracing();
    let site = MockSite::new();
    site.script(9, Reply::Hang(Duration::from_secs(2)));
    let server = MockSiteServer::start(site.clone()).await?;
    let client = test_client(server.url())?;

    let err = client
        .fetch_profile(9)
        .await
        .expect_err("hanging profile should time out");
    assert_eq!(err, FetchError::Timeout { id: 9 });
    assert_eq!(client.metrics().total_timeouts, 1);
    assert_eq!(site.hits(9), 1);

    server.shutdown().await;
    Ok(())
}
