use crate::http::client::ProfileClient;
use crate::http::metrics::HttpMetricsSnapshot;
use crate::processor::fetcher::ProfileFetcher;
use crate::processor::limiter::ConcurrencyLimiter;
use crate::processor::scheduler::{RetryScheduler, WaveObserver};
use crate::runtime::config::{DownloaderConfig, PersistenceMode};
use crate::runtime::driver::{BatchDriver, DriverReport};
use crate::runtime::publish::{GitPublisher, NoopPublisher, Publisher};
use crate::storage::checkpoint::{CheckpointStore, FileCheckpoint, MemoryCheckpoint};
use crate::storage::chunked::ChunkedJsonSink;
use crate::storage::files::FileSink;
use crate::storage::sink::PersistenceSink;
use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Wires the HTTP client, limiter, fetcher, scheduler and driver from a
/// [`DownloaderConfig`] and handles OS signals for graceful shutdowns.
pub struct Runner {
    config: DownloaderConfig,
    client: Arc<ProfileClient>,
    limiter: Arc<ConcurrencyLimiter>,
    driver: BatchDriver,
    shutdown: CancellationToken,
}

impl Runner {
    pub fn new(config: DownloaderConfig) -> Result<Self> {
        Self::with_observer(config, None)
    }

    /// Like [`Runner::new`], reporting each completed wave to `observer`.
    pub fn with_observer(
        config: DownloaderConfig,
        observer: Option<Arc<dyn WaveObserver>>,
    ) -> Result<Self> {
        config.validate()?;

        let client = Arc::new(ProfileClient::from_config(&config)?);
        let limiter = Arc::new(ConcurrencyLimiter::new(config.concurrency()));
        let sink = build_sink(&config)?;
        let fetcher = Arc::new(ProfileFetcher::new(
            client.clone(),
            sink.clone(),
            limiter.clone(),
            config.request_timeout(),
        ));

        let shutdown = CancellationToken::new();
        let mut scheduler = RetryScheduler::new(fetcher, config.max_retries())
            .with_cancellation_token(shutdown.clone());
        if let Some(observer) = observer {
            scheduler = scheduler.with_observer(observer);
        }

        let driver = BatchDriver::new(
            scheduler,
            sink,
            build_checkpoint(&config),
            build_publisher(&config),
            config.batch_size(),
        );

        Ok(Self {
            config,
            client,
            limiter,
            driver,
            shutdown,
        })
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    /// Clone of the token that stops dispatching new waves when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn http_metrics(&self) -> HttpMetricsSnapshot {
        self.client.metrics()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.limiter.peak_in_flight()
    }

    /// Number of ids a run would still cover after resuming from the stored
    /// checkpoint.
    pub async fn pending_ids(&self) -> Result<u64> {
        let resume = self.driver.resume_point(self.config.start_id()).await?;
        Ok(ids_between(resume, self.config.end_id()))
    }

    /// Runs the configured range to completion.
    pub async fn run(&self) -> Result<DriverReport> {
        self.driver
            .run(self.config.start_id(), self.config.end_id())
            .await
    }

    /// Runs to completion, or until Ctrl-C (SIGINT) is received. On Ctrl-C the
    /// in-flight wave finishes, the current batch is left un-checkpointed, and
    /// the partial report is returned.
    pub async fn run_until_ctrl_c(&self) -> Result<DriverReport> {
        let run = self.run();
        tokio::pin!(run);

        tokio::select! {
            report = &mut run => report,
            _ = signal::ctrl_c() => {
                tracing::info!("Ctrl-C received; finishing current wave before stopping");
                self.shutdown.cancel();
                run.await
            }
        }
    }
}

/// Size of `[start, end]`, zero when empty, saturating at `u64::MAX`.
pub fn ids_between(start: u64, end: u64) -> u64 {
    if start > end {
        0
    } else {
        (end - start).saturating_add(1)
    }
}

fn build_sink(config: &DownloaderConfig) -> Result<Arc<dyn PersistenceSink>> {
    Ok(match config.persistence() {
        PersistenceMode::Files => Arc::new(FileSink::new(config.output_dir())),
        PersistenceMode::ChunkedJson { chunk_size } => {
            Arc::new(ChunkedJsonSink::new(config.output_dir(), chunk_size)?)
        }
    })
}

fn build_checkpoint(config: &DownloaderConfig) -> Arc<dyn CheckpointStore> {
    match config.checkpoint_path() {
        Some(path) => Arc::new(FileCheckpoint::new(path)),
        None => Arc::new(MemoryCheckpoint::default()),
    }
}

fn build_publisher(config: &DownloaderConfig) -> Arc<dyn Publisher> {
    match config.publish_repo() {
        Some(repo) => Arc::new(GitPublisher::new(repo)),
        None => Arc::new(NoopPublisher),
    }
}
