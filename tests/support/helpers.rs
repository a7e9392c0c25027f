use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{bail, Result};
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use profetch::{
    ConcurrencyLimiter, FileSink, HttpClientOptions, PersistenceSink, ProfileClient,
    ProfileFetcher, Publisher, WaveObserver, WaveReport,
};
use tracing_subscriber::EnvFilter;

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

pub const TEST_TIMEOUT: Duration = Duration::from_millis(300);

/// Client with a short timeout so hanging ids resolve quickly.
pub fn test_client(base_url: &str) -> Result<Arc<ProfileClient>> {
    let options = HttpClientOptions {
        request_timeout: TEST_TIMEOUT,
        connect_timeout: TEST_TIMEOUT,
        ..HttpClientOptions::default()
    };
    Ok(Arc::new(ProfileClient::with_options(base_url, options)?))
}

pub fn file_fetcher(
    client: Arc<ProfileClient>,
    dir: &Path,
    concurrency: usize,
) -> (Arc<ProfileFetcher>, Arc<dyn PersistenceSink>) {
    let sink: Arc<dyn PersistenceSink> = Arc::new(FileSink::new(dir));
    let fetcher = Arc::new(ProfileFetcher::new(
        client,
        sink.clone(),
        Arc::new(ConcurrencyLimiter::new(concurrency)),
        TEST_TIMEOUT,
    ));
    (fetcher, sink)
}

/// Keeps every wave report it sees.
#[derive(Default)]
pub struct RecordingObserver {
    waves: Mutex<Vec<WaveReport>>,
}

impl RecordingObserver {
    pub fn waves(&self) -> Vec<WaveReport> {
        self.waves.lock().expect("observer poisoned").clone()
    }
}

impl WaveObserver for RecordingObserver {
    fn on_wave(&self, report: &WaveReport) {
        self.waves.lock().expect("observer poisoned").push(*report);
    }
}

/// Publisher that records each call and optionally fails every one.
#[derive(Default)]
pub struct RecordingPublisher {
    calls: Mutex<Vec<(Vec<PathBuf>, String)>>,
    fail: bool,
    attempts: AtomicUsize,
}

impl RecordingPublisher {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(Vec<PathBuf>, String)> {
        self.calls.lock().expect("publisher poisoned").clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Publisher for RecordingPublisher {
    fn publish<'a>(&'a self, files: &'a [PathBuf], message: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                bail!("remote rejected push");
            }
            self.calls
                .lock()
                .expect("publisher poisoned")
                .push((files.to_vec(), message.to_owned()));
            Ok(())
        })
    }
}
