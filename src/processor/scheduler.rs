//! Wave-based retry loop.
//!
//! The scheduler drains a [`Backlog`] in waves no larger than the limiter
//! capacity. Each wave runs to completion before the next one is formed, and
//! retryable failures go to the back of the backlog with `attempt + 1` until
//! `max_retries` is reached, at which point the id is abandoned. Stats and the
//! backlog are only touched between waves, from the task calling `run`.

use crate::processor::backlog::Backlog;
use crate::processor::fetcher::ProfileFetcher;
use crate::processor::stats::StatsCounters;
use crate::processor::work::{Category, Outcome};
use futures::future::join_all;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Progress snapshot emitted after each completed wave.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WaveReport {
    pub wave: u64,
    pub dispatched: usize,
    pub succeeded: usize,
    pub not_found: usize,
    pub retried: usize,
    pub abandoned: usize,
    pub remaining: usize,
}

/// Receives a [`WaveReport`] after every wave.
pub trait WaveObserver: Send + Sync {
    fn on_wave(&self, report: &WaveReport);
}

/// Aggregate result of draining one backlog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub succeeded: u64,
    pub not_found: u64,
    pub abandoned: Vec<u64>,
    pub attempts: u64,
    pub waves: u64,
    /// Items still queued when the run stopped. Zero unless interrupted.
    pub remaining: usize,
    pub interrupted: bool,
}

impl RunSummary {
    /// Ids that reached a terminal state.
    pub fn resolved(&self) -> u64 {
        self.succeeded + self.not_found + self.abandoned.len() as u64
    }

    pub fn merge(&mut self, other: &RunSummary) {
        self.succeeded += other.succeeded;
        self.not_found += other.not_found;
        self.abandoned.extend_from_slice(&other.abandoned);
        self.attempts += other.attempts;
        self.waves += other.waves;
        self.remaining += other.remaining;
        self.interrupted |= other.interrupted;
    }
}

pub struct RetryScheduler {
    fetcher: Arc<ProfileFetcher>,
    max_retries: u32,
    wave_size: usize,
    observer: Option<Arc<dyn WaveObserver>>,
    shutdown: CancellationToken,
}

impl RetryScheduler {
    /// Waves are sized to the fetcher's limiter capacity.
    pub fn new(fetcher: Arc<ProfileFetcher>, max_retries: u32) -> Self {
        let wave_size = fetcher.limiter().capacity();
        Self {
            fetcher,
            max_retries,
            wave_size,
            observer: None,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn WaveObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Stops dispatching new waves once `token` is cancelled. The wave in
    /// flight at that moment still completes.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn wave_size(&self) -> usize {
        self.wave_size
    }

    pub fn fetcher(&self) -> &Arc<ProfileFetcher> {
        &self.fetcher
    }

    /// Downloads every id in `range`, tallying each attempt into `stats`.
    pub async fn run(&self, range: RangeInclusive<u64>, stats: &mut StatsCounters) -> RunSummary {
        let mut backlog = Backlog::seeded(range);
        self.drain(&mut backlog, stats).await
    }

    pub async fn drain(&self, backlog: &mut Backlog, stats: &mut StatsCounters) -> RunSummary {
        let mut summary = RunSummary::default();

        while !backlog.is_empty() {
            if self.shutdown.is_cancelled() {
                tracing::info!(
                    remaining = backlog.len(),
                    "cancellation requested; not dispatching further waves"
                );
                summary.interrupted = true;
                break;
            }

            let wave = backlog.take_wave(self.wave_size);
            summary.waves += 1;
            let mut report = WaveReport {
                wave: summary.waves,
                dispatched: wave.len(),
                ..WaveReport::default()
            };

            let outcomes = join_all(wave.iter().map(|item| self.fetcher.fetch(*item))).await;

            for outcome in outcomes {
                summary.attempts += 1;
                stats.record(outcome.category());

                match outcome {
                    Outcome::Success(_) => {
                        summary.succeeded += 1;
                        report.succeeded += 1;
                    }
                    Outcome::NotFound(_) => {
                        summary.not_found += 1;
                        report.not_found += 1;
                    }
                    Outcome::Retryable(item, kind) if item.attempt() < self.max_retries => {
                        if backlog.push_back(item.retry()) {
                            report.retried += 1;
                        } else {
                            tracing::error!(
                                id = item.id(),
                                attempt = item.attempt(),
                                "id already queued; dropping duplicate retry"
                            );
                        }
                        tracing::trace!(
                            id = item.id(),
                            attempt = item.attempt(),
                            reason = %kind,
                            "requeued profile"
                        );
                    }
                    Outcome::Retryable(item, kind) => {
                        stats.record(Category::Abandoned);
                        summary.abandoned.push(item.id());
                        report.abandoned += 1;
                        tracing::warn!(
                            id = item.id(),
                            attempts = item.attempt() + 1,
                            reason = %kind,
                            "profile abandoned after exhausting retries"
                        );
                    }
                }
            }

            report.remaining = backlog.len();
            tracing::debug!(
                wave = report.wave,
                dispatched = report.dispatched,
                succeeded = report.succeeded,
                not_found = report.not_found,
                retried = report.retried,
                abandoned = report.abandoned,
                remaining = report.remaining,
                "wave completed"
            );
            if let Some(observer) = &self.observer {
                observer.on_wave(&report);
            }
        }

        summary.remaining = backlog.len();
        summary
    }
}
