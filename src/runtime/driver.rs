//! Batch/checkpoint driver.
//!
//! Splits an id range into fixed-size sub-ranges and, for each one in order:
//! drains it through the scheduler, flushes the sink, stores a checkpoint at
//! the sub-range end, and publishes the produced files. Stats are reset per
//! batch and folded into a run-wide total.

use crate::processor::scheduler::{RetryScheduler, RunSummary};
use crate::processor::stats::StatsCounters;
use crate::runtime::publish::Publisher;
use crate::runtime::telemetry;
use crate::storage::checkpoint::{resume_start, CheckpointStore};
use crate::storage::sink::PersistenceSink;
use anyhow::{Context, Result};
use std::sync::Arc;

/// Inclusive `(start, end)` pairs of at most `size` ids covering
/// `[start, end]` in increasing order.
#[derive(Debug, Clone)]
pub struct SubRanges {
    next: Option<u64>,
    end: u64,
    size: u64,
}

impl SubRanges {
    pub fn new(start: u64, end: u64, size: u64) -> Self {
        Self {
            next: (start <= end).then_some(start),
            end,
            size: size.max(1),
        }
    }
}

impl Iterator for SubRanges {
    type Item = (u64, u64);

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.next?;
        let end = start.saturating_add(self.size - 1).min(self.end);
        self.next = if end >= self.end { None } else { Some(end + 1) };
        Some((start, end))
    }
}

/// Outcome of one completed (or interrupted) sub-range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub start: u64,
    pub end: u64,
    pub summary: RunSummary,
    pub stats: StatsCounters,
    pub published: bool,
}

/// Everything the driver did during one `run`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverReport {
    pub resume_start: u64,
    pub end: u64,
    pub batches: Vec<BatchReport>,
    pub totals: StatsCounters,
    pub summary: RunSummary,
    pub last_checkpoint: Option<u64>,
    pub publish_failures: u64,
    pub interrupted: bool,
}

pub struct BatchDriver {
    scheduler: RetryScheduler,
    sink: Arc<dyn PersistenceSink>,
    checkpoint: Arc<dyn CheckpointStore>,
    publisher: Arc<dyn Publisher>,
    batch_size: u64,
}

impl BatchDriver {
    pub fn new(
        scheduler: RetryScheduler,
        sink: Arc<dyn PersistenceSink>,
        checkpoint: Arc<dyn CheckpointStore>,
        publisher: Arc<dyn Publisher>,
        batch_size: u64,
    ) -> Self {
        Self {
            scheduler,
            sink,
            checkpoint,
            publisher,
            batch_size: batch_size.max(1),
        }
    }

    pub fn scheduler(&self) -> &RetryScheduler {
        &self.scheduler
    }

    /// First id a run over `[start, ..]` would dispatch, given the stored
    /// checkpoint.
    pub async fn resume_point(&self, start: u64) -> Result<u64> {
        let checkpoint = self
            .checkpoint
            .load()
            .await
            .context("failed to load checkpoint")?;
        Ok(resume_start(start, checkpoint))
    }

    /// Downloads `[start, end]`, resuming after the stored checkpoint.
    ///
    /// Errors only for process-level failures: the sink cannot be prepared or
    /// flushed, or the checkpoint cannot be read or written.
    pub async fn run(&self, start: u64, end: u64) -> Result<DriverReport> {
        self.sink
            .prepare()
            .await
            .context("failed to prepare persistence sink")?;

        let checkpoint = self
            .checkpoint
            .load()
            .await
            .context("failed to load checkpoint")?;
        let resume = resume_start(start, checkpoint);

        let mut report = DriverReport {
            resume_start: resume,
            end,
            last_checkpoint: checkpoint,
            ..DriverReport::default()
        };

        if resume > end {
            tracing::info!(
                checkpoint,
                start,
                end,
                "checkpoint already covers the requested range"
            );
            return Ok(report);
        }

        tracing::info!(
            start = resume,
            end,
            checkpoint,
            batch_size = self.batch_size,
            "starting download"
        );

        for (batch_start, batch_end) in SubRanges::new(resume, end, self.batch_size) {
            let mut stats = StatsCounters::new();
            let summary = self
                .scheduler
                .run(batch_start..=batch_end, &mut stats)
                .await;

            telemetry::log_stats("batch", &stats);
            report.totals.merge(&stats);
            report.summary.merge(&summary);

            if summary.interrupted {
                tracing::warn!(
                    start = batch_start,
                    end = batch_end,
                    remaining = summary.remaining,
                    "batch interrupted; checkpoint left at previous batch"
                );
                if let Err(err) = self.sink.flush().await {
                    tracing::error!(error = %err, "failed to flush interrupted batch");
                }
                report.interrupted = true;
                report.batches.push(BatchReport {
                    start: batch_start,
                    end: batch_end,
                    summary,
                    stats,
                    published: false,
                });
                break;
            }

            let mut files = self
                .sink
                .flush()
                .await
                .with_context(|| format!("failed to flush batch {batch_start}-{batch_end}"))?;

            self.checkpoint
                .store(batch_end)
                .await
                .with_context(|| format!("failed to store checkpoint {batch_end}"))?;
            report.last_checkpoint = Some(batch_end);
            files.extend(self.checkpoint.artifact());

            let message = commit_message(batch_start, batch_end, &summary);
            let published = match self.publisher.publish(&files, &message).await {
                Ok(()) => true,
                Err(err) => {
                    tracing::warn!(
                        start = batch_start,
                        end = batch_end,
                        error = %err,
                        "failed to publish batch artifacts; continuing"
                    );
                    report.publish_failures += 1;
                    false
                }
            };

            tracing::info!(
                start = batch_start,
                end = batch_end,
                succeeded = summary.succeeded,
                not_found = summary.not_found,
                abandoned = summary.abandoned.len(),
                files = files.len(),
                "batch completed"
            );

            report.batches.push(BatchReport {
                start: batch_start,
                end: batch_end,
                summary,
                stats,
                published,
            });
        }

        telemetry::log_stats("run", &report.totals);
        Ok(report)
    }
}

/// Commit message describing one finished batch.
pub fn commit_message(start: u64, end: u64, summary: &RunSummary) -> String {
    format!(
        "Profiles {start}-{end}: {} saved, {} missing, {} abandoned",
        summary.succeeded,
        summary.not_found,
        summary.abandoned.len()
    )
}
