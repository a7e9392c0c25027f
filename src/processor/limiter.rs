//! Concurrency cap shared by every fetch in a run.

use anyhow::{anyhow, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Grants at most `capacity` slots at a time, waking waiters in FIFO order.
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    capacity: usize,
    semaphore: Arc<Semaphore>,
    gauge: Arc<InFlightGauge>,
}

#[derive(Debug, Default)]
struct InFlightGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyLimiter {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
            gauge: Arc::new(InFlightGauge::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Waits for a free slot. The slot is returned when the permit is dropped.
    pub async fn acquire(&self) -> Result<LimiterPermit> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| anyhow!("concurrency limiter closed"))?;

        let current = self.gauge.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.gauge.peak.fetch_max(current, Ordering::SeqCst);

        Ok(LimiterPermit {
            _permit: permit,
            gauge: self.gauge.clone(),
        })
    }

    /// Slots held right now.
    pub fn in_flight(&self) -> usize {
        self.gauge.current.load(Ordering::SeqCst)
    }

    /// Highest number of slots ever held at once.
    pub fn peak_in_flight(&self) -> usize {
        self.gauge.peak.load(Ordering::SeqCst)
    }
}

/// Scoped slot. Dropping it on any path releases capacity.
#[derive(Debug)]
pub struct LimiterPermit {
    _permit: OwnedSemaphorePermit,
    gauge: Arc<InFlightGauge>,
}

impl Drop for LimiterPermit {
    fn drop(&mut self) {
        self.gauge.current.fetch_sub(1, Ordering::SeqCst);
    }
}
