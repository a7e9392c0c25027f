//! Single-attempt profile download.
//!
//! `ProfileFetcher` turns one [`WorkItem`] into one [`Outcome`]. Every per-id
//! failure is folded into the outcome here; nothing escapes to the scheduler as
//! an error. The limiter permit is held across the request and the sink write
//! and released on every return path.

use crate::http::client::{FetchError, ProfileResponse, ProfileSource};
use crate::processor::limiter::ConcurrencyLimiter;
use crate::processor::work::{FailureKind, Outcome, WorkItem};
use crate::storage::sink::PersistenceSink;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const STATUS_OK: u16 = 200;
const STATUS_NOT_FOUND: u16 = 404;

pub struct ProfileFetcher {
    source: Arc<dyn ProfileSource>,
    sink: Arc<dyn PersistenceSink>,
    limiter: Arc<ConcurrencyLimiter>,
    request_timeout: Duration,
}

impl ProfileFetcher {
    pub fn new(
        source: Arc<dyn ProfileSource>,
        sink: Arc<dyn PersistenceSink>,
        limiter: Arc<ConcurrencyLimiter>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            source,
            sink,
            limiter,
            request_timeout,
        }
    }

    pub fn limiter(&self) -> &Arc<ConcurrencyLimiter> {
        &self.limiter
    }

    pub fn sink(&self) -> &Arc<dyn PersistenceSink> {
        &self.sink
    }

    pub async fn fetch(&self, item: WorkItem) -> Outcome {
        let _permit = match self.limiter.acquire().await {
            Ok(permit) => permit,
            Err(err) => {
                tracing::error!(
                    id = item.id(),
                    attempt = item.attempt(),
                    error = %err,
                    "could not acquire fetch slot"
                );
                return Outcome::Retryable(item, FailureKind::Unexpected);
            }
        };

        let response = match timeout(self.request_timeout, self.source.fetch_profile(item.id())).await
        {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout { id: item.id() }),
        };

        match response {
            Ok(response) => self.classify(item, response).await,
            Err(err) => Outcome::Retryable(item, failure_kind(item, &err)),
        }
    }

    async fn classify(&self, item: WorkItem, response: ProfileResponse) -> Outcome {
        match response.status {
            STATUS_OK => match self.sink.write(item.id(), response.body).await {
                Ok(()) => {
                    tracing::trace!(id = item.id(), attempt = item.attempt(), "profile saved");
                    Outcome::Success(item)
                }
                Err(err) => {
                    tracing::warn!(
                        id = item.id(),
                        attempt = item.attempt(),
                        error = %err,
                        "profile downloaded but not persisted"
                    );
                    Outcome::Retryable(item, FailureKind::Persistence)
                }
            },
            STATUS_NOT_FOUND => Outcome::NotFound(item),
            status => {
                tracing::debug!(
                    id = item.id(),
                    attempt = item.attempt(),
                    status,
                    "unexpected HTTP status"
                );
                Outcome::Retryable(item, FailureKind::HttpStatus(status))
            }
        }
    }
}

fn failure_kind(item: WorkItem, err: &FetchError) -> FailureKind {
    match err {
        FetchError::Timeout { .. } => {
            tracing::debug!(id = item.id(), attempt = item.attempt(), "profile request timed out");
            FailureKind::Timeout
        }
        FetchError::Connection { .. } => {
            tracing::debug!(id = item.id(), attempt = item.attempt(), error = %err, "connection error");
            FailureKind::Connection
        }
        FetchError::MalformedResponse { .. } => {
            tracing::debug!(id = item.id(), attempt = item.attempt(), error = %err, "malformed response");
            FailureKind::MalformedResponse
        }
        FetchError::Unexpected { .. } => {
            tracing::error!(
                id = item.id(),
                attempt = item.attempt(),
                error = %err,
                "unexpected fetch failure"
            );
            FailureKind::Unexpected
        }
    }
}
