//! Value types flowing through the retry loop: work items, fetch outcomes, and
//! the closed set of failure kinds the fetcher can report.

use std::fmt;

/// One unit of pending work: a profile id and how many times it has already
/// been retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkItem {
    id: u64,
    attempt: u32,
}

impl WorkItem {
    /// First attempt for `id`.
    pub fn new(id: u64) -> Self {
        Self { id, attempt: 0 }
    }

    pub fn with_attempt(id: u64, attempt: u32) -> Self {
        Self { id, attempt }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the follow-up item for a requeue. `self` is left untouched.
    pub fn retry(&self) -> Self {
        Self {
            id: self.id,
            attempt: self.attempt.saturating_add(1),
        }
    }
}

/// Why a single attempt failed in a way that may succeed later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    HttpStatus(u16),
    Timeout,
    Connection,
    MalformedResponse,
    Persistence,
    Unexpected,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::HttpStatus(status) => write!(f, "unexpected HTTP status {status}"),
            FailureKind::Timeout => f.write_str("request timed out"),
            FailureKind::Connection => f.write_str("connection failed"),
            FailureKind::MalformedResponse => f.write_str("malformed response"),
            FailureKind::Persistence => f.write_str("failed to persist response"),
            FailureKind::Unexpected => f.write_str("unexpected failure"),
        }
    }
}

/// Result of one fetch attempt. Every variant carries the dispatched item so
/// the scheduler can make its retry decision from the attempt count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success(WorkItem),
    NotFound(WorkItem),
    Retryable(WorkItem, FailureKind),
}

impl Outcome {
    pub fn item(&self) -> WorkItem {
        match self {
            Outcome::Success(item) | Outcome::NotFound(item) | Outcome::Retryable(item, _) => {
                *item
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Outcome::Retryable(..))
    }

    /// Stats bucket this attempt is tallied under.
    pub fn category(&self) -> Category {
        match self {
            Outcome::Success(_) => Category::Success,
            Outcome::NotFound(_) => Category::NotFound,
            Outcome::Retryable(_, kind) => Category::from(*kind),
        }
    }
}

/// Labels used by [`StatsCounters`](crate::processor::stats::StatsCounters).
///
/// The derived ordering is the order categories are reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Success,
    NotFound,
    HttpStatus(u16),
    Timeout,
    Connection,
    MalformedResponse,
    Persistence,
    Other,
    Abandoned,
}

impl From<FailureKind> for Category {
    fn from(kind: FailureKind) -> Self {
        match kind {
            FailureKind::HttpStatus(status) => Category::HttpStatus(status),
            FailureKind::Timeout => Category::Timeout,
            FailureKind::Connection => Category::Connection,
            FailureKind::MalformedResponse => Category::MalformedResponse,
            FailureKind::Persistence => Category::Persistence,
            FailureKind::Unexpected => Category::Other,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Success => f.write_str("200"),
            Category::NotFound => f.write_str("404"),
            Category::HttpStatus(status) => write!(f, "HTTP {status}"),
            Category::Timeout => f.write_str("timeout"),
            Category::Connection => f.write_str("connection error"),
            Category::MalformedResponse => f.write_str("malformed response"),
            Category::Persistence => f.write_str("persistence error"),
            Category::Other => f.write_str("other errors"),
            Category::Abandoned => f.write_str("abandoned"),
        }
    }
}
