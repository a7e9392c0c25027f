//! The fetch-retry core: work items, backlog, concurrency limiter, fetcher,
//! wave scheduler, and outcome stats.

pub mod backlog;
pub mod fetcher;
pub mod limiter;
pub mod scheduler;
pub mod stats;
pub mod work;
