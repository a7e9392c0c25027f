pub mod http;
pub mod processor;
pub mod runtime;
pub mod storage;

pub use http::{
    FetchError, HttpClientOptions, HttpMetricsSnapshot, ProfileClient, ProfileResponse,
    ProfileSource,
};
pub use processor::backlog::Backlog;
pub use processor::fetcher::ProfileFetcher;
pub use processor::limiter::{ConcurrencyLimiter, LimiterPermit};
pub use processor::scheduler::{RetryScheduler, RunSummary, WaveObserver, WaveReport};
pub use processor::stats::StatsCounters;
pub use processor::work::{Category, FailureKind, Outcome, WorkItem};
pub use runtime::config::{
    DownloaderConfig, DownloaderConfigBuilder, DownloaderConfigParams, PersistenceMode,
};
pub use runtime::driver::{BatchDriver, BatchReport, DriverReport, SubRanges};
pub use runtime::publish::{GitPublisher, NoopPublisher, Publisher};
pub use runtime::runner::Runner;
pub use runtime::telemetry::init_tracing;
pub use storage::checkpoint::{resume_start, CheckpointStore, FileCheckpoint, MemoryCheckpoint};
pub use storage::chunked::{ChunkRecord, ChunkedJsonSink};
pub use storage::files::FileSink;
pub use storage::sink::PersistenceSink;
