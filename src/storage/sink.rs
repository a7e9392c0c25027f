use anyhow::Result;
use bytes::Bytes;
use futures::future::BoxFuture;
use std::path::PathBuf;

pub type SinkFuture<'a, T> = BoxFuture<'a, Result<T>>;

/// Destination for successfully downloaded profile bodies.
pub trait PersistenceSink: Send + Sync {
    /// Creates whatever the sink needs on disk. Must be idempotent; called once
    /// before the first write.
    fn prepare(&self) -> SinkFuture<'_, ()>;

    /// Stores `body` for `id`. An error means the profile was not persisted.
    fn write<'a>(&'a self, id: u64, body: Bytes) -> SinkFuture<'a, ()>;

    /// Makes buffered writes durable and returns the files touched since the
    /// previous flush.
    fn flush(&self) -> SinkFuture<'_, Vec<PathBuf>>;
}
