//! Alternate persistence mode: profiles decoded as JSON and grouped into
//! fixed-size chunk files.
//!
//! Records are buffered in memory by chunk index `(id - 1) / chunk_size + 1`.
//! On flush every dirty chunk file is loaded, merged with the buffered records
//! and rewritten as a whole. Chunks without new records are left untouched, so
//! a flush with nothing buffered never changes a byte on disk.

use crate::storage::sink::{PersistenceSink, SinkFuture};
use anyhow::{anyhow, bail, Context, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// One stored profile inside a chunk file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: u64,
    pub profile: Value,
}

#[derive(Debug)]
pub struct ChunkedJsonSink {
    dir: PathBuf,
    chunk_size: u64,
    pending: Mutex<BTreeMap<u64, Vec<ChunkRecord>>>,
}

/// Chunk that holds `id`. Ids start at 1; id 0 shares the first chunk.
pub fn chunk_index(id: u64, chunk_size: u64) -> u64 {
    id.saturating_sub(1) / chunk_size.max(1) + 1
}

impl ChunkedJsonSink {
    pub fn new(dir: impl Into<PathBuf>, chunk_size: u64) -> Result<Self> {
        if chunk_size == 0 {
            bail!("chunk_size must be greater than 0");
        }
        Ok(Self {
            dir: dir.into(),
            chunk_size,
            pending: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn chunk_path(&self, chunk: u64) -> PathBuf {
        self.dir.join(format!("profiles_{chunk}.json"))
    }

    pub fn pending_records(&self) -> usize {
        self.pending
            .lock()
            .map(|pending| pending.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    fn buffer(&self, id: u64, body: &[u8]) -> Result<()> {
        let profile: Value = serde_json::from_slice(body)
            .with_context(|| format!("profile {id} body is not valid JSON"))?;
        let chunk = chunk_index(id, self.chunk_size);

        let mut pending = self
            .pending
            .lock()
            .map_err(|_| anyhow!("chunk buffer poisoned"))?;
        let records = pending.entry(chunk).or_default();
        records.retain(|record| record.id != id);
        records.push(ChunkRecord { id, profile });
        Ok(())
    }

    fn take_pending(&self) -> Result<BTreeMap<u64, Vec<ChunkRecord>>> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|_| anyhow!("chunk buffer poisoned"))?;
        Ok(std::mem::take(&mut *pending))
    }

    /// Puts records that could not be saved back into the buffer so a later
    /// flush retries them. Records buffered meanwhile win on id clashes.
    fn restore(&self, chunks: BTreeMap<u64, Vec<ChunkRecord>>) {
        if let Ok(mut pending) = self.pending.lock() {
            for (chunk, records) in chunks {
                let slot = pending.entry(chunk).or_default();
                for record in records {
                    if !slot.iter().any(|existing| existing.id == record.id) {
                        slot.push(record);
                    }
                }
            }
        }
    }

    async fn flush_chunks(&self) -> Result<Vec<PathBuf>> {
        let mut chunks = self.take_pending()?;
        let mut saved = Vec::with_capacity(chunks.len());

        while let Some((chunk, records)) = chunks.pop_first() {
            if records.is_empty() {
                continue;
            }
            match self.save_chunk(chunk, &records).await {
                Ok(path) => saved.push(path),
                Err(err) => {
                    chunks.insert(chunk, records);
                    self.restore(chunks);
                    return Err(err);
                }
            }
        }

        Ok(saved)
    }

    async fn save_chunk(&self, chunk: u64, records: &[ChunkRecord]) -> Result<PathBuf> {
        let path = self.chunk_path(chunk);
        let mut stored = load_chunk(&path).await?;

        let mut fresh = records.to_vec();
        fresh.sort_by_key(|record| record.id);
        stored.retain(|record| !fresh.iter().any(|new| new.id == record.id));
        stored.extend(fresh);

        let mut encoded = serde_json::to_vec_pretty(&stored)
            .with_context(|| format!("failed to encode chunk {chunk}"))?;
        encoded.push(b'\n');
        tokio::fs::write(&path, encoded)
            .await
            .with_context(|| format!("failed to write chunk file {}", path.display()))?;

        tracing::debug!(
            chunk,
            records = stored.len(),
            added = records.len(),
            "chunk file saved"
        );
        Ok(path)
    }
}

async fn load_chunk(path: &Path) -> Result<Vec<ChunkRecord>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .with_context(|| format!("chunk file {} is not a record array", path.display())),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => {
            Err(err).with_context(|| format!("failed to read chunk file {}", path.display()))
        }
    }
}

impl PersistenceSink for ChunkedJsonSink {
    fn prepare(&self) -> SinkFuture<'_, ()> {
        Box::pin(async move {
            tokio::fs::create_dir_all(&self.dir)
                .await
                .with_context(|| format!("failed to create output dir {}", self.dir.display()))
        })
    }

    fn write<'a>(&'a self, id: u64, body: Bytes) -> SinkFuture<'a, ()> {
        Box::pin(async move { self.buffer(id, &body) })
    }

    fn flush(&self) -> SinkFuture<'_, Vec<PathBuf>> {
        Box::pin(self.flush_chunks())
    }
}
