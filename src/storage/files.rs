//! One file per profile under a fixed output directory.

use crate::storage::sink::{PersistenceSink, SinkFuture};
use anyhow::{Context, Result};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug)]
pub struct FileSink {
    dir: PathBuf,
    written: Mutex<Vec<PathBuf>>,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            written: Mutex::new(Vec::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: u64) -> PathBuf {
        self.dir.join(format!("profile_{id}.html"))
    }

    async fn write_profile(&self, id: u64, body: Bytes) -> Result<()> {
        let path = self.path_for(id);
        tokio::fs::write(&path, &body)
            .await
            .with_context(|| format!("failed to write profile {id} to {}", path.display()))?;

        self.written
            .lock()
            .map_err(|_| anyhow::anyhow!("file sink bookkeeping poisoned"))?
            .push(path);
        Ok(())
    }
}

impl PersistenceSink for FileSink {
    fn prepare(&self) -> SinkFuture<'_, ()> {
        Box::pin(async move {
            tokio::fs::create_dir_all(&self.dir)
                .await
                .with_context(|| format!("failed to create output dir {}", self.dir.display()))
        })
    }

    fn write<'a>(&'a self, id: u64, body: Bytes) -> SinkFuture<'a, ()> {
        Box::pin(self.write_profile(id, body))
    }

    fn flush(&self) -> SinkFuture<'_, Vec<PathBuf>> {
        Box::pin(async move {
            let mut written = self
                .written
                .lock()
                .map_err(|_| anyhow::anyhow!("file sink bookkeeping poisoned"))?;
            Ok(std::mem::take(&mut *written))
        })
    }
}
