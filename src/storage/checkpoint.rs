use anyhow::{anyhow, Context, Result};
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

pub type CheckpointFuture<'a, T> = BoxFuture<'a, Result<T>>;

const UNSET: u64 = u64::MAX;

/// Durable marker of the last fully completed id.
pub trait CheckpointStore: Send + Sync {
    /// `None` when no checkpoint has ever been written.
    fn load(&self) -> CheckpointFuture<'_, Option<u64>>;

    fn store(&self, last_completed: u64) -> CheckpointFuture<'_, ()>;

    /// File backing the checkpoint, if any, so it can be published alongside
    /// the profiles it covers.
    fn artifact(&self) -> Option<PathBuf> {
        None
    }
}

/// First id still to download given the configured start and the stored
/// checkpoint.
pub fn resume_start(configured_start: u64, checkpoint: Option<u64>) -> u64 {
    match checkpoint {
        Some(last) => configured_start.max(last.saturating_add(1)),
        None => configured_start,
    }
}

/// Checkpoint kept as a decimal integer in a text file.
#[derive(Debug, Clone)]
pub struct FileCheckpoint {
    path: PathBuf,
}

impl FileCheckpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<Option<u64>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to read checkpoint {}", self.path.display())
                })
            }
        };

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        trimmed
            .parse::<u64>()
            .map(Some)
            .with_context(|| format!("checkpoint {} holds {trimmed:?}", self.path.display()))
    }

    async fn write(&self, last_completed: u64) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        tokio::fs::write(&staging, last_completed.to_string())
            .await
            .with_context(|| format!("failed to write checkpoint {}", staging.display()))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .with_context(|| format!("failed to replace checkpoint {}", self.path.display()))
    }
}

impl CheckpointStore for FileCheckpoint {
    fn load(&self) -> CheckpointFuture<'_, Option<u64>> {
        Box::pin(self.read())
    }

    fn store(&self, last_completed: u64) -> CheckpointFuture<'_, ()> {
        Box::pin(self.write(last_completed))
    }

    fn artifact(&self) -> Option<PathBuf> {
        Some(self.path.clone())
    }
}

/// Process-local checkpoint used when no checkpoint file is configured.
#[derive(Debug)]
pub struct MemoryCheckpoint {
    last_completed: AtomicU64,
}

impl MemoryCheckpoint {
    pub fn new(initial: Option<u64>) -> Self {
        Self {
            last_completed: AtomicU64::new(initial.unwrap_or(UNSET)),
        }
    }

    pub fn last_completed(&self) -> Option<u64> {
        match self.last_completed.load(Ordering::SeqCst) {
            UNSET => None,
            value => Some(value),
        }
    }
}

impl Default for MemoryCheckpoint {
    fn default() -> Self {
        Self::new(None)
    }
}

impl CheckpointStore for MemoryCheckpoint {
    fn load(&self) -> CheckpointFuture<'_, Option<u64>> {
        Box::pin(async move { Ok(self.last_completed()) })
    }

    fn store(&self, last_completed: u64) -> CheckpointFuture<'_, ()> {
        Box::pin(async move {
            if last_completed == UNSET {
                return Err(anyhow!("checkpoint {last_completed} is out of range"));
            }
            self.last_completed.store(last_completed, Ordering::SeqCst);
            Ok(())
        })
    }
}
