//! Hand-off of finished batch artifacts to version control.

use anyhow::{bail, Context, Result};
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use tokio::process::Command;

pub trait Publisher: Send + Sync {
    /// Records `files` under `message`. Failures are reported, never retried here.
    fn publish<'a>(&'a self, files: &'a [PathBuf], message: &'a str) -> BoxFuture<'a, Result<()>>;
}

/// Publisher used when publishing is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

impl Publisher for NoopPublisher {
    fn publish<'a>(&'a self, files: &'a [PathBuf], _message: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            tracing::trace!(files = files.len(), "publishing disabled; skipping");
            Ok(())
        })
    }
}

/// Stages, commits and pushes files from a git working tree by shelling out
/// to `git`.
#[derive(Debug, Clone)]
pub struct GitPublisher {
    repo: PathBuf,
    push: bool,
}

impl GitPublisher {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self {
            repo: repo.into(),
            push: true,
        }
    }

    /// Commit locally without pushing.
    pub fn without_push(mut self) -> Self {
        self.push = false;
        self
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    async fn commit_and_push(&self, files: &[PathBuf], message: &str) -> Result<()> {
        if files.is_empty() {
            tracing::debug!("no artifacts to publish");
            return Ok(());
        }

        let mut add = vec!["add".to_string(), "--".to_string()];
        for path in files {
            add.push(staged_path(path).await?.to_string_lossy().into_owned());
        }
        self.git(add.as_slice()).await?;

        if self.nothing_staged().await? {
            tracing::info!("artifacts unchanged; skipping commit");
            return Ok(());
        }

        self.git(&["commit", "-m", message]).await?;
        tracing::info!(files = files.len(), message, "committed batch artifacts");

        if self.push {
            self.git(&["push"]).await.context("git push failed")?;
            tracing::info!("pushed batch artifacts");
        }
        Ok(())
    }

    async fn nothing_staged(&self) -> Result<bool> {
        let status = Command::new("git")
            .arg("-C")
            .arg(&self.repo)
            .args(["diff", "--cached", "--quiet"])
            .status()
            .await
            .context("failed to run git diff")?;
        Ok(status.success())
    }

    async fn git<S: AsRef<str>>(&self, args: &[S]) -> Result<()> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.repo)
            .args(args.iter().map(AsRef::as_ref))
            .output()
            .await
            .with_context(|| format!("failed to spawn git in {}", self.repo.display()))?;

        if !output.status.success() {
            let command = args.first().map(AsRef::as_ref).unwrap_or_default();
            bail!(
                "git {command} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }
}

/// `git -C` resolves relative pathspecs against the repository, while sinks
/// report paths relative to the process working directory.
async fn staged_path(path: &Path) -> Result<PathBuf> {
    tokio::fs::canonicalize(path)
        .await
        .with_context(|| format!("failed to resolve artifact {}", path.display()))
}

impl Publisher for GitPublisher {
    fn publish<'a>(&'a self, files: &'a [PathBuf], message: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.commit_and_push(files, message))
    }
}
