use crate::http::client::profile_url;
use crate::http::options::DEFAULT_USER_AGENT;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://jbzd.com.pl";
pub const DEFAULT_CONCURRENCY: usize = 50;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_BATCH_SIZE: u64 = 1_000;
pub const DEFAULT_OUTPUT_DIR: &str = "profils";

/// How successful downloads are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistenceMode {
    /// `profile_{id}.html` per id.
    #[default]
    Files,
    /// JSON records grouped into `profiles_{chunk}.json` files.
    ChunkedJson { chunk_size: u64 },
}

/// Runtime configuration for a download run.
///
/// All instances must be constructed via [`DownloaderConfig::builder`] or
/// [`DownloaderConfig::new`] so invariants are validated before any consumer
/// observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloaderConfig {
    base_url: String,
    user_agent: String,
    start_id: u64,
    end_id: u64,
    concurrency: usize,
    max_retries: u32,
    request_timeout: Duration,
    batch_size: u64,
    output_dir: PathBuf,
    persistence: PersistenceMode,
    checkpoint_path: Option<PathBuf>,
    publish_repo: Option<PathBuf>,
}

pub struct DownloaderConfigParams {
    pub base_url: String,
    pub user_agent: String,
    pub start_id: u64,
    pub end_id: u64,
    pub concurrency: usize,
    pub max_retries: u32,
    pub request_timeout: Duration,
    pub batch_size: u64,
    pub output_dir: PathBuf,
    pub persistence: PersistenceMode,
    pub checkpoint_path: Option<PathBuf>,
    pub publish_repo: Option<PathBuf>,
}

impl DownloaderConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> DownloaderConfigBuilder {
        DownloaderConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    pub fn new(params: DownloaderConfigParams) -> Result<Self> {
        let DownloaderConfigParams {
            base_url,
            user_agent,
            start_id,
            end_id,
            concurrency,
            max_retries,
            request_timeout,
            batch_size,
            output_dir,
            persistence,
            checkpoint_path,
            publish_repo,
        } = params;

        let config = Self {
            base_url: base_url.trim().trim_end_matches('/').to_owned(),
            user_agent: user_agent.trim().to_owned(),
            start_id,
            end_id,
            concurrency,
            max_retries,
            request_timeout,
            batch_size,
            output_dir,
            persistence,
            checkpoint_path,
            publish_repo,
        };

        config.validate()?;
        Ok(config)
    }

    /// Scheme and host profiles are fetched from.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// First id of the configured range (inclusive).
    pub fn start_id(&self) -> u64 {
        self.start_id
    }

    /// Last id of the configured range (inclusive).
    pub fn end_id(&self) -> u64 {
        self.end_id
    }

    /// Maximum number of requests in flight, also the wave size.
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Requeues allowed per id before it is abandoned.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Ids per checkpointed sub-range.
    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn persistence(&self) -> PersistenceMode {
        self.persistence
    }

    pub fn checkpoint_path(&self) -> Option<&Path> {
        self.checkpoint_path.as_deref()
    }

    /// Git working tree results are committed and pushed from, when set.
    pub fn publish_repo(&self) -> Option<&Path> {
        self.publish_repo.as_deref()
    }

    pub fn profile_url(&self, id: u64) -> String {
        profile_url(&self.base_url, id)
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        validate_url(&self.base_url)?;
        ensure_not_empty(&self.user_agent, "user_agent")?;

        if self.start_id > self.end_id {
            bail!(
                "start_id ({}) must not exceed end_id ({})",
                self.start_id,
                self.end_id
            );
        }

        if self.concurrency == 0 {
            bail!("concurrency must be greater than 0");
        }

        if self.request_timeout.is_zero() {
            bail!("request_timeout must be greater than 0");
        }

        if self.batch_size == 0 {
            bail!("batch_size must be greater than 0");
        }

        if self.output_dir.as_os_str().is_empty() {
            bail!("output_dir cannot be empty");
        }

        if let PersistenceMode::ChunkedJson { chunk_size: 0 } = self.persistence {
            bail!("chunk_size must be greater than 0");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct DownloaderConfigBuilder {
    base_url: Option<String>,
    user_agent: Option<String>,
    start_id: Option<u64>,
    end_id: Option<u64>,
    concurrency: Option<usize>,
    max_retries: Option<u32>,
    request_timeout: Option<Duration>,
    batch_size: Option<u64>,
    output_dir: Option<PathBuf>,
    persistence: Option<PersistenceMode>,
    checkpoint_path: Option<PathBuf>,
    publish_repo: Option<PathBuf>,
}

impl DownloaderConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn start_id(mut self, id: u64) -> Self {
        self.start_id = Some(id);
        self
    }

    pub fn end_id(mut self, id: u64) -> Self {
        self.end_id = Some(id);
        self
    }

    pub fn concurrency(mut self, limit: usize) -> Self {
        self.concurrency = Some(limit);
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn batch_size(mut self, ids: u64) -> Self {
        self.batch_size = Some(ids);
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn persistence(mut self, mode: PersistenceMode) -> Self {
        self.persistence = Some(mode);
        self
    }

    pub fn checkpoint_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint_path = Some(path.into());
        self
    }

    pub fn publish_repo(mut self, repo: impl Into<PathBuf>) -> Self {
        self.publish_repo = Some(repo.into());
        self
    }

    pub fn build(self) -> Result<DownloaderConfig> {
        let params = DownloaderConfigParams {
            base_url: self
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            user_agent: self
                .user_agent
                .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            start_id: self.start_id.context("start_id is required")?,
            end_id: self.end_id.context("end_id is required")?,
            concurrency: self.concurrency.unwrap_or(DEFAULT_CONCURRENCY),
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            request_timeout: self
                .request_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)),
            batch_size: self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            output_dir: self
                .output_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            persistence: self.persistence.unwrap_or_default(),
            checkpoint_path: self.checkpoint_path,
            publish_repo: self.publish_repo,
        };

        DownloaderConfig::new(params)
    }
}

fn ensure_not_empty(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        bail!("{field} cannot be empty");
    }
    Ok(())
}

fn validate_url(url: &str) -> Result<()> {
    let url = url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("base_url must start with http:// or https://");
    }
    Ok(())
}
