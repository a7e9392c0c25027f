//! Configurable knobs for the profile HTTP client along with validation so
//! callers can reason about timeouts and connection pooling.

use anyhow::{bail, Result};
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 64;

#[derive(Debug, Clone)]
pub struct HttpClientOptions {
    pub user_agent: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub pool_max_idle_per_host: usize,
}

impl Default for HttpClientOptions {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
        }
    }
}

impl HttpClientOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.user_agent.trim().is_empty() {
            bail!("user_agent cannot be empty");
        }
        if self.request_timeout.is_zero() {
            bail!("request_timeout must be greater than 0");
        }
        if self.connect_timeout.is_zero() {
            bail!("connect_timeout must be greater than 0");
        }
        Ok(())
    }
}
