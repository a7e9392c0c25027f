//! HTTP client used to download individual profile pages. Houses the
//! `ProfileClient`, its error type, and the `ProfileSource` trait consumed by
//! the fetcher.

use crate::http::headers::build_default_headers;
use crate::http::metrics::{HttpMetrics, HttpMetricsSnapshot};
use crate::http::options::HttpClientOptions;
use crate::runtime::config::DownloaderConfig;
use anyhow::{anyhow, Result};
use bytes::Bytes;
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::time::{timeout, Instant};

pub const PROFILE_PATH: &str = "/mikroblog/user/profile";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    Timeout { id: u64 },
    Connection { id: u64, message: String },
    MalformedResponse { id: u64, message: String },
    Unexpected { id: u64, message: String },
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchError::Timeout { id } => write!(f, "profile {id} request timed out"),
            FetchError::Connection { id, message } => {
                write!(f, "profile {id} connection failed: {message}")
            }
            FetchError::MalformedResponse { id, message } => {
                write!(f, "profile {id} response was malformed: {message}")
            }
            FetchError::Unexpected { id, message } => {
                write!(f, "profile {id} request failed unexpectedly: {message}")
            }
        }
    }
}

impl std::error::Error for FetchError {}

/// Status line plus body of one profile request. The body is only read for
/// `200` responses and is empty otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileResponse {
    pub status: u16,
    pub body: Bytes,
}

impl ProfileResponse {
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: Bytes::new(),
        }
    }
}

pub trait ProfileSource: Send + Sync {
    fn fetch_profile<'a>(&'a self, id: u64) -> BoxFuture<'a, Result<ProfileResponse, FetchError>>;
}

/// Builds the profile URL for `id` under `base_url`.
pub fn profile_url(base_url: &str, id: u64) -> String {
    format!("{}{PROFILE_PATH}/{id}", base_url.trim().trim_end_matches('/'))
}

#[derive(Debug, Clone)]
pub struct ProfileClient {
    base_url: Arc<String>,
    client: reqwest::Client,
    options: HttpClientOptions,
    metrics: Arc<HttpMetrics>,
}

impl ProfileSource for ProfileClient {
    fn fetch_profile<'a>(&'a self, id: u64) -> BoxFuture<'a, Result<ProfileResponse, FetchError>> {
        Box::pin(self.fetch_profile(id))
    }
}

impl ProfileClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_options(base_url, HttpClientOptions::default())
    }

    pub fn with_options(base_url: impl Into<String>, options: HttpClientOptions) -> Result<Self> {
        options.validate()?;

        let base_url = base_url.into().trim().trim_end_matches('/').to_owned();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(anyhow!("base_url must start with http:// or https://"));
        }

        let headers = build_default_headers(&options.user_agent)?;
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(options.request_timeout)
            .connect_timeout(options.connect_timeout)
            .pool_max_idle_per_host(options.pool_max_idle_per_host)
            .build()
            .map_err(|err| anyhow!("failed to build HTTP client: {err}"))?;

        Ok(Self {
            base_url: Arc::new(base_url),
            client,
            options,
            metrics: Arc::new(HttpMetrics::default()),
        })
    }

    pub fn from_config(config: &DownloaderConfig) -> Result<Self> {
        config.validate()?;
        let options = HttpClientOptions {
            user_agent: config.user_agent().to_owned(),
            request_timeout: config.request_timeout(),
            pool_max_idle_per_host: config.concurrency(),
            ..HttpClientOptions::default()
        };
        Self::with_options(config.base_url().to_owned(), options)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url_for(&self, id: u64) -> String {
        profile_url(&self.base_url, id)
    }

    pub fn metrics(&self) -> HttpMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Issues one GET for `id`. The whole exchange, body included, is bounded
    /// by the request timeout.
    pub async fn fetch_profile(&self, id: u64) -> Result<ProfileResponse, FetchError> {
        let start = Instant::now();
        let result = timeout(self.options.request_timeout, self.perform(id))
            .await
            .map_err(|_| FetchError::Timeout { id })
            .and_then(|inner| inner);

        let elapsed = start.elapsed();
        match &result {
            Ok(response) => self.metrics.record_response(elapsed, response.body.len()),
            Err(FetchError::Timeout { .. }) => self.metrics.record_timeout(elapsed),
            Err(_) => self.metrics.record_failure(elapsed),
        }

        result
    }

    async fn perform(&self, id: u64) -> Result<ProfileResponse, FetchError> {
        let response = self
            .client
            .get(self.url_for(id))
            .send()
            .await
            .map_err(|err| map_transport_error(id, err))?;

        let status = response.status().as_u16();
        if status != 200 {
            return Ok(ProfileResponse::status(status));
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| map_transport_error(id, err))?;

        tracing::trace!(id, bytes = body.len(), "profile body received");
        Ok(ProfileResponse { status, body })
    }
}

fn map_transport_error(id: u64, err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::Timeout { id };
    }
    if err.is_connect() || err.is_request() {
        return FetchError::Connection {
            id,
            message: err.to_string(),
        };
    }
    if err.is_body() || err.is_decode() {
        return FetchError::MalformedResponse {
            id,
            message: err.to_string(),
        };
    }
    FetchError::Unexpected {
        id,
        message: err.to_string(),
    }
}
