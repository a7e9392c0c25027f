//! HTTP plumbing for profile downloads: client, default headers, options, and
//! metrics.

pub mod client;
pub mod headers;
pub mod metrics;
pub mod options;

pub use client::{profile_url, FetchError, ProfileClient, ProfileResponse, ProfileSource};
pub use metrics::HttpMetricsSnapshot;
pub use options::HttpClientOptions;
