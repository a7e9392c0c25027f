//! Default request headers wired into the `reqwest` client builder.

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};

pub(crate) fn build_default_headers(user_agent: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let value = HeaderValue::from_str(user_agent.trim())
        .context("failed to build User-Agent header")?;
    headers.insert(USER_AGENT, value);
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/json;q=0.9,*/*;q=0.8"),
    );
    Ok(headers)
}
