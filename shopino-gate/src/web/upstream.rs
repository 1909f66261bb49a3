//! Forwarding of authenticated requests to the shop backend.
//!
//! The gate owns no business logic. Once a request is allowed it is replayed
//! against the configured upstream and the response is relayed verbatim.

use std::time::Duration;

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::http::{header::CONTENT_TYPE, HeaderValue, Method, StatusCode};
use tracing::info;

/// Shared HTTP client bound to one upstream base URL.
#[derive(Clone)]
pub struct Upstream {
    client: reqwest::Client,
    base_url: String,
}

/// What the upstream answered.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

impl Upstream {
    /// Create a client for `base_url` with a per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        url::Url::parse(base_url).context("Invalid upstream URL")?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build upstream HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Replay a request against the upstream.
    ///
    /// `path_and_query` must start with `/`. The signature header is not
    /// forwarded.
    pub async fn forward(
        &self,
        method: Method,
        path_and_query: &str,
        content_type: Option<HeaderValue>,
        body: Bytes,
    ) -> Result<UpstreamResponse> {
        let url = format!("{}{}", self.base_url, path_and_query);

        let mut request = self.client.request(method.clone(), &url);
        if let Some(content_type) = content_type {
            request = request.header(CONTENT_TYPE, content_type);
        }
        if !body.is_empty() {
            request = request.body(body);
        }

        let response = request
            .send()
            .await
            .context("Upstream request failed")?;

        let status = response.status();
        let content_type = response.headers().get(CONTENT_TYPE).cloned();
        let body = response
            .bytes()
            .await
            .context("Failed to read upstream response")?;

        info!(
            method = %method,
            status = status.as_u16(),
            body_length = body.len(),
            "upstream_response"
        );

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }
}
