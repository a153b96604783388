use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("rate limit exceeded")]
    RateLimitExceeded,
    #[error("request to {url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Read side of the crawl: one page of JSON entities per call.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    async fn get(&self, url: &str) -> Result<Vec<Value>, FetchError>;

    /// Cumulative number of request attempts since process start.
    fn request_count(&self) -> u64;

    fn base_url(&self) -> &str;
}

pub type DynFetcher = Arc<dyn ResourceFetcher>;

pub struct GithubApi {
    client: Client,
    base_url: String,
    basic_auth_token: Option<String>,
    requests: AtomicU64,
}

impl GithubApi {
    pub fn new(base_url: &str, basic_auth_token: Option<String>) -> Result<Self, reqwest::Error> {
        let mut default_headers = header::HeaderMap::new();
        default_headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/vnd.github.v3+json"),
        );

        let client = Client::builder()
            .default_headers(default_headers)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            basic_auth_token,
            requests: AtomicU64::new(0),
        })
    }
}

#[async_trait]
impl ResourceFetcher for GithubApi {
    async fn get(&self, url: &str) -> Result<Vec<Value>, FetchError> {
        tracing::debug!(url, "retrieving page");

        let mut request = self.client.get(url);
        if let Some(token) = &self.basic_auth_token {
            request = request.header(header::AUTHORIZATION, format!("Basic {token}"));
        }

        // Counted per attempt, like the upstream meters it.
        self.requests.fetch_add(1, Ordering::Relaxed);

        let response = request.send().await.map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimitExceeded);
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .json::<Vec<Value>>()
            .await
            .map_err(|source| FetchError::Decode {
                url: url.to_string(),
                source,
            })
    }

    fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}
