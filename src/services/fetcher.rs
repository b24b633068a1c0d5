//! Page retrieval.

use async_trait::async_trait;
use reqwest::Client;

use crate::error::Result;
use crate::utils::http;

/// Retrieves raw page content.
///
/// Implementations report every transport problem as `Err` and never retry;
/// the next scheduled cycle is the retry.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// reqwest-backed fetcher with the fixed timeout and user agent.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: http::create_async_client()?,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        log::debug!("Fetching {}", url);
        let body = http::fetch_text(&self.client, url).await?;
        log::debug!("Fetched {} bytes from {}", body.len(), url);
        Ok(body)
    }
}
