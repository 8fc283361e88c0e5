//! Fetching the exposition payload from a forwarded port

use std::time::Duration;

use async_trait::async_trait;

use super::{parse, MetricSample};
use crate::common::Result;

/// Source of the raw metrics payload
#[async_trait]
pub trait MetricsSource: Send + Sync {
    /// Fetch the payload served at `path` on the local `port`
    async fn scrape(&self, port: u16, path: &str) -> Result<String>;
}

/// Scrapes over HTTP on the loopback interface
#[derive(Debug, Clone)]
pub struct HttpScraper {
    client: reqwest::Client,
}

impl HttpScraper {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }
}

/// Build the loopback URL for `path` on `port`
pub fn metrics_url(port: u16, path: &str) -> String {
    if path.starts_with('/') {
        format!("http://127.0.0.1:{}{}", port, path)
    } else {
        format!("http://127.0.0.1:{}/{}", port, path)
    }
}

#[async_trait]
impl MetricsSource for HttpScraper {
    async fn scrape(&self, port: u16, path: &str) -> Result<String> {
        let url = metrics_url(port, path);
        let response = self.client.get(&url).send().await?.error_for_status()?;
        let body = response.text().await?;
        tracing::debug!(url = %url, bytes = body.len(), "Scraped metrics");
        Ok(body)
    }
}

/// Scrape and parse in one go
pub async fn fetch_samples(
    source: &dyn MetricsSource,
    port: u16,
    path: &str,
) -> Result<Vec<MetricSample>> {
    let payload = source.scrape(port, path).await?;
    parse(&payload)
}
