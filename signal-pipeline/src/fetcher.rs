use crate::traits::FeedSource;
use crate::types::{FetchConfig, Result, SignalError};
use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// reqwest-backed feed retrieval. One attempt per URL; the scheduler owns retries.
pub struct HttpFetcher {
    client: Client,
    config: FetchConfig,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self { client, config })
    }

    fn check_size(&self, bytes: u64) -> Result<()> {
        let limit_mb = self.config.max_feed_size_mb;
        let limit_bytes = (limit_mb as u64).saturating_mul(1024 * 1024);
        if bytes > limit_bytes {
            return Err(SignalError::FeedTooLarge { bytes, limit_mb });
        }
        Ok(())
    }
}

#[async_trait]
impl FeedSource for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let start_time = Instant::now();
        debug!("Fetching feed: {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(SignalError::FeedStatus { status: status.as_u16() });
        }

        // Content-Length is advisory; the body is checked again once read
        if let Some(content_length) = response.content_length() {
            self.check_size(content_length)?;
        }

        let content = response.text().await?;
        self.check_size(content.len() as u64)?;

        info!(
            "Fetched feed: {} ({} bytes in {}ms)",
            url,
            content.len(),
            start_time.elapsed().as_millis()
        );
        Ok(content)
    }
}
