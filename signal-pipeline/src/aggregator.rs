use crate::parser::FeedParser;
use crate::sources::FeedSpec;
use crate::traits::FeedSource;
use crate::types::{FetchConfig, NewsItem, Result, SignalError, SourceWarning};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// Every source answered.
    Complete,
    /// Some sources failed but items were collected.
    Partial,
    /// Nothing usable came back.
    NoData,
}

/// Everything the fetch stage produced, failures included.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub items: Vec<NewsItem>,
    pub warnings: Vec<SourceWarning>,
    pub sources_ok: usize,
    pub sources_failed: usize,
}

impl FetchOutcome {
    pub fn status(&self) -> FetchStatus {
        if self.items.is_empty() {
            FetchStatus::NoData
        } else if self.sources_failed > 0 {
            FetchStatus::Partial
        } else {
            FetchStatus::Complete
        }
    }

    pub fn sources_total(&self) -> usize {
        self.sources_ok + self.sources_failed
    }
}

/// Pulls every configured feed, best-effort per source.
pub struct FeedAggregator {
    source: Arc<dyn FeedSource>,
    parser: FeedParser,
    per_source_timeout: Duration,
}

impl FeedAggregator {
    pub fn new(source: Arc<dyn FeedSource>, config: &FetchConfig) -> Self {
        Self {
            source,
            parser: FeedParser::new(config.max_items_per_feed),
            per_source_timeout: Duration::from_secs(config.timeout_seconds),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.per_source_timeout = timeout;
        self
    }

    /// Fetch all feeds concurrently. Never fails: a broken source becomes a warning.
    pub async fn fetch_all(&self, feeds: &[FeedSpec]) -> FetchOutcome {
        info!("Fetching {} feeds", feeds.len());

        let results = join_all(feeds.iter().map(|feed| self.fetch_one(feed))).await;

        let mut outcome = FetchOutcome::default();
        for (feed, result) in feeds.iter().zip(results) {
            match result {
                Ok(items) => {
                    outcome.sources_ok += 1;
                    outcome.items.extend(items);
                }
                Err(e) => {
                    warn!("Skipping feed {} ({}): {}", feed.name, feed.url, e);
                    outcome.sources_failed += 1;
                    outcome.warnings.push(SourceWarning {
                        source: feed.name.clone(),
                        url: feed.url.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Fetched {} items from {}/{} feeds",
            outcome.items.len(),
            outcome.sources_ok,
            outcome.sources_total()
        );
        outcome
    }

    async fn fetch_one(&self, feed: &FeedSpec) -> Result<Vec<NewsItem>> {
        let content = tokio::time::timeout(self.per_source_timeout, self.source.fetch(&feed.url))
            .await
            .map_err(|_| SignalError::Timeout {
                operation: format!("fetching {}", feed.name),
                seconds: self.per_source_timeout.as_secs(),
            })??;

        self.parser.parse_feed(&feed.name, &content)
    }
}
