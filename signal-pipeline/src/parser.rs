use crate::rss_utils::text::clean_feed_text;
use crate::types::{NewsItem, Result, SignalError};
use chrono::Utc;
use feed_rs::parser;
use tracing::{debug, info};

/// Turns a raw RSS/Atom document into normalized [`NewsItem`]s.
pub struct FeedParser {
    max_items: usize,
}

impl FeedParser {
    pub fn new(max_items: usize) -> Self {
        Self { max_items }
    }

    pub fn parse_feed(&self, source_name: &str, content: &str) -> Result<Vec<NewsItem>> {
        debug!("Parsing feed from {} ({} bytes)", source_name, content.len());

        let feed = parser::parse(content.as_bytes())
            .map_err(|e| SignalError::Parse(format!("Failed to parse feed: {}", e)))?;

        let total = feed.entries.len();
        let items: Vec<NewsItem> = feed
            .entries
            .into_iter()
            .filter_map(|entry| Self::parse_entry(source_name, entry))
            .take(self.max_items)
            .collect();

        info!(
            "Parsed {} items from {} ({} entries in feed)",
            items.len(),
            source_name,
            total
        );
        Ok(items)
    }

    fn parse_entry(source_name: &str, entry: feed_rs::model::Entry) -> Option<NewsItem> {
        let title = entry
            .title
            .map(|t| clean_feed_text(&t.content))
            .unwrap_or_default();

        if title.is_empty() {
            debug!("Dropping untitled entry {} from {}", entry.id, source_name);
            return None;
        }

        // Prefer the summary, fall back to the content body
        let summary = entry
            .summary
            .map(|s| s.content)
            .or_else(|| entry.content.and_then(|c| c.body))
            .map(|raw| clean_feed_text(&raw))
            .unwrap_or_default();

        let published_at = entry
            .published
            .or(entry.updated)
            .map(|dt| dt.with_timezone(&Utc));

        Some(NewsItem {
            title,
            summary,
            source: source_name.to_string(),
            published_at,
        })
    }
}
