use crate::rss_utils::text::{normalize_title, truncate_chars};
use crate::types::{Corpus, NewsItem};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use tracing::{debug, info};

pub const TRUNCATION_MARKER: &str = " (truncated)";

#[derive(Debug, Clone)]
pub struct CorpusConfig {
    /// Upper bound on the rendered corpus, in characters.
    pub max_chars: usize,
    /// Items published before `now - max_age` are dropped. `None` keeps everything.
    pub max_age: Option<Duration>,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            max_chars: 8000,
            max_age: Some(Duration::hours(24)),
        }
    }
}

pub struct CorpusBuilder {
    config: CorpusConfig,
    now: DateTime<Utc>,
}

impl CorpusBuilder {
    pub fn new(config: CorpusConfig) -> Self {
        Self {
            config,
            now: Utc::now(),
        }
    }

    /// Pin the reference time used by the recency filter.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn build(&self, items: Vec<NewsItem>) -> Corpus {
        let received = items.len();

        let fresh = self.drop_stale(items);
        let stale_dropped = received - fresh.len();

        let mut unique = dedup_by_title(fresh);
        let duplicates_dropped = received - stale_dropped - unique.len();

        // Undated items compare as None < Some, so they end up last
        unique.sort_by(|a, b| b.published_at.cmp(&a.published_at));

        let mut corpus = self.fill_budget(unique);
        corpus.duplicates_dropped = duplicates_dropped;
        corpus.stale_dropped = stale_dropped;

        info!(
            "Built corpus: {} items, {} chars (dropped {} duplicates, {} stale, omitted {})",
            corpus.len(),
            corpus.char_count(),
            duplicates_dropped,
            stale_dropped,
            corpus.omitted
        );
        corpus
    }

    fn drop_stale(&self, items: Vec<NewsItem>) -> Vec<NewsItem> {
        let Some(cutoff) = self
            .config
            .max_age
            .and_then(|max_age| self.now.checked_sub_signed(max_age))
        else {
            return items;
        };

        items
            .into_iter()
            .filter(|item| match item.published_at {
                Some(published) if published < cutoff => {
                    debug!("Dropping stale item from {}: {}", item.source, item.title);
                    false
                }
                _ => true,
            })
            .collect()
    }

    /// Accumulate rendered items in order until the next one would overflow.
    fn fill_budget(&self, sorted: Vec<NewsItem>) -> Corpus {
        let max_chars = self.config.max_chars;
        let total = sorted.len();
        let mut corpus = Corpus::default();
        let mut used = 0;

        for item in sorted {
            let rendered = render_item(&item);
            let len = rendered.chars().count();

            if used + len <= max_chars {
                corpus.text.push_str(&rendered);
                used += len;
                corpus.items.push(item);
                continue;
            }

            if corpus.items.is_empty() {
                // Lead item alone is over budget: cut it rather than send nothing
                corpus.text = truncate_rendered(&rendered, max_chars);
                corpus.truncated = true;
                corpus.items.push(item);
            }
            break;
        }

        corpus.omitted = total - corpus.items.len();
        corpus
    }
}

/// One corpus line per item: source, optional timestamp, title, summary.
pub fn render_item(item: &NewsItem) -> String {
    let mut line = format!("- [{}]", item.source);
    if let Some(published) = item.published_at {
        line.push_str(&published.format(" %Y-%m-%d %H:%M UTC").to_string());
    }
    line.push(' ');
    line.push_str(&item.title);
    if !item.summary.is_empty() {
        line.push_str(": ");
        line.push_str(&item.summary);
    }
    line.push('\n');
    line
}

fn truncate_rendered(rendered: &str, max_chars: usize) -> String {
    let body = rendered.trim_end();
    let marker_len = TRUNCATION_MARKER.chars().count();

    if max_chars <= marker_len {
        return truncate_chars(body, max_chars).to_string();
    }
    format!("{}{}", truncate_chars(body, max_chars - marker_len), TRUNCATION_MARKER)
}

fn dedup_by_title(items: Vec<NewsItem>) -> Vec<NewsItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| {
            let fresh = seen.insert(normalize_title(&item.title));
            if !fresh {
                debug!("Removing duplicate headline: {}", item.title);
            }
            fresh
        })
        .collect()
}
