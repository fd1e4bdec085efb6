use crate::rss_utils::url::is_valid_feed_url;
use crate::types::{Result, SignalError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A named RSS/Atom endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSpec {
    pub name: String,
    pub url: String,
}

impl FeedSpec {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }

    /// CNBC top news
    pub fn cnbc() -> Self {
        Self::new("CNBC", "https://www.cnbc.com/id/100003114/device/rss/rss.html")
    }

    /// MarketWatch top stories
    pub fn marketwatch() -> Self {
        Self::new("MarketWatch", "https://feeds.marketwatch.com/marketwatch/topstories")
    }

    /// Wall Street Journal markets feed
    pub fn wsj_markets() -> Self {
        Self::new("WSJ Markets", "https://feeds.a.dj.com/rss/RSSMarketsMain.xml")
    }
}

impl fmt::Display for FeedSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.url)
    }
}

/// Parses `Name=https://host/path`. A bare URL is accepted and named after its domain.
impl FromStr for FeedSpec {
    type Err = SignalError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let (name, url) = match s.split_once('=') {
            // `=` inside a query string is not a name separator
            Some((name, url)) if !name.contains("://") => (name.trim().to_string(), url.trim()),
            _ => {
                let name = crate::rss_utils::url::extract_domain(s).unwrap_or_else(|| s.to_string());
                (name, s)
            }
        };

        if name.is_empty() {
            return Err(SignalError::invalid_config("feed", format!("missing name in '{}'", s)));
        }
        if !is_valid_feed_url(url) {
            return Err(SignalError::invalid_config("feed", format!("'{}' is not an http(s) URL", url)));
        }

        Ok(Self::new(name, url))
    }
}

/// The sources queried when nothing else is configured.
pub fn default_market_feeds() -> Vec<FeedSpec> {
    vec![FeedSpec::cnbc(), FeedSpec::marketwatch(), FeedSpec::wsj_markets()]
}

/// Parse a comma-separated list of feed specs. Blank entries are ignored.
pub fn parse_feed_list(list: &str) -> Result<Vec<FeedSpec>> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(FeedSpec::from_str)
        .collect()
}
