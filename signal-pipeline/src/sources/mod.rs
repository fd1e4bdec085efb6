pub mod market_feeds;

pub use market_feeds::{default_market_feeds, parse_feed_list, FeedSpec};
