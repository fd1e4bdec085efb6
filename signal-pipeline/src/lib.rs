pub mod types;
pub mod traits;
pub mod rss_utils;
pub mod sources;
pub mod fetcher;
pub mod parser;
pub mod aggregator;
pub mod corpus;
pub mod events;
pub mod llm_adapter;
pub mod classifier;
pub mod formatter;
pub mod mailer;
pub mod config;
pub mod pipeline;

pub use types::*;
pub use traits::{FeedSource, MailSink};
pub use sources::FeedSpec;
pub use fetcher::HttpFetcher;
pub use parser::FeedParser;
pub use aggregator::{FeedAggregator, FetchOutcome, FetchStatus};
pub use corpus::{CorpusBuilder, CorpusConfig};
pub use events::{CalendarConfig, EventCalendar, EventOutcome};
pub use llm_adapter::{CompletionRequest, LlmAdapter, MockLlmAdapter, OpenAiAdapter};
pub use classifier::{parse_response, ClassifierOptions, SentimentClassifier};
pub use formatter::{EmailFormatter, RunContext};
pub use mailer::{MemoryMailSink, SmtpMailer, StdoutMailSink};
pub use config::AppConfig;
pub use pipeline::{PipelineBuilder, PipelineState, RunReport, SignalPipeline};
