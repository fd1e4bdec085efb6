use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A normalized headline pulled from one feed source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub summary: String,
    pub source: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// Bounded set of news items plus the exact text handed to the model.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub items: Vec<NewsItem>,
    pub text: String,
    pub duplicates_dropped: usize,
    pub stale_dropped: usize,
    /// Items that survived filtering but did not fit in the budget.
    pub omitted: usize,
    /// The lead item was cut at the budget boundary.
    pub truncated: bool,
}

impl Corpus {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum Stance {
    RiskOn,
    RiskOff,
    Neutral,
}

impl Stance {
    pub const ALL: [Stance; 3] = [Stance::RiskOn, Stance::RiskOff, Stance::Neutral];

    /// Label used in prompts, subjects and email bodies.
    pub fn label(&self) -> &'static str {
        match self {
            Stance::RiskOn => "RISK-ON",
            Stance::RiskOff => "RISK-OFF",
            Stance::Neutral => "NEUTRAL",
        }
    }

    /// Email accent color. Depends on the stance only, never on the score.
    pub fn accent_color(&self) -> &'static str {
        match self {
            Stance::RiskOn => "#2e7d32",
            Stance::RiskOff => "#c62828",
            Stance::Neutral => "#757575",
        }
    }
}

impl fmt::Display for Stance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Something the classifier had to paper over while reading the model reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseAnomaly {
    MissingStance,
    UnrecognizedStance(String),
    MissingScore,
    UnparseableScore(String),
    ScoreClamped { raw: String, clamped: i32 },
    MissingRationale,
    /// Stance and score point in opposite directions. Both are kept as given.
    Inconsistent { stance: Stance, score: i32 },
}

impl fmt::Display for ParseAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseAnomaly::MissingStance => write!(f, "no stance line in model reply, defaulted to NEUTRAL"),
            ParseAnomaly::UnrecognizedStance(raw) => {
                write!(f, "unrecognized stance '{}', defaulted to NEUTRAL", raw)
            }
            ParseAnomaly::MissingScore => write!(f, "no score line in model reply, defaulted to 0"),
            ParseAnomaly::UnparseableScore(raw) => {
                write!(f, "no integer in score '{}', defaulted to 0", raw)
            }
            ParseAnomaly::ScoreClamped { raw, clamped } => {
                write!(f, "score {} out of range, clamped to {}", raw, clamped)
            }
            ParseAnomaly::MissingRationale => write!(f, "model reply had no rationale"),
            ParseAnomaly::Inconsistent { stance, score } => {
                write!(f, "stance {} disagrees with score {}", stance, score)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalOrigin {
    /// Parsed from a model completion.
    Model,
    /// No usable headlines; the model was not consulted.
    NoData(NoDataReason),
}

/// Why a run had nothing to classify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoDataReason {
    /// No source returned any headline.
    NothingFetched,
    /// Headlines arrived but all were older than the recency window.
    AllStale,
}

impl NoDataReason {
    pub fn explanation(&self) -> &'static str {
        match self {
            NoDataReason::NothingFetched => {
                "No news headlines could be retrieved from the configured sources."
            }
            NoDataReason::AllStale => {
                "Headlines were retrieved, but none was published within the recency window."
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentSignal {
    pub stance: Stance,
    pub score: i32,
    pub rationale: String,
    pub generated_at: DateTime<Utc>,
    pub anomalies: Vec<ParseAnomaly>,
    pub origin: SignalOrigin,
}

impl SentimentSignal {
    pub const MIN_SCORE: i32 = -100;
    pub const MAX_SCORE: i32 = 100;

    pub fn is_degraded(&self) -> bool {
        matches!(self.origin, SignalOrigin::NoData(_))
    }

    pub fn has_anomalies(&self) -> bool {
        !self.anomalies.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailPayload {
    pub subject: String,
    pub html_body: String,
    pub recipient: String,
}

/// A scheduled high-impact macro release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EconomicEvent {
    pub title: String,
    pub currency: String,
    pub scheduled_at: DateTime<Utc>,
}

/// Non-fatal problem with a single feed source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceWarning {
    pub source: String,
    pub url: String,
    pub reason: String,
}

impl fmt::Display for SourceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.source, self.url, self.reason)
    }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_feed_size_mb: usize,
    pub max_redirects: usize,
    pub max_items_per_feed: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "Sentiment-Signal/1.0".to_string(),
            timeout_seconds: 15,
            max_feed_size_mb: 10,
            max_redirects: 5,
            max_items_per_feed: 20,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed returned HTTP {status}")]
    FeedStatus { status: u16 },

    #[error("Feed body of {bytes} bytes exceeds the {limit_mb}MB limit")]
    FeedTooLarge { bytes: u64, limit_mb: usize },

    #[error("Feed parse error: {0}")]
    Parse(String),

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("Model endpoint rejected credentials (HTTP {status})")]
    ModelAuth { status: u16 },

    #[error("Model endpoint returned HTTP {status}: {body}")]
    ModelStatus { status: u16, body: String },

    #[error("Model returned no completion text")]
    EmptyCompletion,

    #[error("Mail delivery failed: {0}")]
    Delivery(String),

    #[error("Configuration error for {var}: {reason}")]
    Config { var: String, reason: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("JSON decode error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SignalError {
    pub fn missing_config(var: &str) -> Self {
        SignalError::Config {
            var: var.to_string(),
            reason: "not set".to_string(),
        }
    }

    pub fn invalid_config(var: &str, reason: impl Into<String>) -> Self {
        SignalError::Config {
            var: var.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SignalError>;
