//! Process configuration, read from the environment once at startup.
//!
//! Anything required that is missing or malformed is reported here, before any
//! pipeline stage runs.

use crate::corpus::CorpusConfig;
use crate::events::{CalendarConfig, FOREX_FACTORY_CALENDAR_URL};
use crate::rss_utils::url::is_valid_feed_url;
use crate::sources::{default_market_feeds, parse_feed_list, FeedSpec};
use crate::types::{FetchConfig, Result, SignalError};
use chrono::FixedOffset;
use secrecy::SecretString;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_SMTP_SERVER: &str = "smtp.gmail.com";
pub const DEFAULT_SMTP_PORT: u16 = 587;
/// Smallest corpus budget that still fits a headline.
pub const MIN_CORPUS_CHARS: usize = 64;

/// Model endpoint settings.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: SecretString,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub timeout: Duration,
}

/// Outbound mail settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub sender: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub llm: LlmConfig,
    /// `None` in dry-run mode.
    pub smtp: Option<SmtpConfig>,
    pub recipient: String,
    pub feeds: Vec<FeedSpec>,
    pub fetch: FetchConfig,
    pub corpus: CorpusConfig,
    pub display_offset: FixedOffset,
    /// `None` when `SIGNAL_EVENTS_URL` is `off`.
    pub calendar: Option<CalendarConfig>,
}

impl AppConfig {
    /// Build config from environment variables.
    /// Mail settings are only required when `require_mail` is set.
    pub fn from_env(require_mail: bool) -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok(), require_mail)
    }

    pub fn from_lookup<F>(lookup: F, require_mail: bool) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let llm = LlmConfig {
            api_key: SecretString::from(env.required("OPENAI_API_KEY")?),
            model: env.optional("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: env
                .optional("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            temperature: env.parsed("SIGNAL_MODEL_TEMPERATURE", 0.3_f32)?,
            timeout: env.seconds("SIGNAL_MODEL_TIMEOUT_SECS", 60)?,
        };
        if !(0.0..=2.0).contains(&llm.temperature) {
            return Err(SignalError::invalid_config(
                "SIGNAL_MODEL_TEMPERATURE",
                "must be between 0.0 and 2.0",
            ));
        }

        let (smtp, recipient) = if require_mail {
            let sender = env.required("EMAIL_FROM")?;
            let smtp = SmtpConfig {
                host: env
                    .optional("SMTP_SERVER")
                    .unwrap_or_else(|| DEFAULT_SMTP_SERVER.to_string()),
                port: env.parsed("SMTP_PORT", DEFAULT_SMTP_PORT)?,
                username: env.optional("SMTP_USERNAME").unwrap_or_else(|| sender.clone()),
                password: SecretString::from(env.required("EMAIL_PASSWORD")?),
                sender,
                timeout: env.seconds("SIGNAL_SMTP_TIMEOUT_SECS", 30)?,
            };
            (Some(smtp), env.required("EMAIL_TO")?)
        } else {
            let recipient = env
                .optional("EMAIL_TO")
                .unwrap_or_else(|| "dry-run@localhost".to_string());
            (None, recipient)
        };

        let feeds = match env.optional("SIGNAL_FEEDS") {
            Some(list) => parse_feed_list(&list)?,
            None => default_market_feeds(),
        };
        if feeds.is_empty() {
            return Err(SignalError::invalid_config("SIGNAL_FEEDS", "no feeds listed"));
        }

        let fetch = FetchConfig {
            timeout_seconds: env.seconds("SIGNAL_FETCH_TIMEOUT_SECS", 15)?.as_secs(),
            max_items_per_feed: env.parsed("SIGNAL_MAX_ITEMS_PER_FEED", 20_usize)?,
            ..FetchConfig::default()
        };

        let max_chars = env.parsed("SIGNAL_CORPUS_MAX_CHARS", 8000_usize)?;
        check_max_chars("SIGNAL_CORPUS_MAX_CHARS", max_chars)?;
        let max_age_hours = env.parsed("SIGNAL_MAX_AGE_HOURS", 24_i64)?;
        let max_age = if max_age_hours > 0 {
            let age = chrono::Duration::try_hours(max_age_hours)
                .ok_or_else(|| SignalError::invalid_config("SIGNAL_MAX_AGE_HOURS", "too large"))?;
            Some(age)
        } else {
            None
        };
        let corpus = CorpusConfig { max_chars, max_age };

        let offset_minutes = env.parsed("SIGNAL_DISPLAY_UTC_OFFSET_MINUTES", 0_i32)?;
        let display_offset = offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                SignalError::invalid_config("SIGNAL_DISPLAY_UTC_OFFSET_MINUTES", "offset out of range")
            })?;

        let calendar = match env.optional("SIGNAL_EVENTS_URL") {
            Some(value) if matches!(value.to_ascii_lowercase().as_str(), "off" | "none") => None,
            url => {
                let url = url.unwrap_or_else(|| FOREX_FACTORY_CALENDAR_URL.to_string());
                if !is_valid_feed_url(&url) {
                    return Err(SignalError::invalid_config(
                        "SIGNAL_EVENTS_URL",
                        format!("'{}' is not an http(s) URL", url),
                    ));
                }
                let horizon_hours = env.parsed("SIGNAL_EVENTS_HORIZON_HOURS", 16_i64)?;
                if horizon_hours <= 0 {
                    return Err(SignalError::invalid_config(
                        "SIGNAL_EVENTS_HORIZON_HOURS",
                        "must be greater than zero",
                    ));
                }
                let horizon = chrono::Duration::try_hours(horizon_hours)
                    .ok_or_else(|| SignalError::invalid_config("SIGNAL_EVENTS_HORIZON_HOURS", "too large"))?;
                Some(CalendarConfig {
                    url,
                    horizon,
                    max_events: env.parsed("SIGNAL_MAX_EVENTS", 5_usize)?,
                })
            }
        };

        Ok(Self {
            llm,
            smtp,
            recipient,
            feeds,
            fetch,
            corpus,
            display_offset,
            calendar,
        })
    }

    /// Skip the economic calendar for this run.
    pub fn without_events(mut self) -> Self {
        self.calendar = None;
        self
    }

    /// Replace the feed list with `NAME=URL` specs given on the command line.
    pub fn with_feed_overrides(mut self, specs: &[String]) -> Result<Self> {
        if specs.is_empty() {
            return Ok(self);
        }
        self.feeds = specs
            .iter()
            .map(|spec| spec.parse())
            .collect::<Result<Vec<FeedSpec>>>()?;
        Ok(self)
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Result<Self> {
        check_max_chars("--max-chars", max_chars)?;
        self.corpus.max_chars = max_chars;
        Ok(self)
    }
}

fn check_max_chars(var: &str, max_chars: usize) -> Result<()> {
    if max_chars < MIN_CORPUS_CHARS {
        return Err(SignalError::invalid_config(
            var,
            format!("must be at least {}", MIN_CORPUS_CHARS),
        ));
    }
    Ok(())
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// Set and non-blank.
    fn optional(&self, var: &str) -> Option<String> {
        (self.lookup)(var)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, var: &str) -> Result<String> {
        self.optional(var).ok_or_else(|| SignalError::missing_config(var))
    }

    fn parsed<T>(&self, var: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.optional(var) {
            Some(raw) => raw
                .parse()
                .map_err(|e| SignalError::invalid_config(var, format!("'{}': {}", raw, e))),
            None => Ok(default),
        }
    }

    /// Whole seconds, at least one.
    fn seconds(&self, var: &str, default: u64) -> Result<Duration> {
        match self.parsed(var, default)? {
            0 => Err(SignalError::invalid_config(var, "must be greater than zero")),
            secs => Ok(Duration::from_secs(secs)),
        }
    }
}
