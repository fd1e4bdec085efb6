//! High-impact economic calendar, fetched through the same [`FeedSource`]
//! capability as the news feeds.
//!
//! The calendar is best-effort context for the model: any failure turns into a
//! single [`SourceWarning`] and an empty event list.

use crate::traits::FeedSource;
use crate::types::{EconomicEvent, Result, SignalError, SourceWarning};
use chrono::{DateTime, FixedOffset, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Weekly ForexFactory calendar export.
pub const FOREX_FACTORY_CALENDAR_URL: &str = "https://nfs.faireconomy.media/ff_calendar_thisweek.json";
pub const CALENDAR_SOURCE_NAME: &str = "Economic calendar";

#[derive(Debug, Clone)]
pub struct CalendarConfig {
    pub url: String,
    /// Only events scheduled in `[now, now + horizon]` are kept.
    pub horizon: chrono::Duration,
    pub max_events: usize,
}

impl CalendarConfig {
    pub fn horizon_hours(&self) -> i64 {
        self.horizon.num_hours()
    }
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            url: FOREX_FACTORY_CALENDAR_URL.to_string(),
            horizon: chrono::Duration::hours(16),
            max_events: 5,
        }
    }
}

#[derive(Deserialize)]
struct CalendarEntry {
    title: String,
    #[serde(default)]
    country: String,
    date: DateTime<FixedOffset>,
    #[serde(default)]
    impact: String,
}

/// Keep high-impact entries inside the horizon, soonest first.
pub fn parse_calendar(json: &str, now: DateTime<Utc>, config: &CalendarConfig) -> Result<Vec<EconomicEvent>> {
    let entries: Vec<CalendarEntry> = serde_json::from_str(json)?;
    let total = entries.len();
    let end = now.checked_add_signed(config.horizon).unwrap_or(DateTime::<Utc>::MAX_UTC);

    let mut events: Vec<EconomicEvent> = entries
        .into_iter()
        .filter(|entry| entry.impact.trim().eq_ignore_ascii_case("high"))
        .filter(|entry| !entry.title.trim().is_empty())
        .map(|entry| EconomicEvent {
            title: entry.title.trim().to_string(),
            currency: entry.country.trim().to_string(),
            scheduled_at: entry.date.with_timezone(&Utc),
        })
        .filter(|event| event.scheduled_at >= now && event.scheduled_at <= end)
        .collect();

    events.sort_by_key(|event| event.scheduled_at);
    events.truncate(config.max_events);

    debug!("Kept {} of {} calendar entries", events.len(), total);
    Ok(events)
}

/// One prompt line per event.
pub fn render_event(event: &EconomicEvent) -> String {
    let time = event.scheduled_at.format("%Y-%m-%d %H:%M UTC");
    if event.currency.is_empty() {
        format!("- {} ({})\n", event.title, time)
    } else {
        format!("- {}: {} ({})\n", event.currency, event.title, time)
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventOutcome {
    pub events: Vec<EconomicEvent>,
    pub warning: Option<SourceWarning>,
}

pub struct EventCalendar {
    source: Arc<dyn FeedSource>,
    config: CalendarConfig,
    timeout: Duration,
}

impl EventCalendar {
    pub fn new(source: Arc<dyn FeedSource>, config: CalendarConfig, timeout: Duration) -> Self {
        Self { source, config, timeout }
    }

    pub fn horizon_hours(&self) -> i64 {
        self.config.horizon_hours()
    }

    /// Never fails; a broken calendar yields no events and a warning.
    pub async fn upcoming(&self, now: DateTime<Utc>) -> EventOutcome {
        match self.fetch(now).await {
            Ok(events) => {
                info!(
                    "Found {} high-impact events in the next {}h",
                    events.len(),
                    self.horizon_hours()
                );
                EventOutcome { events, warning: None }
            }
            Err(e) => {
                warn!("Skipping economic calendar ({}): {}", self.config.url, e);
                EventOutcome {
                    events: Vec::new(),
                    warning: Some(SourceWarning {
                        source: CALENDAR_SOURCE_NAME.to_string(),
                        url: self.config.url.clone(),
                        reason: e.to_string(),
                    }),
                }
            }
        }
    }

    async fn fetch(&self, now: DateTime<Utc>) -> Result<Vec<EconomicEvent>> {
        let body = tokio::time::timeout(self.timeout, self.source.fetch(&self.config.url))
            .await
            .map_err(|_| SignalError::Timeout {
                operation: "fetching economic calendar".to_string(),
                seconds: self.timeout.as_secs(),
            })??;

        parse_calendar(&body, now, &self.config)
    }
}
