use crate::aggregator::{FeedAggregator, FetchStatus};
use crate::classifier::{ClassifierOptions, SentimentClassifier};
use crate::config::AppConfig;
use crate::corpus::{CorpusBuilder, CorpusConfig};
use crate::events::{CalendarConfig, EventCalendar, EventOutcome};
use crate::formatter::{EmailFormatter, RunContext};
use crate::llm_adapter::LlmAdapter;
use crate::sources::{default_market_feeds, FeedSpec};
use crate::traits::{FeedSource, MailSink};
use crate::types::{
    EconomicEvent, EmailPayload, FetchConfig, NoDataReason, Result, SentimentSignal, SignalError, SignalOrigin,
    SourceWarning, Stance,
};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Start,
    Fetched,
    CorpusBuilt,
    Classified,
    Formatted,
    Delivered,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineState::Start => "START",
            PipelineState::Fetched => "FETCHED",
            PipelineState::CorpusBuilt => "CORPUS_BUILT",
            PipelineState::Classified => "CLASSIFIED",
            PipelineState::Formatted => "FORMATTED",
            PipelineState::Delivered => "DELIVERED",
            PipelineState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// What happened during one invocation.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub state: PipelineState,
    /// Every state reached, in order, starting with `Start`.
    pub transitions: Vec<PipelineState>,
    pub fetch_status: Option<FetchStatus>,
    pub signal: Option<SentimentSignal>,
    pub payload: Option<EmailPayload>,
    pub error: Option<String>,
    pub diagnostic_sent: bool,
    pub warnings: Vec<SourceWarning>,
    /// Calendar events handed to the model, empty when no calendar is configured.
    pub events: Vec<EconomicEvent>,
}

impl RunReport {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            state: PipelineState::Start,
            transitions: vec![PipelineState::Start],
            fetch_status: None,
            signal: None,
            payload: None,
            error: None,
            diagnostic_sent: false,
            warnings: Vec::new(),
            events: Vec::new(),
        }
    }

    fn advance(&mut self, next: PipelineState) {
        info!("Pipeline state {} -> {}", self.state, next);
        self.state = next;
        self.transitions.push(next);
    }

    pub fn reached(&self, state: PipelineState) -> bool {
        self.transitions.contains(&state)
    }

    pub fn is_delivered(&self) -> bool {
        self.state == PipelineState::Delivered
    }

    /// 0 when an email went out, degraded or not; 1 on a failed run.
    pub fn exit_code(&self) -> i32 {
        if self.is_delivered() {
            0
        } else {
            1
        }
    }
}

/// Fetch → corpus → classify → format → deliver, once.
pub struct SignalPipeline {
    feeds: Vec<FeedSpec>,
    aggregator: FeedAggregator,
    corpus_config: CorpusConfig,
    classifier: SentimentClassifier,
    formatter: EmailFormatter,
    sink: Arc<dyn MailSink>,
    calendar: Option<EventCalendar>,
    delivery_timeout: Option<Duration>,
}

impl SignalPipeline {
    /// Outer deadline around the sink; `None` leaves it to the sink's own timeout.
    pub fn delivery_deadline(&self) -> Option<Duration> {
        self.delivery_timeout
    }

    pub async fn run(&self) -> RunReport {
        self.run_at(Utc::now()).await
    }

    /// Run with a fixed clock, used for recency filtering and `generated_at`.
    pub async fn run_at(&self, now: DateTime<Utc>) -> RunReport {
        let report = RunReport::new();
        let span = info_span!("signal_run", run_id = %report.run_id);
        self.execute(report, now).instrument(span).await
    }

    async fn execute(&self, mut report: RunReport, now: DateTime<Utc>) -> RunReport {
        info!("Starting sentiment run over {} feeds", self.feeds.len());

        let (outcome, events) = tokio::join!(self.aggregator.fetch_all(&self.feeds), self.upcoming_events(now));
        let fetch_status = outcome.status();
        if fetch_status == FetchStatus::NoData {
            warn!("No feed data available ({} sources failed)", outcome.sources_failed);
        }
        report.fetch_status = Some(fetch_status);
        let mut warnings = outcome.warnings.clone();
        let event_count = events.as_ref().map(|e| e.events.len());
        let events = events.map(|EventOutcome { events, warning }| {
            warnings.extend(warning);
            events
        });
        report.warnings = warnings.clone();
        report.events = events.clone().unwrap_or_default();
        let context = RunContext {
            news_count: outcome.items.len(),
            sources_ok: outcome.sources_ok,
            sources_total: outcome.sources_total(),
            event_count,
            event_horizon_hours: self.calendar.as_ref().map_or(0, EventCalendar::horizon_hours),
            warnings,
        };
        report.advance(PipelineState::Fetched);

        let reason = if outcome.items.is_empty() {
            NoDataReason::NothingFetched
        } else {
            NoDataReason::AllStale
        };
        let corpus = CorpusBuilder::new(self.corpus_config.clone())
            .at(now)
            .build(outcome.items);
        report.advance(PipelineState::CorpusBuilt);

        let signal = if corpus.is_empty() {
            warn!("Corpus is empty ({:?}), sending a degraded no-data signal", reason);
            no_data_signal(reason, now)
        } else {
            match self.classifier.classify_at(&corpus, events.as_deref(), now).await {
                Ok(signal) => signal,
                Err(e) => return self.fail(report, "classification", e, now, true).await,
            }
        };
        report.advance(PipelineState::Classified);

        let payload = self.formatter.render(&signal, &context);
        report.signal = Some(signal);
        report.advance(PipelineState::Formatted);

        match self.deliver(&payload).await {
            Ok(()) => {
                info!("Delivered '{}' to {}", payload.subject, payload.recipient);
                report.payload = Some(payload);
                report.advance(PipelineState::Delivered);
                report
            }
            Err(e) => {
                report.payload = Some(payload);
                // The sink just failed; a diagnostic would be a second attempt through it
                self.fail(report, "delivery", e, now, false).await
            }
        }
    }

    async fn upcoming_events(&self, now: DateTime<Utc>) -> Option<EventOutcome> {
        match &self.calendar {
            Some(calendar) => Some(calendar.upcoming(now).await),
            None => None,
        }
    }

    async fn deliver(&self, payload: &EmailPayload) -> Result<()> {
        let Some(deadline) = self.delivery_timeout else {
            return self.sink.deliver(payload).await;
        };
        tokio::time::timeout(deadline, self.sink.deliver(payload))
            .await
            .map_err(|_| SignalError::Timeout {
                operation: format!("delivery via {}", self.sink.sink_name()),
                seconds: deadline.as_secs(),
            })?
    }

    async fn fail(
        &self,
        mut report: RunReport,
        stage: &str,
        err: SignalError,
        now: DateTime<Utc>,
        send_diagnostic: bool,
    ) -> RunReport {
        error!("Run failed during {}: {}", stage, err);
        report.error = Some(err.to_string());
        report.advance(PipelineState::Failed);

        if send_diagnostic {
            let notice = self.formatter.render_failure(stage, &err.to_string(), now);
            match self.deliver(&notice).await {
                Ok(()) => {
                    info!("Diagnostic notice sent to {}", notice.recipient);
                    report.diagnostic_sent = true;
                }
                Err(e) => warn!("Could not send diagnostic notice: {}", e),
            }
        }
        report
    }
}

fn no_data_signal(reason: NoDataReason, now: DateTime<Utc>) -> SentimentSignal {
    SentimentSignal {
        stance: Stance::Neutral,
        score: 0,
        rationale: format!("{} No market sentiment was inferred for this run.", reason.explanation()),
        generated_at: now,
        anomalies: Vec::new(),
        origin: SignalOrigin::NoData(reason),
    }
}

/// Assembles a [`SignalPipeline`] from settings plus the three capabilities.
pub struct PipelineBuilder {
    recipient: String,
    feeds: Vec<FeedSpec>,
    fetch_config: FetchConfig,
    fetch_timeout: Option<Duration>,
    corpus_config: CorpusConfig,
    classifier_options: ClassifierOptions,
    display_offset: FixedOffset,
    calendar: Option<CalendarConfig>,
    delivery_timeout: Option<Duration>,
    feed_source: Option<Arc<dyn FeedSource>>,
    llm_adapter: Option<Arc<dyn LlmAdapter>>,
    mail_sink: Option<Arc<dyn MailSink>>,
}

impl PipelineBuilder {
    pub fn new(recipient: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            feeds: default_market_feeds(),
            fetch_config: FetchConfig::default(),
            fetch_timeout: None,
            corpus_config: CorpusConfig::default(),
            classifier_options: ClassifierOptions::default(),
            display_offset: Utc.fix(),
            calendar: None,
            delivery_timeout: Some(Duration::from_secs(30)),
            feed_source: None,
            llm_adapter: None,
            mail_sink: None,
        }
    }

    /// Settings from the environment; capabilities still have to be supplied.
    ///
    /// With SMTP configured the transport's own timeout bounds delivery, so no
    /// second deadline is layered on top of it.
    pub fn from_config(config: &AppConfig) -> Self {
        let mut builder = Self::new(config.recipient.clone())
            .feeds(config.feeds.clone())
            .fetch_config(config.fetch.clone())
            .corpus_config(config.corpus.clone())
            .classifier_options(ClassifierOptions {
                model: config.llm.model.clone(),
                temperature: config.llm.temperature,
                timeout: config.llm.timeout,
            })
            .display_offset(config.display_offset);
        if config.smtp.is_some() {
            builder.delivery_timeout = None;
        }
        builder.calendar = config.calendar.clone();
        builder
    }

    pub fn feeds(mut self, feeds: Vec<FeedSpec>) -> Self {
        self.feeds = feeds;
        self
    }

    pub fn fetch_config(mut self, config: FetchConfig) -> Self {
        self.fetch_config = config;
        self
    }

    /// Per-source deadline; defaults to the fetch config's timeout.
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    pub fn corpus_config(mut self, config: CorpusConfig) -> Self {
        self.corpus_config = config;
        self
    }

    pub fn classifier_options(mut self, options: ClassifierOptions) -> Self {
        self.classifier_options = options;
        self
    }

    pub fn display_offset(mut self, offset: FixedOffset) -> Self {
        self.display_offset = offset;
        self
    }

    /// Fetch high-impact events through the feed source alongside the news.
    pub fn calendar(mut self, config: CalendarConfig) -> Self {
        self.calendar = Some(config);
        self
    }

    pub fn delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = Some(timeout);
        self
    }

    pub fn feed_source(mut self, source: Arc<dyn FeedSource>) -> Self {
        self.feed_source = Some(source);
        self
    }

    pub fn llm_adapter(mut self, adapter: Arc<dyn LlmAdapter>) -> Self {
        self.llm_adapter = Some(adapter);
        self
    }

    pub fn mail_sink(mut self, sink: Arc<dyn MailSink>) -> Self {
        self.mail_sink = Some(sink);
        self
    }

    pub fn build(self) -> Result<SignalPipeline> {
        let source = self
            .feed_source
            .ok_or_else(|| SignalError::invalid_config("pipeline", "no feed source"))?;
        let adapter = self
            .llm_adapter
            .ok_or_else(|| SignalError::invalid_config("pipeline", "no LLM adapter"))?;
        let sink = self
            .mail_sink
            .ok_or_else(|| SignalError::invalid_config("pipeline", "no mail sink"))?;

        let fetch_timeout = self
            .fetch_timeout
            .unwrap_or_else(|| Duration::from_secs(self.fetch_config.timeout_seconds));
        let calendar = self
            .calendar
            .map(|config| EventCalendar::new(Arc::clone(&source), config, fetch_timeout));
        let aggregator = FeedAggregator::new(source, &self.fetch_config).with_timeout(fetch_timeout);

        Ok(SignalPipeline {
            feeds: self.feeds,
            aggregator,
            corpus_config: self.corpus_config,
            classifier: SentimentClassifier::new(adapter, self.classifier_options),
            formatter: EmailFormatter::new(self.recipient).with_display_offset(self.display_offset),
            sink,
            calendar,
            delivery_timeout: self.delivery_timeout,
        })
    }
}
