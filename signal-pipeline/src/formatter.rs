use crate::types::{EmailPayload, SentimentSignal, SignalOrigin, SourceWarning};
use askama::Template;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use tracing::error;

/// Run facts shown next to the signal.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub news_count: usize,
    pub sources_ok: usize,
    pub sources_total: usize,
    /// `None` when no economic calendar was consulted.
    pub event_count: Option<usize>,
    pub event_horizon_hours: i64,
    pub warnings: Vec<SourceWarning>,
}

#[derive(Template)]
#[template(path = "signal.html")]
struct SignalEmail<'a> {
    accent: &'static str,
    stance: &'static str,
    score: String,
    gauge_position: i32,
    degraded_note: Option<String>,
    generated: String,
    news_count: usize,
    sources_ok: usize,
    sources_total: usize,
    events_label: Option<String>,
    rationale_lines: Vec<&'a str>,
    parse_notes: Vec<String>,
    warnings: Vec<String>,
}

#[derive(Template)]
#[template(path = "failure.html")]
struct FailureEmail<'a> {
    time: String,
    stage: &'a str,
    error: &'a str,
}

/// Renders signals into email payloads. Rendering never fails.
pub struct EmailFormatter {
    recipient: String,
    display_offset: FixedOffset,
}

impl EmailFormatter {
    pub fn new(recipient: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            display_offset: Utc.fix(),
        }
    }

    /// All timestamps are shown in this one offset.
    pub fn with_display_offset(mut self, offset: FixedOffset) -> Self {
        self.display_offset = offset;
        self
    }

    pub fn subject(&self, signal: &SentimentSignal) -> String {
        let mut subject = format!(
            "Sentiment Signal — {} ({}) — {}",
            signal.stance.label(),
            signed_score(signal.score),
            self.display_date(signal.generated_at)
        );
        if signal.is_degraded() {
            subject.push_str(" — no data");
        }
        subject
    }

    pub fn render(&self, signal: &SentimentSignal, context: &RunContext) -> EmailPayload {
        let subject = self.subject(signal);

        let degraded_note = match &signal.origin {
            SignalOrigin::NoData(reason) => {
                Some(format!("{} The model was not consulted.", reason.explanation()))
            }
            SignalOrigin::Model => None,
        };

        let template = SignalEmail {
            accent: signal.stance.accent_color(),
            stance: signal.stance.label(),
            score: signed_score(signal.score),
            gauge_position: gauge_position(signal.score),
            degraded_note,
            generated: self.display_time(signal.generated_at),
            news_count: context.news_count,
            sources_ok: context.sources_ok,
            sources_total: context.sources_total,
            events_label: context
                .event_count
                .map(|count| format!("events(next {}h)={}", context.event_horizon_hours, count)),
            rationale_lines: signal.rationale.trim().lines().collect(),
            parse_notes: signal.anomalies.iter().map(ToString::to_string).collect(),
            warnings: context.warnings.iter().map(ToString::to_string).collect(),
        };

        EmailPayload {
            html_body: render_or_fallback(&template, &subject),
            subject,
            recipient: self.recipient.clone(),
        }
    }

    /// Minimal notice sent when a run fails after startup.
    pub fn render_failure(&self, stage: &str, error: &str, at: DateTime<Utc>) -> EmailPayload {
        let subject = format!("Sentiment Signal — FAILED — {}", self.display_date(at));
        let error = match error.trim() {
            "" => "unknown error",
            text => text,
        };

        let template = FailureEmail {
            time: self.display_time(at),
            stage,
            error,
        };

        EmailPayload {
            html_body: render_or_fallback(&template, &subject),
            subject,
            recipient: self.recipient.clone(),
        }
    }

    fn display_date(&self, at: DateTime<Utc>) -> String {
        at.with_timezone(&self.display_offset).format("%Y-%m-%d").to_string()
    }

    fn display_time(&self, at: DateTime<Utc>) -> String {
        let local = at.with_timezone(&self.display_offset);
        let zone = if self.display_offset.local_minus_utc() == 0 {
            "UTC".to_string()
        } else {
            format!("UTC{}", self.display_offset)
        };
        format!("{} {}", local.format("%Y-%m-%d %H:%M"), zone)
    }
}

/// The subject carries no feed or model text, so it is safe to inline.
fn render_or_fallback<T: Template>(template: &T, subject: &str) -> String {
    match template.render() {
        Ok(html) => html,
        Err(e) => {
            error!("Template render error: {}", e);
            format!("<html>\n<body>\n<p>{}</p>\n</body>\n</html>\n", subject)
        }
    }
}

/// `+35`, `-42`, `0`
pub fn signed_score(score: i32) -> String {
    if score > 0 {
        format!("+{}", score)
    } else {
        score.to_string()
    }
}

/// Percent offset of the score marker on the -100..+100 bar.
fn gauge_position(score: i32) -> i32 {
    (score.clamp(-100, 100) + 100) / 2
}
