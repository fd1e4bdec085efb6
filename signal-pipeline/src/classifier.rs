use crate::events::render_event;
use crate::llm_adapter::{CompletionRequest, LlmAdapter};
use crate::types::{
    Corpus, EconomicEvent, ParseAnomaly, Result, SentimentSignal, SignalError, SignalOrigin, Stance,
};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{info, warn};

pub const NO_RATIONALE_PLACEHOLDER: &str = "(the model did not provide a rationale)";

/// Beyond this distance from zero a score contradicts the opposite stance.
const CONSISTENCY_TOLERANCE: i32 = 10;

const SYSTEM_PROMPT: &str = "You are an expert financial market analyst. You read recent news \
headlines and classify the aggregate sentiment of financial markets. You always answer in the \
exact format requested, without any other text.";

#[derive(Debug, Clone)]
pub struct ClassifierOptions {
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for ClassifierOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Asks the model for a stance/score/rationale triple and validates the reply.
pub struct SentimentClassifier {
    adapter: Arc<dyn LlmAdapter>,
    options: ClassifierOptions,
}

impl SentimentClassifier {
    pub fn new(adapter: Arc<dyn LlmAdapter>, options: ClassifierOptions) -> Self {
        Self { adapter, options }
    }

    /// `events` is `None` when no calendar is configured; the section is then left out.
    pub fn build_request(&self, corpus: &Corpus, events: Option<&[EconomicEvent]>) -> CompletionRequest {
        let mut prompt = format!(
            "Classify the aggregate financial-market sentiment expressed by the {} news items below.\n\n\
             Respond with exactly three lines and nothing else:\n\
             STANCE: <RISK-ON, RISK-OFF or NEUTRAL>\n\
             SCORE: <integer from -100 (maximum risk-off) to 100 (maximum risk-on)>\n\
             RATIONALE: <one or two sentences explaining the call>\n\n\
             News items:\n{}",
            corpus.len(),
            corpus.text
        );

        if let Some(events) = events {
            prompt.push_str(&format!("\nUpcoming high-impact economic events ({}):\n", events.len()));
            if events.is_empty() {
                prompt.push_str("None scheduled.\n");
            }
            for event in events {
                prompt.push_str(&render_event(event));
            }
        }

        CompletionRequest {
            model: self.options.model.clone(),
            system: SYSTEM_PROMPT.to_string(),
            prompt,
            temperature: self.options.temperature,
        }
    }

    pub async fn classify(&self, corpus: &Corpus, events: Option<&[EconomicEvent]>) -> Result<SentimentSignal> {
        self.classify_at(corpus, events, Utc::now()).await
    }

    /// Model errors propagate; a reply that cannot be parsed never does.
    pub async fn classify_at(
        &self,
        corpus: &Corpus,
        events: Option<&[EconomicEvent]>,
        generated_at: DateTime<Utc>,
    ) -> Result<SentimentSignal> {
        let request = self.build_request(corpus, events);
        info!(
            "Classifying {} items with {} (model {})",
            corpus.len(),
            self.adapter.adapter_name(),
            request.model
        );

        let reply = tokio::time::timeout(self.options.timeout, self.adapter.complete(&request))
            .await
            .map_err(|_| SignalError::Timeout {
                operation: "model completion".to_string(),
                seconds: self.options.timeout.as_secs(),
            })??;

        let signal = parse_response(&reply, generated_at);
        info!(
            "Classified: stance={} score={} anomalies={}",
            signal.stance,
            signal.score,
            signal.anomalies.len()
        );
        Ok(signal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Stance,
    Score,
    Rationale,
}

/// Read a model reply into a signal. Total: every input yields a valid stance
/// and an in-range score, with anything suspicious recorded as an anomaly.
pub fn parse_response(text: &str, generated_at: DateTime<Utc>) -> SentimentSignal {
    let mut stance_raw: Option<&str> = None;
    let mut score_raw: Option<&str> = None;
    let mut rationale_lines: Vec<&str> = Vec::new();
    let mut unlabeled: Vec<&str> = Vec::new();
    let mut in_rationale = false;

    for line in text.lines() {
        let line = line.trim();
        if line.starts_with("```") {
            continue;
        }

        match split_label(line) {
            Some((Field::Stance, value)) => {
                stance_raw.get_or_insert(value);
                in_rationale = false;
            }
            Some((Field::Score, value)) => {
                score_raw.get_or_insert(value);
                in_rationale = false;
            }
            Some((Field::Rationale, value)) => {
                in_rationale = true;
                if !value.is_empty() {
                    rationale_lines.push(value);
                }
            }
            None if line.is_empty() => {}
            None if in_rationale => rationale_lines.push(line),
            None => unlabeled.push(line),
        }
    }

    let mut anomalies = Vec::new();

    let stance = match stance_raw {
        None | Some("") => {
            anomalies.push(ParseAnomaly::MissingStance);
            Stance::Neutral
        }
        Some(raw) => match_stance(raw).unwrap_or_else(|| {
            anomalies.push(ParseAnomaly::UnrecognizedStance(raw.to_string()));
            Stance::Neutral
        }),
    };

    let score = match score_raw {
        None => {
            anomalies.push(ParseAnomaly::MissingScore);
            0
        }
        Some(raw) => {
            let (score, anomaly) = parse_score(raw);
            anomalies.extend(anomaly);
            score
        }
    };

    let rationale = if rationale_lines.is_empty() {
        unlabeled.join("\n")
    } else {
        rationale_lines.join("\n")
    };
    let rationale = match rationale.trim() {
        "" => {
            anomalies.push(ParseAnomaly::MissingRationale);
            NO_RATIONALE_PLACEHOLDER.to_string()
        }
        trimmed => trimmed.to_string(),
    };

    let inconsistent = match stance {
        Stance::RiskOn => score < -CONSISTENCY_TOLERANCE,
        Stance::RiskOff => score > CONSISTENCY_TOLERANCE,
        Stance::Neutral => false,
    };
    if inconsistent {
        anomalies.push(ParseAnomaly::Inconsistent { stance, score });
    }

    for anomaly in &anomalies {
        warn!("Parse anomaly: {}", anomaly);
    }

    SentimentSignal {
        stance,
        score,
        rationale,
        generated_at,
        anomalies,
        origin: SignalOrigin::Model,
    }
}

/// Recognize `STANCE: x`, `**Score:** x`, `- rationale: x` and similar.
fn split_label(line: &str) -> Option<(Field, &str)> {
    let (label, value) = line.split_once(':')?;
    let label = label.trim_matches(|c: char| matches!(c, '*' | '#' | '-' | '_') || c.is_whitespace());

    let field = match label.to_ascii_uppercase().as_str() {
        "STANCE" => Field::Stance,
        "SCORE" => Field::Score,
        "RATIONALE" => Field::Rationale,
        _ => return None,
    };

    let value = value.trim_matches(|c: char| c == '*' || c.is_whitespace());
    Some((field, value))
}

/// The value must open with a label; anything after it ("bias", "(moderate)",
/// ": strong") is a qualifier.
fn match_stance(raw: &str) -> Option<Stance> {
    let squashed: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_uppercase();

    [
        ("RISKOFF", Stance::RiskOff),
        ("RISKON", Stance::RiskOn),
        ("NEUTRAL", Stance::Neutral),
    ]
    .into_iter()
    .find(|(label, _)| squashed.starts_with(label))
    .map(|(_, stance)| stance)
}

fn score_token() -> &'static Regex {
    static SCORE_TOKEN: OnceLock<Regex> = OnceLock::new();
    SCORE_TOKEN.get_or_init(|| Regex::new(r"[+\-\u{2212}]?\d+").expect("score pattern is valid"))
}

fn parse_score(raw: &str) -> (i32, Option<ParseAnomaly>) {
    let Some(token) = score_token().find(raw) else {
        return (0, Some(ParseAnomaly::UnparseableScore(raw.to_string())));
    };

    let token = token.as_str().replace('\u{2212}', "-");
    let negative = token.starts_with('-');
    // Overlong digit runs saturate instead of failing
    let value = token
        .trim_start_matches('+')
        .parse::<i64>()
        .unwrap_or(if negative { i64::MIN } else { i64::MAX });

    let clamped = value.clamp(
        SentimentSignal::MIN_SCORE as i64,
        SentimentSignal::MAX_SCORE as i64,
    ) as i32;

    if clamped as i64 != value {
        return (clamped, Some(ParseAnomaly::ScoreClamped { raw: token, clamped }));
    }
    (clamped, None)
}
