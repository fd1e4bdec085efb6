use chrono::FixedOffset;
use secrecy::ExposeSecret;
use signal_pipeline::config::{DEFAULT_MODEL, DEFAULT_SMTP_PORT, DEFAULT_SMTP_SERVER};
use signal_pipeline::events::FOREX_FACTORY_CALENDAR_URL;
use signal_pipeline::sources::{default_market_feeds, parse_feed_list};
use signal_pipeline::{AppConfig, FeedSpec, PipelineBuilder, SignalError};
use std::collections::HashMap;
use tokio_test::{assert_err, assert_ok};

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    move |key: &str| vars.get(key).cloned()
}

fn config_var(err: SignalError) -> String {
    match err {
        SignalError::Config { var, .. } => var,
        other => panic!("expected a configuration error, got {}", other),
    }
}

const MAIL_VARS: [(&str, &str); 4] = [
    ("OPENAI_API_KEY", "sk-test"),
    ("EMAIL_FROM", "bot@example.com"),
    ("EMAIL_PASSWORD", "app-password"),
    ("EMAIL_TO", "desk@example.com"),
];

#[test]
fn test_dry_run_needs_only_api_key() {
    let config = assert_ok!(AppConfig::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-test")]), false));

    assert_eq!(config.llm.api_key.expose_secret(), "sk-test");
    assert_eq!(config.llm.model, DEFAULT_MODEL);
    assert_eq!(config.llm.base_url, "https://api.openai.com/v1");
    assert!((config.llm.temperature - 0.3).abs() < f32::EPSILON);
    assert!(config.smtp.is_none());
    assert_eq!(config.recipient, "dry-run@localhost");
    assert_eq!(config.feeds, default_market_feeds());
    assert_eq!(config.fetch.max_items_per_feed, 20);
    assert_eq!(config.corpus.max_chars, 8000);
    assert_eq!(config.corpus.max_age, Some(chrono::Duration::hours(24)));
    assert_eq!(config.display_offset, FixedOffset::east_opt(0).unwrap());
}

#[test]
fn test_missing_api_key_is_fatal() {
    let err = assert_err!(AppConfig::from_lookup(lookup(&[]), false));
    assert_eq!(config_var(err), "OPENAI_API_KEY");

    let blank = assert_err!(AppConfig::from_lookup(lookup(&[("OPENAI_API_KEY", "   ")]), false));
    assert_eq!(config_var(blank), "OPENAI_API_KEY");
}

#[test]
fn test_mail_settings_required_when_sending() {
    let err = assert_err!(AppConfig::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-test")]), true));
    assert_eq!(config_var(err), "EMAIL_FROM");

    let err = assert_err!(AppConfig::from_lookup(lookup(&MAIL_VARS[..3]), true));
    assert_eq!(config_var(err), "EMAIL_TO");

    let config = assert_ok!(AppConfig::from_lookup(lookup(&MAIL_VARS), true));
    let smtp = config.smtp.unwrap();
    assert_eq!(smtp.host, DEFAULT_SMTP_SERVER);
    assert_eq!(smtp.port, DEFAULT_SMTP_PORT);
    assert_eq!(smtp.username, "bot@example.com");
    assert_eq!(smtp.sender, "bot@example.com");
    assert_eq!(smtp.password.expose_secret(), "app-password");
    assert_eq!(config.recipient, "desk@example.com");
}

#[test]
fn test_overrides_from_environment() {
    let mut vars = MAIL_VARS.to_vec();
    vars.extend([
        ("OPENAI_MODEL", "gpt-4o"),
        ("SMTP_SERVER", "smtp.example.com"),
        ("SMTP_PORT", "465"),
        ("SMTP_USERNAME", "relay-user"),
        ("SIGNAL_FEEDS", "Reuters=https://feeds.example.com/reuters, https://news.example.org/markets.xml,"),
        ("SIGNAL_CORPUS_MAX_CHARS", "4000"),
        ("SIGNAL_MAX_AGE_HOURS", "0"),
        ("SIGNAL_DISPLAY_UTC_OFFSET_MINUTES", "-300"),
    ]);

    let config = assert_ok!(AppConfig::from_lookup(lookup(&vars), true));

    assert_eq!(config.llm.model, "gpt-4o");
    let smtp = config.smtp.as_ref().unwrap();
    assert_eq!(smtp.host, "smtp.example.com");
    assert_eq!(smtp.port, 465);
    assert_eq!(smtp.username, "relay-user");
    assert_eq!(
        config.feeds,
        vec![
            FeedSpec::new("Reuters", "https://feeds.example.com/reuters"),
            FeedSpec::new("news.example.org", "https://news.example.org/markets.xml"),
        ]
    );
    assert_eq!(config.corpus.max_chars, 4000);
    assert_eq!(config.corpus.max_age, None);
    assert_eq!(config.display_offset, FixedOffset::west_opt(5 * 3600).unwrap());
}

#[test]
fn test_malformed_values_are_rejected() {
    let cases = [
        ("SMTP_PORT", "not-a-port"),
        ("SIGNAL_MODEL_TEMPERATURE", "3.5"),
        ("SIGNAL_CORPUS_MAX_CHARS", "10"),
        ("SIGNAL_DISPLAY_UTC_OFFSET_MINUTES", "100000"),
        ("SIGNAL_MAX_AGE_HOURS", "9223372036854775807"),
        ("SIGNAL_FETCH_TIMEOUT_SECS", "0"),
        ("SIGNAL_MODEL_TIMEOUT_SECS", "0"),
        ("SIGNAL_SMTP_TIMEOUT_SECS", "0"),
        ("SIGNAL_EVENTS_URL", "file:///tmp/calendar.json"),
        ("SIGNAL_EVENTS_HORIZON_HOURS", "0"),
        ("SIGNAL_MAX_EVENTS", "many"),
    ];

    for (var, value) in cases {
        let mut vars = MAIL_VARS.to_vec();
        vars.push((var, value));
        let err = assert_err!(AppConfig::from_lookup(lookup(&vars), true));
        assert_eq!(config_var(err), var);
    }

    let mut vars = MAIL_VARS.to_vec();
    vars.push(("SIGNAL_FEEDS", "ftp://example.com/feed"));
    let err = assert_err!(AppConfig::from_lookup(lookup(&vars), true));
    assert_eq!(config_var(err), "feed");
}

#[test]
fn test_calendar_settings() {
    let config = assert_ok!(AppConfig::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-test")]), false));
    let calendar = config.calendar.clone().unwrap();
    assert_eq!(calendar.url, FOREX_FACTORY_CALENDAR_URL);
    assert_eq!(calendar.horizon_hours(), 16);
    assert_eq!(calendar.max_events, 5);
    assert!(config.without_events().calendar.is_none());

    let config = assert_ok!(AppConfig::from_lookup(
        lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("SIGNAL_EVENTS_URL", "https://calendar.example.com/week.json"),
            ("SIGNAL_EVENTS_HORIZON_HOURS", "8"),
            ("SIGNAL_MAX_EVENTS", "3"),
        ]),
        false
    ));
    let calendar = config.calendar.unwrap();
    assert_eq!(calendar.url, "https://calendar.example.com/week.json");
    assert_eq!(calendar.horizon_hours(), 8);
    assert_eq!(calendar.max_events, 3);

    for disabled in ["off", "NONE"] {
        let config = assert_ok!(AppConfig::from_lookup(
            lookup(&[("OPENAI_API_KEY", "sk-test"), ("SIGNAL_EVENTS_URL", disabled)]),
            false
        ));
        assert!(config.calendar.is_none());
    }
}

#[test]
fn test_command_line_overrides() {
    let config = assert_ok!(AppConfig::from_lookup(lookup(&[("OPENAI_API_KEY", "sk-test")]), false));

    let config = assert_ok!(config.with_feed_overrides(&["Local=http://localhost:8080/rss".to_string()]));
    assert_eq!(config.feeds, vec![FeedSpec::new("Local", "http://localhost:8080/rss")]);

    let config = assert_ok!(config.with_feed_overrides(&[]));
    assert_eq!(config.feeds.len(), 1);

    let config = assert_ok!(config.with_max_chars(2000));
    assert_eq!(config.corpus.max_chars, 2000);

    let err = assert_err!(config.clone().with_max_chars(5));
    assert_eq!(config_var(err), "--max-chars");

    let err = assert_err!(config.with_feed_overrides(&["=https://example.com/rss".to_string()]));
    assert_eq!(config_var(err), "feed");
}

#[test]
fn test_builder_takes_settings_from_config() {
    let config = assert_ok!(AppConfig::from_lookup(lookup(&MAIL_VARS), true));
    // Capabilities are still missing
    assert!(PipelineBuilder::from_config(&config).build().is_err());
}

#[test]
fn test_feed_specs() {
    let feeds = default_market_feeds();
    assert_eq!(feeds.len(), 3);
    assert_eq!(feeds[0], FeedSpec::cnbc());
    assert_eq!(feeds[0].url, "https://www.cnbc.com/id/100003114/device/rss/rss.html");
    assert_eq!(feeds[1].url, "https://feeds.marketwatch.com/marketwatch/topstories");

    let spec: FeedSpec = assert_ok!("WSJ = https://feeds.a.dj.com/rss/RSSMarketsMain.xml".parse());
    assert_eq!(spec, FeedSpec::new("WSJ", FeedSpec::wsj_markets().url));
    assert_eq!(spec.to_string(), "WSJ=https://feeds.a.dj.com/rss/RSSMarketsMain.xml");

    let with_query: FeedSpec = assert_ok!("https://example.com/rss?section=markets".parse());
    assert_eq!(with_query.name, "example.com");
    assert_eq!(with_query.url, "https://example.com/rss?section=markets");

    assert!(parse_feed_list(" , ").unwrap().is_empty());
    assert!("Broken=not a url".parse::<FeedSpec>().is_err());
}
