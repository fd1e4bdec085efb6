use anyhow::Context;
use clap::Parser;
use signal_pipeline::{
    AppConfig, HttpFetcher, MailSink, OpenAiAdapter, PipelineBuilder, SignalPipeline, SmtpMailer,
    StdoutMailSink,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

/// Exit status for problems found before the pipeline starts.
const CONFIG_ERROR_EXIT: u8 = 2;

#[derive(Parser)]
#[command(name = "sentiment-signal")]
#[command(about = "Classify today's market headlines and email the sentiment signal")]
struct Cli {
    /// Print the email to stdout instead of sending it
    #[arg(long)]
    dry_run: bool,

    /// Read environment variables from this file instead of ./.env
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,

    /// Replace the configured feeds (repeatable)
    #[arg(long = "feed", value_name = "NAME=URL")]
    feeds: Vec<String>,

    /// Character budget for the headline corpus
    #[arg(long, value_name = "CHARS")]
    max_chars: Option<usize>,

    /// Do not fetch the economic calendar
    #[arg(long)]
    no_events: bool,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Load before the subscriber so RUST_LOG from the file applies
    let env_loaded = load_env_file(cli.env_file.as_ref());
    init_tracing(cli.verbose);

    let pipeline = match env_loaded.and_then(|_| build_pipeline(&cli)) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("Startup failed: {:#}", e);
            return ExitCode::from(CONFIG_ERROR_EXIT);
        }
    };

    let report = pipeline.run().await;
    info!(
        "Run {} finished in state {} (diagnostic sent: {})",
        report.run_id, report.state, report.diagnostic_sent
    );
    if let Some(err) = &report.error {
        error!("Run {} failed: {}", report.run_id, err);
    }

    ExitCode::from(report.exit_code() as u8)
}

fn load_env_file(path: Option<&PathBuf>) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("could not load env file {}", path.display()))?;
        }
        None => {
            // A missing ./.env is normal in scheduled environments
            dotenvy::dotenv().ok();
        }
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn build_pipeline(cli: &Cli) -> anyhow::Result<SignalPipeline> {
    let mut config = AppConfig::from_env(!cli.dry_run)
        .context("invalid configuration")?
        .with_feed_overrides(&cli.feeds)
        .context("invalid --feed value")?;
    if let Some(max_chars) = cli.max_chars {
        config = config.with_max_chars(max_chars).context("invalid --max-chars value")?;
    }
    if cli.no_events {
        config = config.without_events();
    }

    info!(
        "Configured {} feeds, model {}, corpus budget {} chars, calendar {}",
        config.feeds.len(),
        config.llm.model,
        config.corpus.max_chars,
        config.calendar.as_ref().map_or("off", |c| c.url.as_str())
    );

    let fetcher = HttpFetcher::new(config.fetch.clone()).context("could not build HTTP client")?;
    let adapter = OpenAiAdapter::new(config.llm.api_key.clone(), &config.llm.base_url, config.llm.timeout)
        .context("could not build model client")?;

    let sink: Arc<dyn MailSink> = match (&config.smtp, cli.dry_run) {
        (Some(smtp), false) => Arc::new(SmtpMailer::new(smtp).context("could not build SMTP transport")?),
        _ => {
            info!("Dry run: the email will be printed, not sent");
            Arc::new(StdoutMailSink)
        }
    };

    PipelineBuilder::from_config(&config)
        .feed_source(Arc::new(fetcher))
        .llm_adapter(Arc::new(adapter))
        .mail_sink(sink)
        .build()
        .context("could not assemble pipeline")
}
