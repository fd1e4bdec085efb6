use crate::types::{EmailPayload, Result};
use async_trait::async_trait;

/// Capability for retrieving a raw feed document.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the document at `url` and return its body.
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Outbound delivery of the finished email.
#[async_trait]
pub trait MailSink: Send + Sync {
    /// Human-readable name used in logs
    fn sink_name(&self) -> String;

    /// Attempt delivery once. Errors are final for the current run.
    async fn deliver(&self, payload: &EmailPayload) -> Result<()>;
}
