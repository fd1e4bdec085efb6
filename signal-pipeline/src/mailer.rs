use crate::config::SmtpConfig;
use crate::traits::MailSink;
use crate::types::{EmailPayload, Result, SignalError};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::ExposeSecret;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Port that speaks TLS from the first byte instead of upgrading with STARTTLS.
const IMPLICIT_TLS_PORT: u16 = 465;

/// SMTP delivery through lettre's blocking transport.
pub struct SmtpMailer {
    transport: SmtpTransport,
    sender: Mailbox,
    host: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let sender: Mailbox = config
            .sender
            .parse()
            .map_err(|e| SignalError::invalid_config("EMAIL_FROM", format!("invalid address: {}", e)))?;

        let builder = if config.port == IMPLICIT_TLS_PORT {
            SmtpTransport::relay(&config.host)
        } else {
            SmtpTransport::starttls_relay(&config.host)
        }
        .map_err(|e| SignalError::invalid_config("SMTP_SERVER", e.to_string()))?;

        let credentials = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );

        let transport = builder
            .port(config.port)
            .credentials(credentials)
            .timeout(Some(config.timeout))
            .build();

        Ok(Self {
            transport,
            sender,
            host: config.host.clone(),
        })
    }

    fn build_message(&self, payload: &EmailPayload) -> Result<Message> {
        let recipient: Mailbox = payload
            .recipient
            .parse()
            .map_err(|e| SignalError::Delivery(format!("invalid recipient address: {}", e)))?;

        Message::builder()
            .from(self.sender.clone())
            .to(recipient)
            .subject(payload.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(payload.html_body.clone())
            .map_err(|e| SignalError::Delivery(format!("failed to build email: {}", e)))
    }
}

#[async_trait]
impl MailSink for SmtpMailer {
    fn sink_name(&self) -> String {
        format!("smtp://{}", self.host)
    }

    async fn deliver(&self, payload: &EmailPayload) -> Result<()> {
        let message = self.build_message(payload)?;
        let transport = self.transport.clone();

        debug!("Sending '{}' via {}", payload.subject, self.host);
        tokio::task::spawn_blocking(move || transport.send(&message))
            .await
            .map_err(|e| SignalError::Delivery(format!("SMTP task failed: {}", e)))?
            .map_err(|e| SignalError::Delivery(format!("SMTP send failed: {}", e)))?;

        info!("Email sent to {}", payload.recipient);
        Ok(())
    }
}

/// Keeps delivered payloads in memory. Clones share the same mailbox.
#[derive(Clone, Default)]
pub struct MemoryMailSink {
    delivered: Arc<Mutex<Vec<EmailPayload>>>,
}

impl MemoryMailSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered(&self) -> Vec<EmailPayload> {
        self.delivered.lock().map(|d| d.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl MailSink for MemoryMailSink {
    fn sink_name(&self) -> String {
        "memory".to_string()
    }

    async fn deliver(&self, payload: &EmailPayload) -> Result<()> {
        self.delivered
            .lock()
            .map_err(|_| SignalError::Delivery("memory sink poisoned".to_string()))?
            .push(payload.clone());
        Ok(())
    }
}

/// Prints the email instead of sending it (`--dry-run`).
pub struct StdoutMailSink;

#[async_trait]
impl MailSink for StdoutMailSink {
    fn sink_name(&self) -> String {
        "stdout".to_string()
    }

    async fn deliver(&self, payload: &EmailPayload) -> Result<()> {
        println!("To: {}", payload.recipient);
        println!("Subject: {}", payload.subject);
        println!();
        println!("{}", payload.html_body);
        Ok(())
    }
}
