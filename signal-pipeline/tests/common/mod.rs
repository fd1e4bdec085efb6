#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use signal_pipeline::{EmailPayload, FeedSource, FeedSpec, MailSink, NewsItem, Result, SignalError};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .try_init()
            .ok();
    });
}

/// Reference clock for every test: 2026-10-15 14:00 UTC.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 15, 14, 0, 0).unwrap()
}

pub fn hours_ago(hours: i64) -> DateTime<Utc> {
    fixed_now() - chrono::Duration::hours(hours)
}

pub fn news_item(title: &str, source: &str, published_at: Option<DateTime<Utc>>) -> NewsItem {
    NewsItem {
        title: title.to_string(),
        summary: String::new(),
        source: source.to_string(),
        published_at,
    }
}

/// One RSS `<item>`.
pub struct Entry {
    pub title: String,
    pub description: String,
    pub published: Option<DateTime<Utc>>,
}

impl Entry {
    pub fn new(title: &str, description: &str, published: Option<DateTime<Utc>>) -> Self {
        Self {
            title: title.to_string(),
            description: description.to_string(),
            published,
        }
    }
}

/// Minimal RSS 2.0 document. Descriptions go into CDATA so they may carry markup.
pub fn rss_document(channel: &str, entries: &[Entry]) -> String {
    let mut xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<rss version=\"2.0\">\n<channel>\n\
         <title>{channel}</title>\n<link>https://example.com/</link>\n<description>{channel} feed</description>\n"
    );
    for (i, entry) in entries.iter().enumerate() {
        xml.push_str("<item>\n");
        xml.push_str(&format!("<title>{}</title>\n", entry.title));
        xml.push_str(&format!("<link>https://example.com/{}/{}</link>\n", channel, i));
        xml.push_str(&format!("<guid>https://example.com/{}/{}</guid>\n", channel, i));
        xml.push_str(&format!("<description><![CDATA[{}]]></description>\n", entry.description));
        if let Some(published) = entry.published {
            xml.push_str(&format!("<pubDate>{}</pubDate>\n", published.to_rfc2822()));
        }
        xml.push_str("</item>\n");
    }
    xml.push_str("</channel>\n</rss>\n");
    xml
}

/// Minimal Atom document whose entries carry only `<content>`, no `<summary>`.
pub fn atom_document(entries: &[Entry]) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<feed xmlns=\"http://www.w3.org/2005/Atom\">\n\
         <title>Atom Markets</title>\n<id>urn:uuid:60a76c80-d399-11d9-b93c-0003939e0af6</id>\n\
         <updated>2026-10-15T12:00:00Z</updated>\n",
    );
    for (i, entry) in entries.iter().enumerate() {
        xml.push_str("<entry>\n");
        xml.push_str(&format!("<title>{}</title>\n", entry.title));
        xml.push_str(&format!("<id>urn:entry:{}</id>\n", i));
        if let Some(published) = entry.published {
            xml.push_str(&format!("<updated>{}</updated>\n", published.to_rfc3339()));
        }
        xml.push_str(&format!(
            "<content type=\"html\"><![CDATA[{}]]></content>\n",
            entry.description
        ));
        xml.push_str("</entry>\n");
    }
    xml.push_str("</feed>\n");
    xml
}

/// A small feed with recent, distinct headlines.
pub fn market_rss(channel: &str, titles: &[&str]) -> String {
    let entries: Vec<Entry> = titles
        .iter()
        .enumerate()
        .map(|(i, title)| Entry::new(title, "Markets moved today.", Some(hours_ago(i as i64 + 1))))
        .collect();
    rss_document(channel, &entries)
}

pub fn feed(name: &str) -> FeedSpec {
    FeedSpec::new(name, format!("https://{}.example.com/rss", name.to_lowercase()))
}

enum Canned {
    Document(String),
    Status(u16),
    Hang,
}

/// In-memory feed source keyed by URL. Unknown URLs answer 404.
#[derive(Default)]
pub struct CannedFeedSource {
    responses: HashMap<String, Canned>,
    calls: AtomicUsize,
}

impl CannedFeedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, spec: &FeedSpec, document: impl Into<String>) -> Self {
        self.responses.insert(spec.url.clone(), Canned::Document(document.into()));
        self
    }

    /// Serve a document at a URL that is not a configured feed.
    pub fn with_url_document(mut self, url: &str, document: impl Into<String>) -> Self {
        self.responses.insert(url.to_string(), Canned::Document(document.into()));
        self
    }

    pub fn with_status(mut self, spec: &FeedSpec, status: u16) -> Self {
        self.responses.insert(spec.url.clone(), Canned::Status(status));
        self
    }

    pub fn hanging(mut self, spec: &FeedSpec) -> Self {
        self.responses.insert(spec.url.clone(), Canned::Hang);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FeedSource for CannedFeedSource {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.responses.get(url) {
            Some(Canned::Document(doc)) => Ok(doc.clone()),
            Some(Canned::Status(status)) => Err(SignalError::FeedStatus { status: *status }),
            Some(Canned::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(SignalError::FeedStatus { status: 504 })
            }
            None => Err(SignalError::FeedStatus { status: 404 }),
        }
    }
}

/// Rejects every delivery and counts the attempts.
#[derive(Clone, Default)]
pub struct FailingMailSink {
    attempts: Arc<AtomicUsize>,
}

impl FailingMailSink {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailSink for FailingMailSink {
    fn sink_name(&self) -> String {
        "failing".to_string()
    }

    async fn deliver(&self, _payload: &EmailPayload) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(SignalError::Delivery("535 authentication rejected".to_string()))
    }
}

/// Never finishes a delivery.
#[derive(Clone, Default)]
pub struct StalledMailSink {
    attempts: Arc<AtomicUsize>,
    delivered: Arc<Mutex<Vec<EmailPayload>>>,
}

impl StalledMailSink {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailSink for StalledMailSink {
    fn sink_name(&self) -> String {
        "stalled".to_string()
    }

    async fn deliver(&self, payload: &EmailPayload) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(3600)).await;
        self.delivered.lock().unwrap().push(payload.clone());
        Ok(())
    }
}

/// Local HTTP/1.1 server answering every request with one canned response.
pub struct CannedHttpServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
}

impl CannedHttpServer {
    pub async fn start(status: u16, body: impl Into<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let body = Arc::new(body.into());

        let recorded = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let body = Arc::clone(&body);
                let recorded = Arc::clone(&recorded);
                tokio::spawn(async move {
                    let request = read_request(&mut stream).await;
                    recorded.lock().unwrap().push(request);
                    let head = format!(
                        "HTTP/1.1 {} Canned\r\nContent-Type: application/json\r\n\
                         Content-Length: {}\r\nConnection: close\r\n\r\n",
                        status,
                        body.len()
                    );
                    // The client may hang up early, e.g. after an oversized Content-Length
                    let _ = stream.write_all(head.as_bytes()).await;
                    let _ = stream.write_all(body.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        Self { addr, requests }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Raw request text (head and body) in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

async fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let mut expected: Option<usize> = None;

    loop {
        if let Some(total) = expected {
            if buf.len() >= total {
                break;
            }
        } else if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let body_len = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            expected = Some(end + 4 + body_len);
            continue;
        }

        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }

    String::from_utf8_lossy(&buf).into_owned()
}
