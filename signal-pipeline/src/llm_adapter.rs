use crate::rss_utils::text::truncate_chars;
use crate::types::{Result, SignalError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

/// Single-shot prompt for a chat-style model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
}

/// Trait for LLM backends that turn a prompt into free-form text
#[async_trait]
pub trait LlmAdapter: Send + Sync {
    /// Get the name of this LLM adapter
    fn adapter_name(&self) -> String;

    /// Run one completion. Any error here is fatal for the run: there is no
    /// model output to fall back on.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
pub struct OpenAiAdapter {
    client: Client,
    base_url: String,
    api_key: SecretString,
}

impl OpenAiAdapter {
    pub fn new(api_key: SecretString, base_url: &str, timeout: Duration) -> Result<Self> {
        url::Url::parse(base_url)?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl LlmAdapter for OpenAiAdapter {
    fn adapter_name(&self) -> String {
        format!("OpenAI-compatible ({})", self.base_url)
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = ChatCompletionRequest {
            model: &request.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: request.temperature,
        };

        debug!("Requesting completion from {} (model {})", self.endpoint(), request.model);

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SignalError::ModelAuth { status: status.as_u16() });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(SignalError::ModelStatus {
                status: status.as_u16(),
                body: truncate_chars(text.trim(), 200).to_string(),
            });
        }

        let raw = response.text().await?;
        let parsed: ChatCompletionResponse = serde_json::from_str(&raw)?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(SignalError::EmptyCompletion)?;

        info!("Received completion ({} chars)", content.len());
        Ok(content)
    }
}

#[derive(Debug, Clone)]
enum MockBehavior {
    Reply(String),
    AuthFailure,
    StatusFailure(u16),
    Empty,
}

/// Mock LLM adapter for development and testing
pub struct MockLlmAdapter {
    name: String,
    behavior: MockBehavior,
    response_delay_ms: u64,
    calls: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl MockLlmAdapter {
    pub fn new(name: String) -> Self {
        Self {
            name,
            behavior: MockBehavior::Reply(
                "STANCE: NEUTRAL\nSCORE: 0\nRATIONALE: Mock adapter reply.".to_string(),
            ),
            response_delay_ms: 0,
            calls: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_response(mut self, text: impl Into<String>) -> Self {
        self.behavior = MockBehavior::Reply(text.into());
        self
    }

    /// Reject every call as unauthorized.
    pub fn failing_auth(mut self) -> Self {
        self.behavior = MockBehavior::AuthFailure;
        self
    }

    pub fn failing_status(mut self, status: u16) -> Self {
        self.behavior = MockBehavior::StatusFailure(status);
        self
    }

    /// Answer with an empty completion.
    pub fn empty(mut self) -> Self {
        self.behavior = MockBehavior::Empty;
        self
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.response_delay_ms = delay_ms;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().ok()?.last().cloned()
    }
}

#[async_trait]
impl LlmAdapter for MockLlmAdapter {
    fn adapter_name(&self) -> String {
        format!("Mock LLM Adapter ({})", self.name)
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if self.response_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.response_delay_ms)).await;
        }

        match &self.behavior {
            MockBehavior::Reply(text) => Ok(text.clone()),
            MockBehavior::AuthFailure => Err(SignalError::ModelAuth { status: 401 }),
            MockBehavior::StatusFailure(status) => Err(SignalError::ModelStatus {
                status: *status,
                body: "mock failure".to_string(),
            }),
            MockBehavior::Empty => Err(SignalError::EmptyCompletion),
        }
    }
}
