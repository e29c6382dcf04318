use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, warn};

use crate::{LlmError, ProviderKind};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// One prompt, optionally with a system message.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ChatRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            temperature: 0.7,
            max_tokens: 4000,
        }
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    fn provider(&self) -> ProviderKind;

    /// Text of the first completion choice.
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError>;
}

/// Attempts per request and the linear backoff step between them.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            step: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    async fn run<F, Fut>(&self, provider: ProviderKind, mut call: F) -> Result<String, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<String, LlmError>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match call().await {
                Err(err) if err.is_retryable() && attempt < attempts => {
                    let delay = self.step.saturating_mul(attempt);
                    warn!(%provider, attempt, error = %err, ?delay, "retrying AI request");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

fn build_http() -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .map_err(|e| LlmError::Config(format!("building HTTP client: {e}")))
}

/// Non-2xx response body -> typed error, recognising exhausted credits.
fn error_from_response(status: u16, body: &str) -> LlmError {
    let message = serde_json::from_str::<JsonValue>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.chars().take(300).collect());
    let lowered = body.to_ascii_lowercase();
    let credit_markers = ["insufficient_quota", "quota", "credit", "billing", "payment required"];
    if status == 402 || status == 429 || credit_markers.iter().any(|m| lowered.contains(m)) {
        LlmError::CreditsExhausted(format!("{status}: {message}"))
    } else {
        LlmError::Api { status, message }
    }
}

async fn post_json(request: reqwest::RequestBuilder, body: &JsonValue) -> Result<JsonValue, LlmError> {
    let response = request
        .header(header::CONTENT_TYPE, "application/json")
        .json(body)
        .send()
        .await
        .map_err(|e| LlmError::Network(e.to_string()))?;
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| LlmError::Network(e.to_string()))?;
    if !status.is_success() {
        return Err(error_from_response(status.as_u16(), &text));
    }
    serde_json::from_str(&text).map_err(|e| LlmError::Parse(format!("invalid response body: {e}")))
}

/// `/chat/completions` with bearer auth; serves DeepSeek and OpenAI.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    kind: ProviderKind,
    api_key: String,
    base_url: String,
    model: String,
    retry: RetryPolicy,
}

impl OpenAiCompatibleClient {
    pub fn new(kind: ProviderKind, api_key: impl Into<String>) -> Result<Self, LlmError> {
        Ok(Self {
            http: build_http()?,
            kind,
            api_key: api_key.into(),
            base_url: kind.default_base_url().to_string(),
            model: kind.default_model().to_string(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn send_once(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": request.prompt}));
        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let http = self
            .http
            .post(url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key));
        let value = post_json(http, &body).await?;
        value["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LlmError::Parse("response has no choices[0].message.content".to_string()))
    }
}

#[async_trait]
impl ChatClient for OpenAiCompatibleClient {
    fn provider(&self) -> ProviderKind {
        self.kind
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        debug!(provider = %self.kind, model = %self.model, chars = request.prompt.len(), "chat completion");
        self.retry.run(self.kind, || self.send_once(request)).await
    }
}

/// Anthropic Messages API.
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    retry: RetryPolicy,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, LlmError> {
        Ok(Self {
            http: build_http()?,
            api_key: api_key.into(),
            base_url: ProviderKind::Claude.default_base_url().to_string(),
            model: ProviderKind::Claude.default_model().to_string(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn send_once(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let mut body = json!({
            "model": self.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": [{"role": "user", "content": request.prompt}],
        });
        if let Some(system) = &request.system {
            body["system"] = JsonValue::String(system.clone());
        }

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let http = self
            .http
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION);
        let value = post_json(http, &body).await?;
        value["content"]
            .as_array()
            .and_then(|blocks| blocks.iter().find_map(|b| b["text"].as_str()))
            .map(str::to_string)
            .ok_or_else(|| LlmError::Parse("response has no text content block".to_string()))
    }
}

#[async_trait]
impl ChatClient for AnthropicClient {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Claude
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        debug!(provider = "claude", model = %self.model, chars = request.prompt.len(), "chat completion");
        self.retry.run(ProviderKind::Claude, || self.send_once(request)).await
    }
}
