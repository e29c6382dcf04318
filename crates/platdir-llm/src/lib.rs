//! Chat-completion providers and the directory tasks built on them.

mod client;
mod extract;
mod gate;
pub mod tasks;

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub use client::{
    AnthropicClient, ChatClient, ChatRequest, OpenAiCompatibleClient, RetryPolicy,
};
pub use extract::{
    extract_json_array, extract_json_array_lenient, extract_json_object, parse_json_array,
    parse_json_array_lenient, parse_json_object,
};
pub use gate::{ConfidenceGate, Confident, LowConfidence};

pub const CRATE_NAME: &str = "platdir-llm";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("api error {status}: {message}")]
    Api { status: u16, message: String },
    /// Quota, billing, or rate limits: stop the whole batch.
    #[error("API credits exhausted: {0}")]
    CreditsExhausted(String),
    #[error("parse error: {0}")]
    Parse(String),
}

impl LlmError {
    pub fn is_credits_exhausted(&self) -> bool {
        matches!(self, Self::CreditsExhausted(_))
    }

    pub(crate) fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    DeepSeek,
    Claude,
    OpenAi,
}

impl ProviderKind {
    pub fn default_model(self) -> &'static str {
        match self {
            Self::DeepSeek => "deepseek-chat",
            Self::Claude => "claude-3-5-sonnet-20241022",
            Self::OpenAi => "gpt-4-turbo-preview",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::DeepSeek => "https://api.deepseek.com/v1",
            Self::Claude => "https://api.anthropic.com",
            Self::OpenAi => "https://api.openai.com/v1",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DeepSeek => "deepseek",
            Self::Claude => "claude",
            Self::OpenAi => "openai",
        })
    }
}

/// `--provider` value: a specific provider or whichever has a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderSelection {
    #[default]
    Auto,
    Only(ProviderKind),
}

impl FromStr for ProviderSelection {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "auto" => Ok(Self::Auto),
            "deepseek" => Ok(Self::Only(ProviderKind::DeepSeek)),
            "claude" | "anthropic" => Ok(Self::Only(ProviderKind::Claude)),
            "gpt" | "openai" => Ok(Self::Only(ProviderKind::OpenAi)),
            other => Err(LlmError::Config(format!(
                "unknown provider `{other}` (expected deepseek, claude, gpt, or auto)"
            ))),
        }
    }
}

/// API keys found in the environment.
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    pub deepseek: Option<String>,
    pub anthropic: Option<String>,
    pub openai: Option<String>,
}

impl ApiKeys {
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            deepseek: var("DEEPSEEK_API_KEY"),
            anthropic: var("ANTHROPIC_API_KEY").or_else(|| var("CLAUDE_API_KEY")),
            openai: var("OPENAI_API_KEY"),
        }
    }

    pub fn key_for(&self, kind: ProviderKind) -> Option<&str> {
        match kind {
            ProviderKind::DeepSeek => self.deepseek.as_deref(),
            ProviderKind::Claude => self.anthropic.as_deref(),
            ProviderKind::OpenAi => self.openai.as_deref(),
        }
    }

    /// Provider to use for `selection`; auto prefers DeepSeek, then Claude, then OpenAI.
    pub fn resolve(&self, selection: ProviderSelection) -> Result<ProviderKind, LlmError> {
        match selection {
            ProviderSelection::Only(kind) => self
                .key_for(kind)
                .map(|_| kind)
                .ok_or_else(|| LlmError::Config(format!("no API key set for provider {kind}"))),
            ProviderSelection::Auto => [ProviderKind::DeepSeek, ProviderKind::Claude, ProviderKind::OpenAi]
                .into_iter()
                .find(|kind| self.key_for(*kind).is_some())
                .ok_or_else(|| {
                    LlmError::Config(
                        "no AI API key found; set DEEPSEEK_API_KEY, ANTHROPIC_API_KEY, or OPENAI_API_KEY"
                            .to_string(),
                    )
                }),
        }
    }
}

/// Builds the client for `selection` from the keys available.
pub fn client_for(selection: ProviderSelection, keys: &ApiKeys) -> Result<Box<dyn ChatClient>, LlmError> {
    let kind = keys.resolve(selection)?;
    let key = keys
        .key_for(kind)
        .ok_or_else(|| LlmError::Config(format!("no API key set for provider {kind}")))?;
    tracing::info!(provider = %kind, model = kind.default_model(), "using AI provider");
    Ok(match kind {
        ProviderKind::Claude => Box::new(AnthropicClient::new(key)?),
        other => Box::new(OpenAiCompatibleClient::new(other, key)?),
    })
}
