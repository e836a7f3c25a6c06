//! Text-completion client used for LLM drafting and schema conversion.
//!
//! Two wire formats: the Anthropic messages API (default) and any
//! OpenAI-compatible chat completions endpoint, selected with
//! `TEXT2TYPEQL_LLM_PROVIDER=openai`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChatServiceError {
    #[error("no API key configured (set {0})")]
    MissingApiKey(&'static str),

    #[error("{provider} API request failed: {message}")]
    Request {
        provider: &'static str,
        message: String,
    },

    #[error("{provider} API error ({status}): {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("failed to parse {provider} response: {message}")]
    Decode {
        provider: &'static str,
        message: String,
    },

    #[error("{0} returned empty response")]
    EmptyResponse(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    Anthropic,
    OpenAI,
}

impl LlmProvider {
    fn from_setting(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "openai" => LlmProvider::OpenAI,
            _ => LlmProvider::Anthropic,
        }
    }

    fn label(self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "Anthropic",
            LlmProvider::OpenAI => "OpenAI",
        }
    }

    /// Key variables in lookup order.
    fn key_vars(self) -> &'static [&'static str] {
        match self {
            LlmProvider::Anthropic => &["ANTHROPIC_API_KEY"],
            LlmProvider::OpenAI => &["OPENAI_API_KEY", "ANTHROPIC_API_KEY"],
        }
    }

    fn default_model(self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "claude-sonnet-4-20250514",
            LlmProvider::OpenAI => "gpt-4o",
        }
    }

    fn default_url(self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "https://api.anthropic.com/v1/messages",
            LlmProvider::OpenAI => "https://api.openai.com/v1/chat/completions",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: String,
    pub model: String,
    pub api_url: String,
    pub max_tokens: u32,
}

impl LlmConfig {
    /// Read the provider settings from the environment; `None` when no
    /// non-empty API key is set for the selected provider.
    pub fn from_env() -> Option<Self> {
        let provider =
            LlmProvider::from_setting(&std::env::var("TEXT2TYPEQL_LLM_PROVIDER").unwrap_or_default());
        let api_key = provider
            .key_vars()
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|key| !key.is_empty())?;

        Some(LlmConfig {
            provider,
            api_key,
            model: std::env::var("TEXT2TYPEQL_LLM_MODEL")
                .unwrap_or_else(|_| provider.default_model().to_string()),
            api_url: std::env::var("TEXT2TYPEQL_LLM_API_URL")
                .unwrap_or_else(|_| provider.default_url().to_string()),
            max_tokens: std::env::var("TEXT2TYPEQL_LLM_MAX_TOKENS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4096),
        })
    }

    /// Like [`LlmConfig::from_env`] but a missing key is an error.
    pub fn require_from_env() -> Result<Self, ChatServiceError> {
        Self::from_env().ok_or(ChatServiceError::MissingApiKey(
            "ANTHROPIC_API_KEY or OPENAI_API_KEY",
        ))
    }
}

/// Opaque text-completion capability.
#[async_trait]
pub trait ChatService: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str)
        -> Result<String, ChatServiceError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Turn {
    role: String,
    content: String,
}

impl Turn {
    fn new(role: &str, content: &str) -> Self {
        Turn {
            role: role.to_string(),
            content: content.to_string(),
        }
    }
}

/// Anthropic messages API body; the system prompt is a top-level field.
#[derive(Debug, Serialize)]
struct MessagesBody {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<Turn>,
}

#[derive(Debug, Deserialize)]
struct MessagesReply {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

/// OpenAI-compatible chat completions body; the system prompt is the first turn.
#[derive(Debug, Serialize)]
struct CompletionsBody {
    model: String,
    max_tokens: u32,
    messages: Vec<Turn>,
}

#[derive(Debug, Deserialize)]
struct CompletionsReply {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// [`ChatService`] over HTTP, dispatching on the configured provider.
#[derive(Debug, Clone)]
pub struct HttpChatService {
    client: Client,
    config: LlmConfig,
}

impl HttpChatService {
    pub fn new(config: LlmConfig) -> Self {
        HttpChatService {
            client: Client::new(),
            config,
        }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    async fn post<T: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        request: &T,
    ) -> Result<R, ChatServiceError> {
        let provider = self.config.provider.label();
        let builder = self
            .client
            .post(&self.config.api_url)
            .header("content-type", "application/json");
        let builder = match self.config.provider {
            LlmProvider::Anthropic => builder
                .header("x-api-key", &self.config.api_key)
                .header("anthropic-version", "2023-06-01"),
            LlmProvider::OpenAI => {
                builder.header("authorization", format!("Bearer {}", self.config.api_key))
            }
        };

        let response = builder
            .json(request)
            .send()
            .await
            .map_err(|e| ChatServiceError::Request {
                provider,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatServiceError::Status {
                provider,
                status: status.as_u16(),
                body,
            });
        }

        response.json().await.map_err(|e| ChatServiceError::Decode {
            provider,
            message: e.to_string(),
        })
    }

    async fn messages(&self, system_prompt: &str, user_prompt: &str) -> Result<String, ChatServiceError> {
        let body = MessagesBody {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            system: system_prompt.to_string(),
            messages: vec![Turn::new("user", user_prompt)],
        };
        let reply: MessagesReply = self.post(&body).await?;
        Ok(reply.content.into_iter().filter_map(|block| block.text).collect())
    }

    async fn completions(&self, system_prompt: &str, user_prompt: &str) -> Result<String, ChatServiceError> {
        let body = CompletionsBody {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            messages: vec![Turn::new("system", system_prompt), Turn::new("user", user_prompt)],
        };
        let reply: CompletionsReply = self.post(&body).await?;
        Ok(reply
            .choices
            .into_iter()
            .filter_map(|choice| choice.message.content)
            .collect())
    }
}

#[async_trait]
impl ChatService for HttpChatService {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, ChatServiceError> {
        log::debug!(
            "Calling {} model {} ({} prompt chars)",
            self.config.provider.label(),
            self.config.model,
            user_prompt.len()
        );
        let text = match self.config.provider {
            LlmProvider::Anthropic => self.messages(system_prompt, user_prompt).await?,
            LlmProvider::OpenAI => self.completions(system_prompt, user_prompt).await?,
        };
        if text.is_empty() {
            return Err(ChatServiceError::EmptyResponse(self.config.provider.label()));
        }
        Ok(text)
    }
}
