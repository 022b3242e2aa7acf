//! Chat-completion client for the planner and oracle.
//!
//! OpenAI, Azure OpenAI and Groq share the OpenAI chat-completions wire
//! format; Anthropic uses the Messages API with the system prompt lifted out
//! of the conversation. Credentials come from the environment.

use crate::config::LlmConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

const OPENAI_BASE: &str = "https://api.openai.com/v1";
const GROQ_BASE: &str = "https://api.groq.com/openai/v1";
const ANTHROPIC_BASE: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const AZURE_API_VERSION: &str = "2024-08-01-preview";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Unsupported LLM provider: {0}")]
    UnsupportedProvider(String),

    #[error("Missing LLM credentials: {0}")]
    MissingCredentials(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Empty completion")]
    EmptyCompletion,
}

/// Anything that can answer a chat conversation.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage], temperature: f32) -> Result<String, LlmError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    AzureOpenAi,
    Anthropic,
    Groq,
}

impl FromStr for Provider {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "azure-openai" | "azure" => Ok(Provider::AzureOpenAi),
            "anthropic" | "claude" => Ok(Provider::Anthropic),
            "groq" => Ok(Provider::Groq),
            other => Err(LlmError::UnsupportedProvider(other.to_string())),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Provider::OpenAi => "openai",
            Provider::AzureOpenAi => "azure-openai",
            Provider::Anthropic => "anthropic",
            Provider::Groq => "groq",
        };
        f.write_str(name)
    }
}

/// Resolved endpoint, credentials and model for one provider.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    pub provider: Provider,
    pub api_key: String,
    /// Full chat endpoint URL.
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("provider", &self.provider)
            .field("api_key", &"***")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl ProviderSettings {
    /// Resolve settings from `config` and an environment lookup.
    pub fn resolve(
        config: &LlmConfig,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, LlmError> {
        let provider: Provider = config.provider.parse()?;
        let var = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &str| var(key).ok_or_else(|| LlmError::MissingCredentials(key.to_string()));

        let settings = match provider {
            Provider::OpenAi => {
                let base = config.base_url.clone().or_else(|| var("OPENAI_BASE"));
                Self {
                    provider,
                    api_key: require("OPENAI_API_KEY")?,
                    endpoint: chat_completions_url(base.as_deref().unwrap_or(OPENAI_BASE)),
                    model: config
                        .model
                        .clone()
                        .or_else(|| var("OPENAI_MODEL"))
                        .unwrap_or_else(|| "gpt-4o-mini".to_string()),
                    max_tokens: config.max_tokens,
                }
            }
            Provider::Groq => Self {
                provider,
                api_key: require("GROQ_API_KEY")?,
                endpoint: chat_completions_url(config.base_url.as_deref().unwrap_or(GROQ_BASE)),
                model: config
                    .model
                    .clone()
                    .or_else(|| var("GROQ_MODEL"))
                    .unwrap_or_else(|| "llama3-8b-8192".to_string()),
                max_tokens: config.max_tokens,
            },
            Provider::AzureOpenAi => {
                let api_key = require("AZURE_OPENAI_API_KEY")?;
                let base = match config.base_url.clone() {
                    Some(base) => base,
                    None => require("AZURE_OPENAI_ENDPOINT")?,
                };
                let deployment = match config.model.clone() {
                    Some(model) => model,
                    None => require("AZURE_OPENAI_DEPLOYMENT")?,
                };
                let version =
                    var("AZURE_OPENAI_API_VERSION").unwrap_or_else(|| AZURE_API_VERSION.to_string());
                Self {
                    provider,
                    api_key,
                    endpoint: format!(
                        "{}/openai/deployments/{}/chat/completions?api-version={}",
                        base.trim_end_matches('/'),
                        deployment,
                        version
                    ),
                    model: deployment,
                    max_tokens: config.max_tokens,
                }
            }
            Provider::Anthropic => {
                let base = config.base_url.clone().unwrap_or_else(|| ANTHROPIC_BASE.to_string());
                Self {
                    provider,
                    api_key: require("ANTHROPIC_API_KEY")?,
                    endpoint: format!("{}/v1/messages", base.trim_end_matches('/')),
                    model: config
                        .model
                        .clone()
                        .or_else(|| var("ANTHROPIC_MODEL"))
                        .unwrap_or_else(|| "claude-3-haiku-20240307".to_string()),
                    max_tokens: var("ANTHROPIC_MAX_TOKENS")
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(config.max_tokens),
                }
            }
        };
        Ok(settings)
    }
}

fn chat_completions_url(base: &str) -> String {
    format!("{}/chat/completions", base.trim_end_matches('/'))
}

// ============================================================
// Wire formats
// ============================================================

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct AnthropicMessage {
    role: Role,
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicBlock>,
}

#[derive(Deserialize)]
struct AnthropicBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

/// Split out system turns and make sure the conversation ends on a user turn.
fn anthropic_conversation(messages: &[ChatMessage]) -> (Option<String>, Vec<AnthropicMessage>) {
    let mut system: Vec<&str> = Vec::new();
    let mut turns = Vec::new();
    for message in messages {
        match message.role {
            Role::System => system.push(&message.content),
            role => turns.push(AnthropicMessage {
                role,
                content: message.content.clone(),
            }),
        }
    }
    if turns.last().map(|t| t.role) != Some(Role::User) {
        turns.push(AnthropicMessage {
            role: Role::User,
            content: "Continue.".to_string(),
        });
    }
    let system = (!system.is_empty()).then(|| system.join("\n"));
    (system, turns)
}

// ============================================================
// Client
// ============================================================

#[derive(Debug, Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    settings: ProviderSettings,
}

impl LlmClient {
    pub fn new(settings: ProviderSettings, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client, settings }
    }

    /// Build a client from configuration plus process environment.
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let settings = ProviderSettings::resolve(config, |key| std::env::var(key).ok())?;
        Ok(Self::new(
            settings,
            Duration::from_secs(config.request_timeout_secs),
        ))
    }

    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, LlmError> {
        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    async fn chat_openai(&self, messages: &[ChatMessage], temperature: f32) -> Result<String, LlmError> {
        let azure = self.settings.provider == Provider::AzureOpenAi;
        let body = OpenAiRequest {
            model: (!azure).then_some(self.settings.model.as_str()),
            messages,
            temperature,
        };
        let request = self.client.post(&self.settings.endpoint).json(&body);
        let request = if azure {
            request.header("api-key", &self.settings.api_key)
        } else {
            request.bearer_auth(&self.settings.api_key)
        };
        let response: OpenAiResponse = self.send(request).await?.json().await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .ok_or(LlmError::EmptyCompletion)
    }

    async fn chat_anthropic(&self, messages: &[ChatMessage], temperature: f32) -> Result<String, LlmError> {
        let (system, turns) = anthropic_conversation(messages);
        let body = AnthropicRequest {
            model: &self.settings.model,
            system,
            messages: turns,
            temperature,
            max_tokens: self.settings.max_tokens,
        };
        let request = self
            .client
            .post(&self.settings.endpoint)
            .header("x-api-key", &self.settings.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);
        let response: AnthropicResponse = self.send(request).await?.json().await?;
        let text: String = response
            .content
            .into_iter()
            .filter(|b| b.kind == "text")
            .map(|b| b.text)
            .collect();
        Ok(text.trim().to_string())
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn chat(&self, messages: &[ChatMessage], temperature: f32) -> Result<String, LlmError> {
        debug!(
            provider = %self.settings.provider,
            model = %self.settings.model,
            turns = messages.len(),
            "LLM request"
        );
        match self.settings.provider {
            Provider::Anthropic => self.chat_anthropic(messages, temperature).await,
            _ => self.chat_openai(messages, temperature).await,
        }
    }
}
