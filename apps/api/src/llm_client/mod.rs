/// LLM Client — the single point of entry for all provider API calls in JobScan.
///
/// ARCHITECTURAL RULE: No other module may call the OpenAI API directly.
/// The extraction pipeline only sees the `ChatBackend` and `ModerationBackend` traits.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";
const MODERATIONS_PATH: &str = "/moderations";
const MODELS_PATH: &str = "/models";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Gave up after {attempts} attempts")]
    Exhausted { attempts: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("Moderation returned no results")]
    EmptyModeration,

    #[error("Invalid client configuration: {0}")]
    Config(String),
}

/// Token counters reported by the provider for one completion call.
/// `total_tokens` is always `prompt_tokens + completion_tokens`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// Wire body for `POST /chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Generated text plus usage, as handed back to callers.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatCompletion {
    pub text: String,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModerationVerdict {
    pub flagged: bool,
    /// Names of the categories the provider marked as violated.
    pub categories: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: WireUsage,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: Option<u32>,
}

impl From<WireUsage> for TokenUsage {
    fn from(wire: WireUsage) -> Self {
        let usage = TokenUsage::new(wire.prompt_tokens, wire.completion_tokens);
        if let Some(reported) = wire.total_tokens {
            if reported != usage.total_tokens {
                warn!(
                    "Provider total_tokens={} disagrees with prompt+completion={}",
                    reported, usage.total_tokens
                );
            }
        }
        usage
    }
}

impl ChatResponse {
    fn into_completion(self) -> Result<ChatCompletion, LlmError> {
        let text = self
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(LlmError::EmptyContent)?;
        Ok(ChatCompletion {
            text,
            usage: self.usage.into(),
        })
    }
}

#[derive(Debug, Serialize)]
struct ModerationRequest<'a> {
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct ModerationResponse {
    results: Vec<ModerationResult>,
}

#[derive(Debug, Deserialize)]
struct ModerationResult {
    flagged: bool,
    #[serde(default)]
    categories: std::collections::BTreeMap<String, bool>,
}

impl ModerationResponse {
    fn into_verdict(self) -> Result<ModerationVerdict, LlmError> {
        let first = self
            .results
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyModeration)?;
        Ok(ModerationVerdict {
            flagged: first.flagged,
            categories: first
                .categories
                .into_iter()
                .filter_map(|(name, hit)| hit.then_some(name))
                .collect(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    error: ProviderErrorBody,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    message: String,
}

/// Text-generation capability consumed by the completion client.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatCompletion, LlmError>;
}

/// Content-moderation capability consumed by the moderation gate.
#[async_trait]
pub trait ModerationBackend: Send + Sync {
    async fn moderate(&self, input: &str) -> Result<ModerationVerdict, LlmError>;
}

/// The single provider client used by all services in JobScan.
/// Credentials are passed in at construction; nothing is read from global state.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    base_url: String,
    max_attempts: u32,
}

impl LlmClient {
    pub fn new(api_key: String, base_url: &str, max_attempts: u32) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .map_err(|e| LlmError::Config(e.to_string()))?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_attempts: max_attempts.max(1),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Checks the credential by listing the provider's models.
    pub async fn verify_credentials(&self) -> Result<(), LlmError> {
        let url = self.url(MODELS_PATH);
        let _: serde_json::Value = self
            .execute(|| self.client.get(&url).bearer_auth(&self.api_key))
            .await?;
        Ok(())
    }

    /// Sends a request built by `build`, retrying 429 / 5xx / transport failures
    /// with exponential backoff until `max_attempts` is reached.
    async fn execute<T, F>(&self, build: F) -> Result<T, LlmError>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, ...
                let delay = Duration::from_millis(1000 * (1 << (attempt - 1).min(6)));
                warn!(
                    "Provider call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = match build().send().await {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("Provider API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ProviderError>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let body = response.text().await?;
            return Ok(serde_json::from_str(&body)?);
        }

        Err(last_error.unwrap_or(LlmError::Exhausted {
            attempts: self.max_attempts,
        }))
    }
}

#[async_trait]
impl ChatBackend for LlmClient {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatCompletion, LlmError> {
        let url = self.url(CHAT_COMPLETIONS_PATH);
        let response: ChatResponse = self
            .execute(|| {
                self.client
                    .post(&url)
                    .bearer_auth(&self.api_key)
                    .json(request)
            })
            .await?;

        let completion = response.into_completion()?;
        debug!(
            "Chat completion succeeded: model={}, prompt_tokens={}, completion_tokens={}",
            request.model, completion.usage.prompt_tokens, completion.usage.completion_tokens
        );
        Ok(completion)
    }
}

#[async_trait]
impl ModerationBackend for LlmClient {
    async fn moderate(&self, input: &str) -> Result<ModerationVerdict, LlmError> {
        let url = self.url(MODERATIONS_PATH);
        let body = ModerationRequest { input };
        let response: ModerationResponse = self
            .execute(|| self.client.post(&url).bearer_auth(&self.api_key).json(&body))
            .await?;
        response.into_verdict()
    }
}
