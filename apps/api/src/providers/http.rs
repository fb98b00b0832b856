//! reqwest-backed provider clients.
//!
//! DeepSeek and OpenAI speak the chat-completions wire format and share
//! [`OpenAiCompatibleClient`]; Anthropic gets its own Messages API client.
//! Both retry 5xx responses with exponential backoff. The dispatcher's
//! timeout bounds the whole call, retries included.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ErrorKind, Prompt, ProviderClient, ProviderError, ProviderReply, TokenUsage};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;
const MAX_SERVER_RETRIES: u32 = 2;

fn build_http_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(120))
        .build()
        .expect("Failed to build HTTP client")
}

/// Maps an HTTP status to the retry-relevant error kind.
fn classify_status(status: StatusCode) -> ErrorKind {
    match status.as_u16() {
        401 | 403 => ErrorKind::Auth,
        429 => ErrorKind::RateLimited,
        s if s >= 500 => ErrorKind::Server,
        _ => ErrorKind::Malformed,
    }
}

fn classify_transport(e: &reqwest::Error) -> ErrorKind {
    if e.is_timeout() {
        ErrorKind::Timeout
    } else if e.is_decode() {
        ErrorKind::Malformed
    } else {
        ErrorKind::Network
    }
}

/// Sends the request built by `build`, retrying server errors with backoff.
/// Returns the successful response body.
async fn send_with_retry<F>(build: F, provider: &str) -> Result<String, ProviderError>
where
    F: Fn() -> RequestBuilder,
{
    let mut last_error: Option<ProviderError> = None;

    for attempt in 0..=MAX_SERVER_RETRIES {
        if attempt > 0 {
            // Exponential backoff: 500ms, 1s
            let delay = Duration::from_millis(500 * (1 << (attempt - 1)));
            warn!(
                "{provider} returned a server error, retrying after {}ms...",
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }

        let response = build().send().await.map_err(|e| {
            ProviderError::new(classify_transport(&e), format!("{provider}: {e}"))
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            ProviderError::new(classify_transport(&e), format!("{provider}: {e}"))
        })?;

        if status.is_success() {
            return Ok(body);
        }

        let error = ProviderError::new(
            classify_status(status),
            format!("{provider} API returned {status}: {}", truncate(&body, 300)),
        );
        if error.kind != ErrorKind::Server {
            return Err(error);
        }
        last_error = Some(error);
    }

    Err(last_error.unwrap_or_else(|| ProviderError::new(ErrorKind::Server, provider.to_string())))
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Chat-completions (DeepSeek, OpenAI)
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Clone)]
pub struct OpenAiCompatibleClient {
    client: Client,
    name: &'static str,
    base_url: String,
    api_key: String,
}

impl OpenAiCompatibleClient {
    pub fn new(name: &'static str, base_url: String, api_key: String) -> Self {
        Self {
            client: build_http_client(),
            name,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl ProviderClient for OpenAiCompatibleClient {
    async fn send(
        &self,
        model: &str,
        prompt: &Prompt,
        timeout: Duration,
    ) -> Result<ProviderReply, ProviderError> {
        let request_body = ChatRequest {
            model,
            max_tokens: MAX_TOKENS,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
        };
        let endpoint = self.endpoint();

        let body = send_with_retry(
            || {
                self.client
                    .post(&endpoint)
                    .bearer_auth(&self.api_key)
                    .timeout(timeout)
                    .json(&request_body)
            },
            self.name,
        )
        .await?;

        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderError::new(ErrorKind::Malformed, format!("{}: {e}", self.name))
        })?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        let usage = parsed.usage.map(|u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        });

        debug!("{} call succeeded: model={model}, usage={usage:?}", self.name);
        Ok(ProviderReply { text, usage })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Anthropic Messages API
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

impl AnthropicResponse {
    /// Text of the first text block.
    fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }
}

#[derive(Clone)]
pub struct AnthropicClient {
    client: Client,
    api_key: String,
}

impl AnthropicClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: build_http_client(),
            api_key,
        }
    }
}

#[async_trait]
impl ProviderClient for AnthropicClient {
    async fn send(
        &self,
        model: &str,
        prompt: &Prompt,
        timeout: Duration,
    ) -> Result<ProviderReply, ProviderError> {
        let request_body = AnthropicRequest {
            model,
            max_tokens: MAX_TOKENS,
            system: &prompt.system,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt.user,
            }],
        };

        let body = send_with_retry(
            || {
                self.client
                    .post(ANTHROPIC_API_URL)
                    .header("x-api-key", &self.api_key)
                    .header("anthropic-version", ANTHROPIC_VERSION)
                    .header("content-type", "application/json")
                    .timeout(timeout)
                    .json(&request_body)
            },
            "anthropic",
        )
        .await?;

        let parsed: AnthropicResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::new(ErrorKind::Malformed, format!("anthropic: {e}")))?;

        let usage = TokenUsage {
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
        };
        debug!(
            "anthropic call succeeded: input_tokens={}, output_tokens={}",
            usage.input_tokens, usage.output_tokens
        );

        Ok(ProviderReply {
            text: parsed.text().unwrap_or_default().to_string(),
            usage: Some(usage),
        })
    }
}
