//! AI provider layer.
//!
//! ARCHITECTURAL RULE: nothing outside this module talks to a provider API.
//! Callers go through [`dispatcher::HybridDispatcher`], which picks a provider
//! from the active [`model_state::ModelSelection`] and walks the fallback chain.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod dispatcher;
pub mod handlers;
pub mod http;
pub mod model_state;
pub mod prompts;
pub mod registry;

/// The closed set of provider backends the service knows how to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    PrimaryChat,
    Coder,
    Reasoner,
    FallbackProviderA,
    FallbackProviderB,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 5] = [
        ProviderKind::PrimaryChat,
        ProviderKind::Coder,
        ProviderKind::Reasoner,
        ProviderKind::FallbackProviderA,
        ProviderKind::FallbackProviderB,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::PrimaryChat => "primary_chat",
            ProviderKind::Coder => "coder",
            ProviderKind::Reasoner => "reasoner",
            ProviderKind::FallbackProviderA => "fallback_provider_a",
            ProviderKind::FallbackProviderB => "fallback_provider_b",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a provider call failed. Every kind is eligible for fallback-chain retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    Auth,
    RateLimited,
    Network,
    Server,
    Malformed,
    /// No client is configured for the provider (missing API key).
    Unconfigured,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::Auth => "auth",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Network => "network",
            ErrorKind::Server => "server",
            ErrorKind::Malformed => "malformed",
            ErrorKind::Unconfigured => "unconfigured",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind} error: {message}")]
pub struct ProviderError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// A system + user prompt pair sent to a provider.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn char_len(&self) -> usize {
        self.system.chars().count() + self.user.chars().count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

#[derive(Debug, Clone)]
pub struct ProviderReply {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

/// Capability to send a prompt to one provider backend and get text back.
///
/// Authentication and wire format are entirely the implementor's business.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn send(
        &self,
        model: &str,
        prompt: &Prompt,
        timeout: Duration,
    ) -> Result<ProviderReply, ProviderError>;
}
