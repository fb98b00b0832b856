use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::providers::ProviderKind;

pub const DEFAULT_DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "deepseek-chat";

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub rust_log: String,
    pub deepseek_api_key: Option<String>,
    pub deepseek_base_url: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub anthropic_api_key: Option<String>,
    pub default_model: String,
    pub provider_timeout: Duration,
    /// Process-wide default for walking provider fallback chains.
    pub fallback_enabled: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Config {
            database_url: optional("DATABASE_URL")
                .context("Required environment variable 'DATABASE_URL' is not set")?,
            port: optional("PORT")
                .unwrap_or_else(|| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: optional("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            deepseek_api_key: optional("DEEPSEEK_API_KEY"),
            deepseek_base_url: optional("DEEPSEEK_BASE_URL")
                .unwrap_or_else(|| DEFAULT_DEEPSEEK_BASE_URL.to_string()),
            openai_api_key: optional("OPENAI_API_KEY"),
            openai_base_url: optional("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            anthropic_api_key: optional("ANTHROPIC_API_KEY"),
            default_model: optional("DEFAULT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            provider_timeout: Duration::from_millis(
                optional("PROVIDER_TIMEOUT_MS")
                    .unwrap_or_else(|| "60000".to_string())
                    .parse::<u64>()
                    .context("PROVIDER_TIMEOUT_MS must be a whole number of milliseconds")?,
            ),
            fallback_enabled: match optional("PROVIDER_FALLBACK_ENABLED") {
                None => true,
                Some(v) => parse_bool(&v)
                    .context("PROVIDER_FALLBACK_ENABLED must be true or false")?,
            },
        };

        if config.configured_providers().is_empty() {
            bail!(
                "No provider API key configured: set DEEPSEEK_API_KEY, OPENAI_API_KEY or ANTHROPIC_API_KEY"
            );
        }
        Ok(config)
    }

    /// The credential a provider is called with, if any.
    pub fn api_key(&self, provider: ProviderKind) -> Option<&str> {
        match provider {
            ProviderKind::PrimaryChat | ProviderKind::Coder | ProviderKind::Reasoner => {
                self.deepseek_api_key.as_deref()
            }
            ProviderKind::FallbackProviderA => self.openai_api_key.as_deref(),
            ProviderKind::FallbackProviderB => self.anthropic_api_key.as_deref(),
        }
    }

    /// Providers that have credentials and can therefore be dispatched to.
    pub fn configured_providers(&self) -> Vec<ProviderKind> {
        ProviderKind::ALL
            .into_iter()
            .filter(|kind| self.api_key(*kind).is_some())
            .collect()
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => bail!("'{other}' is not a boolean"),
    }
}
