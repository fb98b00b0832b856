//! Static catalog of the models the service can route to.

use serde::Serialize;

use super::ProviderKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CostTier {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Chat,
    Code,
    Reasoning,
    StructuredOutput,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub id: &'static str,
    pub provider: ProviderKind,
    pub display_name: &'static str,
    pub cost_tier: CostTier,
    pub capabilities: &'static [Capability],
    /// Blended input/output price, used for audit-log cost estimates only.
    pub usd_per_million_tokens: f64,
}

const BUILTIN_MODELS: &[ModelInfo] = &[
    ModelInfo {
        id: "deepseek-chat",
        provider: ProviderKind::PrimaryChat,
        display_name: "DeepSeek Chat",
        cost_tier: CostTier::Low,
        capabilities: &[Capability::Chat, Capability::StructuredOutput],
        usd_per_million_tokens: 0.70,
    },
    ModelInfo {
        id: "deepseek-coder",
        provider: ProviderKind::Coder,
        display_name: "DeepSeek Coder",
        cost_tier: CostTier::Low,
        capabilities: &[Capability::Code, Capability::StructuredOutput],
        usd_per_million_tokens: 0.70,
    },
    ModelInfo {
        id: "deepseek-reasoner",
        provider: ProviderKind::Reasoner,
        display_name: "DeepSeek Reasoner",
        cost_tier: CostTier::Medium,
        capabilities: &[Capability::Reasoning, Capability::Chat],
        usd_per_million_tokens: 1.40,
    },
    ModelInfo {
        id: "gpt-4o-mini",
        provider: ProviderKind::FallbackProviderA,
        display_name: "GPT-4o mini",
        cost_tier: CostTier::Medium,
        capabilities: &[Capability::Chat, Capability::StructuredOutput],
        usd_per_million_tokens: 0.40,
    },
    ModelInfo {
        id: "claude-sonnet-4-5",
        provider: ProviderKind::FallbackProviderB,
        display_name: "Claude Sonnet 4.5",
        cost_tier: CostTier::High,
        capabilities: &[
            Capability::Chat,
            Capability::Reasoning,
            Capability::StructuredOutput,
        ],
        usd_per_million_tokens: 9.00,
    },
];

/// Read-only model catalog plus the per-provider fallback chains.
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    models: &'static [ModelInfo],
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self {
            models: BUILTIN_MODELS,
        }
    }
}

impl ProviderRegistry {
    pub fn models(&self) -> &[ModelInfo] {
        self.models
    }

    pub fn lookup(&self, model_id: &str) -> Option<&ModelInfo> {
        self.models.iter().find(|m| m.id == model_id)
    }

    /// The first catalog model served by `provider`, used when the provider
    /// is reached through a fallback chain rather than picked directly.
    pub fn default_model(&self, provider: ProviderKind) -> Option<&ModelInfo> {
        self.models.iter().find(|m| m.provider == provider)
    }

    /// Providers to try, in order, after `provider` fails.
    pub fn fallback_chain(&self, provider: ProviderKind) -> &'static [ProviderKind] {
        match provider {
            ProviderKind::PrimaryChat => &[
                ProviderKind::FallbackProviderA,
                ProviderKind::FallbackProviderB,
            ],
            ProviderKind::Coder | ProviderKind::Reasoner => {
                &[ProviderKind::PrimaryChat, ProviderKind::FallbackProviderA]
            }
            ProviderKind::FallbackProviderA => &[ProviderKind::FallbackProviderB],
            ProviderKind::FallbackProviderB => &[],
        }
    }

    /// USD cost estimate for `tokens` on `model_id`; unknown models cost nothing.
    pub fn estimate_cost(&self, model_id: &str, tokens: u32) -> f64 {
        self.lookup(model_id)
            .map(|m| tokens as f64 * m.usd_per_million_tokens / 1_000_000.0)
            .unwrap_or(0.0)
    }
}
