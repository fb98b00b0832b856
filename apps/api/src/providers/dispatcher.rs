//! Hybrid dispatcher: resolves the active model to a provider, calls it with a
//! bounded timeout, and walks the provider's fallback chain on failure.
//!
//! Fallback is opt-out. It runs unless the request (or the process default)
//! disables it, in which case a failed call is reported as-is.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::model_state::{ModelSelection, ModelStateManager};
use super::{
    ErrorKind, Prompt, ProviderClient, ProviderError, ProviderKind, ProviderReply, TokenUsage,
};

#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub allow_fallback: bool,
    /// Per-attempt budget; `None` uses the dispatcher default.
    pub timeout: Option<Duration>,
    /// Model for this call only. Never changes the active selection.
    pub model_override: Option<String>,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            allow_fallback: true,
            timeout: None,
            model_override: None,
        }
    }
}

/// Outcome of one dispatch. Produced once, consumed once by the extractor.
#[derive(Debug, Clone, Serialize)]
pub struct RawResponse {
    pub text: String,
    pub provider: ProviderKind,
    /// The model that answered, or the last one tried on failure.
    pub model_id: String,
    pub requested_model: String,
    pub latency_ms: u64,
    pub succeeded: bool,
    pub error: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub attempts: u32,
    pub fallback_used: bool,
    pub usage: Option<TokenUsage>,
}

pub struct HybridDispatcher {
    model_state: Arc<ModelStateManager>,
    clients: HashMap<ProviderKind, Arc<dyn ProviderClient>>,
    default_timeout: Duration,
}

impl HybridDispatcher {
    pub fn new(
        model_state: Arc<ModelStateManager>,
        clients: HashMap<ProviderKind, Arc<dyn ProviderClient>>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            model_state,
            clients,
            default_timeout,
        }
    }

    pub fn model_state(&self) -> &Arc<ModelStateManager> {
        &self.model_state
    }

    pub async fn dispatch(&self, prompt: &Prompt, options: &DispatchOptions) -> RawResponse {
        let selection = self.select(options);
        let budget = options.timeout.unwrap_or(self.default_timeout);
        let plan = self.attempt_plan(&selection, options.allow_fallback);

        let started = Instant::now();
        let mut last_error = ProviderError::new(ErrorKind::Unconfigured, "no provider attempted");
        let mut last_model = selection.model_id.clone();
        let mut last_provider = selection.provider;
        let mut attempts = 0u32;

        for (index, (provider, model_id)) in plan.iter().enumerate() {
            attempts += 1;
            last_provider = *provider;
            last_model = model_id.clone();

            if index > 0 {
                info!(
                    "Falling back to {} ({}) after {} failure",
                    provider, model_id, last_error.kind
                );
            }

            match self.attempt(*provider, model_id, prompt, budget).await {
                Ok(reply) => {
                    let latency_ms = started.elapsed().as_millis() as u64;
                    debug!(
                        "Provider {} answered in {}ms after {} attempt(s)",
                        provider, latency_ms, attempts
                    );
                    return RawResponse {
                        text: reply.text,
                        provider: *provider,
                        model_id: model_id.clone(),
                        requested_model: selection.model_id.clone(),
                        latency_ms,
                        succeeded: true,
                        error: None,
                        error_message: None,
                        attempts,
                        fallback_used: index > 0,
                        usage: reply.usage,
                    };
                }
                Err(e) => {
                    warn!(
                        "Provider attempt {}/{} failed: {} ({}) -> {}",
                        attempts,
                        plan.len(),
                        provider,
                        model_id,
                        e
                    );
                    last_error = e;
                }
            }
        }

        RawResponse {
            text: String::new(),
            provider: last_provider,
            model_id: last_model,
            requested_model: selection.model_id.clone(),
            latency_ms: started.elapsed().as_millis() as u64,
            succeeded: false,
            error: Some(last_error.kind),
            error_message: Some(last_error.message),
            attempts,
            fallback_used: attempts > 1,
            usage: None,
        }
    }

    /// One synchronized read of the active selection, unless a valid override applies.
    fn select(&self, options: &DispatchOptions) -> ModelSelection {
        if let Some(model_id) = options.model_override.as_deref() {
            match self.model_state.resolve_override(model_id) {
                Ok(selection) => return selection,
                Err(e) => warn!("Ignoring model override: {e}"),
            }
        }
        self.model_state.get_active().as_ref().clone()
    }

    fn attempt_plan(
        &self,
        selection: &ModelSelection,
        allow_fallback: bool,
    ) -> Vec<(ProviderKind, String)> {
        let mut plan = vec![(selection.provider, selection.model_id.clone())];
        if !allow_fallback {
            return plan;
        }

        let registry = self.model_state.registry();
        for provider in registry.fallback_chain(selection.provider) {
            if let Some(info) = registry.default_model(*provider) {
                plan.push((*provider, info.id.to_string()));
            }
        }
        plan
    }

    async fn attempt(
        &self,
        provider: ProviderKind,
        model_id: &str,
        prompt: &Prompt,
        budget: Duration,
    ) -> Result<ProviderReply, ProviderError> {
        let client = self.clients.get(&provider).ok_or_else(|| {
            ProviderError::new(
                ErrorKind::Unconfigured,
                format!("no client configured for {provider}"),
            )
        })?;

        let reply = tokio::time::timeout(budget, client.send(model_id, prompt, budget))
            .await
            .map_err(|_| {
                ProviderError::new(
                    ErrorKind::Timeout,
                    format!("no reply within {}ms", budget.as_millis()),
                )
            })??;

        if reply.text.trim().is_empty() {
            return Err(ProviderError::new(
                ErrorKind::Malformed,
                "provider returned empty content",
            ));
        }
        Ok(reply)
    }
}
