//! Process-wide active model selection.
//!
//! The selection lives behind an `RwLock<Arc<ModelSelection>>`: readers clone
//! the `Arc` and drop the lock immediately, writers swap in a whole new
//! snapshot. A dispatch therefore sees either the old or the new selection,
//! never a mix, and never holds the lock across a network call.

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use super::registry::ProviderRegistry;
use super::ProviderKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelSelection {
    pub model_id: String,
    pub provider: ProviderKind,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidModelError {
    #[error("Unknown model '{0}'")]
    Unknown(String),

    #[error("Model '{model_id}' is not available: provider {provider} is not configured")]
    Unsupported {
        model_id: String,
        provider: ProviderKind,
    },
}

pub struct ModelStateManager {
    registry: Arc<ProviderRegistry>,
    configured: HashSet<ProviderKind>,
    active: RwLock<Arc<ModelSelection>>,
}

impl ModelStateManager {
    /// Creates the manager with `initial_model` active.
    /// Fails if the initial model is itself unknown or unsupported.
    pub fn new(
        registry: Arc<ProviderRegistry>,
        configured: HashSet<ProviderKind>,
        initial_model: &str,
    ) -> Result<Self, InvalidModelError> {
        let selection = resolve(&registry, &configured, initial_model)?;
        Ok(Self {
            registry,
            configured,
            active: RwLock::new(Arc::new(selection)),
        })
    }

    /// Like [`ModelStateManager::new`], but an unknown or unconfigured
    /// `preferred` model falls back to the first catalog model whose provider
    /// is configured. Fails only when no provider is configured at all.
    pub fn with_preferred(
        registry: Arc<ProviderRegistry>,
        configured: HashSet<ProviderKind>,
        preferred: &str,
    ) -> Result<Self, InvalidModelError> {
        if let Err(e) = resolve(&registry, &configured, preferred) {
            let Some(first) = registry
                .models()
                .iter()
                .find(|m| configured.contains(&m.provider))
            else {
                return Err(e);
            };
            warn!("{e}; starting with {} instead", first.id);
            let initial = first.id;
            return Self::new(registry, configured, initial);
        }
        Self::new(registry, configured, preferred)
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn is_configured(&self, provider: ProviderKind) -> bool {
        self.configured.contains(&provider)
    }

    pub fn configured_providers(&self) -> Vec<ProviderKind> {
        let mut providers: Vec<_> = self.configured.iter().copied().collect();
        providers.sort();
        providers
    }

    /// Snapshot of the active selection. The lock is released before returning.
    pub fn get_active(&self) -> Arc<ModelSelection> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Switches the active model. All-or-nothing: on error the previous
    /// selection is left untouched.
    pub fn set_active(&self, model_id: &str) -> Result<Arc<ModelSelection>, InvalidModelError> {
        let selection = match resolve(&self.registry, &self.configured, model_id) {
            Ok(s) => Arc::new(s),
            Err(e) => {
                warn!("Rejected model change: {e}");
                return Err(e);
            }
        };

        let previous = {
            let mut guard = self.active.write().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *guard, selection.clone())
        };

        info!(
            "Active model changed: {} -> {} ({})",
            previous.model_id, selection.model_id, selection.provider
        );
        Ok(selection)
    }

    /// Validates a per-request override without touching the active selection.
    pub fn resolve_override(&self, model_id: &str) -> Result<ModelSelection, InvalidModelError> {
        resolve(&self.registry, &self.configured, model_id)
    }
}

fn resolve(
    registry: &ProviderRegistry,
    configured: &HashSet<ProviderKind>,
    model_id: &str,
) -> Result<ModelSelection, InvalidModelError> {
    let info = registry
        .lookup(model_id)
        .ok_or_else(|| InvalidModelError::Unknown(model_id.to_string()))?;

    if !configured.contains(&info.provider) {
        return Err(InvalidModelError::Unsupported {
            model_id: model_id.to_string(),
            provider: info.provider,
        });
    }

    Ok(ModelSelection {
        model_id: info.id.to_string(),
        provider: info.provider,
        is_active: true,
    })
}
