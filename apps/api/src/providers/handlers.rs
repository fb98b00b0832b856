//! Axum route handlers for the model selection API.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::providers::model_state::ModelSelection;
use crate::providers::registry::ModelInfo;
use crate::providers::ProviderKind;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CatalogEntry {
    #[serde(flatten)]
    pub info: ModelInfo,
    /// Whether the model's provider has credentials in this process.
    pub available: bool,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<CatalogEntry>,
    pub active: ModelSelection,
    pub configured_providers: Vec<ProviderKind>,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveModelRequest {
    pub model_id: String,
}

/// GET /api/v1/models
pub async fn handle_list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let models = &state.model_state;
    let catalog = models
        .registry()
        .models()
        .iter()
        .map(|info| CatalogEntry {
            info: info.clone(),
            available: models.is_configured(info.provider),
        })
        .collect();

    Json(ModelsResponse {
        models: catalog,
        active: models.get_active().as_ref().clone(),
        configured_providers: models.configured_providers(),
    })
}

/// GET /api/v1/models/active
pub async fn handle_get_active_model(State(state): State<AppState>) -> Json<ModelSelection> {
    Json(state.model_state.get_active().as_ref().clone())
}

/// PUT /api/v1/models/active
///
/// Switches the process-wide model. In-flight runs keep the selection they
/// started with; only later requests see the change.
pub async fn handle_set_active_model(
    State(state): State<AppState>,
    Json(request): Json<SetActiveModelRequest>,
) -> Result<Json<ModelSelection>, AppError> {
    let model_id = request.model_id.trim();
    if model_id.is_empty() {
        return Err(AppError::Validation("model_id cannot be empty".to_string()));
    }
    let selection = state.model_state.set_active(model_id)?;
    Ok(Json(selection.as_ref().clone()))
}
