use std::sync::Arc;

use crate::providers::model_state::ModelStateManager;
use crate::store::CvRepository;
use crate::tailoring::pipeline::TailorPipeline;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Loads stored CVs and records tailoring runs.
    pub repo: Arc<dyn CvRepository>,
    pub model_state: Arc<ModelStateManager>,
    pub pipeline: Arc<TailorPipeline>,
}
