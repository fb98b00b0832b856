pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::providers::handlers as models;
use crate::state::AppState;
use crate::tailoring::handlers as tailoring;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Model selection
        .route("/api/v1/models", get(models::handle_list_models))
        .route(
            "/api/v1/models/active",
            get(models::handle_get_active_model).put(models::handle_set_active_model),
        )
        // Tailoring
        .route("/api/v1/tailor", post(tailoring::handle_tailor))
        .route("/api/v1/cvs/:cv_id/tailor", post(tailoring::handle_tailor_cv))
        .with_state(state)
}
