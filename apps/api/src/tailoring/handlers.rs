//! Axum route handlers for the Tailoring API.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::cv::TailoredCvDocument;
use crate::state::AppState;
use crate::tailoring::ats::AtsReport;
use crate::tailoring::pipeline::{
    PipelineStage, Provenance, RunMetadata, TailorOutcome, TailorRequest,
};

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TailorStoredCvRequest {
    pub job_description: String,
    #[serde(default)]
    pub model_override: Option<String>,
    #[serde(default)]
    pub allow_fallback: Option<bool>,
}

/// Client-facing provenance. The failure reason stays in the analysis log.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseProvenance {
    Tailored,
    Fallback { stage: PipelineStage },
}

impl From<&Provenance> for ResponseProvenance {
    fn from(provenance: &Provenance) -> Self {
        match provenance {
            Provenance::Tailored => ResponseProvenance::Tailored,
            Provenance::Fallback { stage, .. } => ResponseProvenance::Fallback { stage: *stage },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TailorResponse {
    pub document: TailoredCvDocument,
    pub is_fallback: bool,
    pub provenance: ResponseProvenance,
    pub ats_before: AtsReport,
    pub ats_after: AtsReport,
    pub metadata: RunMetadata,
    /// Set when the run was recorded in the audit log.
    pub analysis_id: Option<Uuid>,
}

impl TailorResponse {
    fn new(outcome: TailorOutcome, analysis_id: Option<Uuid>) -> Self {
        Self {
            document: outcome.document,
            is_fallback: outcome.is_fallback,
            provenance: ResponseProvenance::from(&outcome.provenance),
            ats_before: outcome.ats_before,
            ats_after: outcome.ats_after,
            metadata: outcome.metadata,
            analysis_id,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/tailor
///
/// Tailors a CV supplied inline. Nothing is persisted.
pub async fn handle_tailor(
    State(state): State<AppState>,
    Json(request): Json<TailorRequest>,
) -> Result<Json<TailorResponse>, AppError> {
    require_job_description(&request.job_description)?;

    let outcome = state.pipeline.run(&request).await;
    Ok(Json(TailorResponse::new(outcome, None)))
}

/// POST /api/v1/cvs/:cv_id/tailor
///
/// Tailors a stored CV and appends the run to the analysis log. A failed
/// write is logged; the caller still gets the document.
pub async fn handle_tailor_cv(
    State(state): State<AppState>,
    Path(cv_id): Path<Uuid>,
    Json(body): Json<TailorStoredCvRequest>,
) -> Result<Json<TailorResponse>, AppError> {
    require_job_description(&body.job_description)?;

    let original_cv = state
        .repo
        .load_cv(cv_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("CV {cv_id} not found")))?;

    let request = TailorRequest {
        original_cv,
        job_description: body.job_description,
        model_override: body.model_override,
        allow_fallback: body.allow_fallback,
    };
    let outcome = state.pipeline.run(&request).await;

    let record = outcome.analysis_record(&request.original_cv, &request.job_description);
    let analysis_id = match state.repo.save_analysis(&record).await {
        Ok(()) => {
            info!(
                "Recorded analysis {} for CV {cv_id} (fallback: {})",
                record.id, record.is_fallback_document
            );
            Some(record.id)
        }
        Err(e) => {
            error!("Failed to record analysis for CV {cv_id}: {e:?}");
            None
        }
    };

    Ok(Json(TailorResponse::new(outcome, analysis_id)))
}

fn require_job_description(job_description: &str) -> Result<(), AppError> {
    if job_description.trim().is_empty() {
        return Err(AppError::Validation(
            "job_description cannot be empty".to_string(),
        ));
    }
    Ok(())
}
