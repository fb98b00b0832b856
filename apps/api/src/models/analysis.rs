use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

pub const ANALYSIS_TYPE_TAILORING: &str = "cv_tailoring";

/// Audit-log row written after every tailoring run, successful or not.
///
/// `requested_model` is what the caller (or the active selection) asked for;
/// `model_used` is the model that actually answered. They differ when the
/// provider fallback chain kicked in, which `provider_fallback` also records.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AnalysisRecord {
    pub id: Uuid,
    pub cv_id: Uuid,
    pub user_id: Option<Uuid>,
    pub analysis_type: String,
    pub input_data: Value,
    pub output_data: Value,
    pub requested_model: String,
    pub model_used: String,
    pub provider_fallback: bool,
    pub is_fallback_document: bool,
    pub tokens_used: i32,
    pub response_time_ms: i64,
    pub cost: f64,
    pub success: bool,
    pub failure_stage: Option<String>,
    pub failure_reason: Option<String>,
    pub confidence_score: f64,
    pub quality_score: f64,
    pub created_at: DateTime<Utc>,
}
