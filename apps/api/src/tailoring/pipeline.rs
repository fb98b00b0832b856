//! Tailoring pipeline: one run per inbound request.
//!
//! Flow: dispatch → extract → validate → Done(tailored),
//! and any failing stage short-circuits to → compose fallback → Done(fallback).
//!
//! The run is total: provider, extraction and validation errors are absorbed
//! here and only show up in the provenance and the audit record.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::analysis::{AnalysisRecord, ANALYSIS_TYPE_TAILORING};
use crate::models::cv::{OriginalCvRecord, TailoredCvDocument};
use crate::providers::dispatcher::{DispatchOptions, HybridDispatcher, RawResponse};
use crate::providers::{Prompt, ProviderKind};
use crate::tailoring::ats::{extract_keywords, score_document, score_original, AtsReport};
use crate::tailoring::extractor::{extract, ExtractionStage};
use crate::tailoring::fallback::compose;
use crate::tailoring::prompts::{build_tailor_prompt, tailor_system};
use crate::tailoring::schema::validate;

#[derive(Debug, Clone, Deserialize)]
pub struct TailorRequest {
    pub original_cv: OriginalCvRecord,
    pub job_description: String,
    #[serde(default)]
    pub model_override: Option<String>,
    /// `None` defers to the process-wide default (on unless configured off).
    #[serde(default)]
    pub allow_fallback: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Dispatching,
    Extracting,
    Validating,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Dispatching => "dispatching",
            PipelineStage::Extracting => "extracting",
            PipelineStage::Validating => "validating",
        }
    }
}

/// Where the returned document came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provenance {
    Tailored,
    Fallback { stage: PipelineStage, reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct RunMetadata {
    pub requested_model: String,
    pub model_used: String,
    pub provider: ProviderKind,
    pub provider_fallback: bool,
    pub attempts: u32,
    pub extraction_stage: Option<ExtractionStage>,
    pub tokens_used: u32,
    pub response_time_ms: u64,
    pub cost: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TailorOutcome {
    pub document: TailoredCvDocument,
    pub is_fallback: bool,
    pub provenance: Provenance,
    pub ats_before: AtsReport,
    pub ats_after: AtsReport,
    pub metadata: RunMetadata,
}

/// A stage that failed, and how far extraction got before it did.
struct StageFailure {
    stage: PipelineStage,
    reason: String,
    extraction_stage: Option<ExtractionStage>,
}

pub struct TailorPipeline {
    dispatcher: Arc<HybridDispatcher>,
    fallback_by_default: bool,
}

impl TailorPipeline {
    pub fn new(dispatcher: Arc<HybridDispatcher>, fallback_by_default: bool) -> Self {
        Self {
            dispatcher,
            fallback_by_default,
        }
    }

    pub async fn run(&self, request: &TailorRequest) -> TailorOutcome {
        let started = Instant::now();
        let keywords = extract_keywords(&request.job_description);
        let ats_before = score_original(&request.original_cv, &keywords);

        // Dispatching
        let prompt = build_prompt(request);
        let options = DispatchOptions {
            allow_fallback: request.allow_fallback.unwrap_or(self.fallback_by_default),
            timeout: None,
            model_override: request.model_override.clone(),
        };
        let raw = self.dispatcher.dispatch(&prompt, &options).await;

        // Extracting → Validating
        let (document, provenance, extraction_stage) = match interpret(&raw) {
            Ok((document, stage)) => {
                info!(
                    "Tailored CV {} with {} via {:?} extraction ({})",
                    request.original_cv.id,
                    raw.model_id,
                    stage,
                    document.framework_version()
                );
                (document, Provenance::Tailored, Some(stage))
            }
            Err(failure) => {
                warn!(
                    "Tailoring CV {} fell back at {}: {}",
                    request.original_cv.id,
                    failure.stage.as_str(),
                    failure.reason
                );
                (
                    compose(&request.original_cv),
                    Provenance::Fallback {
                        stage: failure.stage,
                        reason: failure.reason,
                    },
                    failure.extraction_stage,
                )
            }
        };

        let ats_after = score_document(&document, &keywords);
        let tokens_used = tokens_used(&prompt, &raw);
        let cost = self
            .dispatcher
            .model_state()
            .registry()
            .estimate_cost(&raw.model_id, tokens_used);

        TailorOutcome {
            is_fallback: document.is_fallback(),
            document,
            provenance,
            ats_before,
            ats_after,
            metadata: RunMetadata {
                requested_model: raw.requested_model.clone(),
                model_used: raw.model_id.clone(),
                provider: raw.provider,
                provider_fallback: raw.fallback_used,
                attempts: raw.attempts,
                extraction_stage,
                tokens_used,
                response_time_ms: u64::try_from(started.elapsed().as_millis())
                    .unwrap_or(u64::MAX),
                cost,
            },
        }
    }
}

fn build_prompt(request: &TailorRequest) -> Prompt {
    // Plain structs with string keys always serialize.
    let cv_json = serde_json::to_string_pretty(&request.original_cv)
        .unwrap_or_else(|_| "{}".to_string());
    Prompt {
        system: tailor_system(),
        user: build_tailor_prompt(&cv_json, &request.job_description),
    }
}

fn interpret(raw: &RawResponse) -> Result<(TailoredCvDocument, ExtractionStage), StageFailure> {
    if !raw.succeeded {
        let kind = raw
            .error
            .map(|k| k.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        return Err(StageFailure {
            stage: PipelineStage::Dispatching,
            reason: format!(
                "{kind}: {}",
                raw.error_message.as_deref().unwrap_or("provider call failed")
            ),
            extraction_stage: None,
        });
    }

    let extracted = extract(&raw.text).map_err(|e| StageFailure {
        stage: PipelineStage::Extracting,
        reason: e.to_string(),
        extraction_stage: None,
    })?;
    debug!("Extracted provider JSON via {:?}", extracted.stage);

    let document = validate(&extracted.value).map_err(|e| StageFailure {
        stage: PipelineStage::Validating,
        reason: format!("{} check failed at {}: {e}", e.check().as_str(), e.path()),
        extraction_stage: Some(extracted.stage),
    })?;

    Ok((document, extracted.stage))
}

/// Provider-reported usage when available, otherwise ~4 characters per token.
fn tokens_used(prompt: &Prompt, raw: &RawResponse) -> u32 {
    if let Some(usage) = raw.usage {
        return usage.total();
    }
    if !raw.succeeded {
        return 0;
    }
    let chars = prompt.char_len() + raw.text.chars().count();
    u32::try_from(chars.div_ceil(4)).unwrap_or(u32::MAX)
}

impl TailorOutcome {
    /// The audit-log row for this run. Persisting it is the caller's job.
    pub fn analysis_record(&self, original: &OriginalCvRecord, job_description: &str) -> AnalysisRecord {
        let (failure_stage, failure_reason) = match &self.provenance {
            Provenance::Tailored => (None, None),
            Provenance::Fallback { stage, reason } => {
                (Some(stage.as_str().to_string()), Some(reason.clone()))
            }
        };
        let confidence_score = match (&self.provenance, self.metadata.extraction_stage) {
            (Provenance::Tailored, Some(stage)) => stage.confidence(),
            _ => 0.0,
        };

        AnalysisRecord {
            id: Uuid::new_v4(),
            cv_id: original.id,
            user_id: original.user_id,
            analysis_type: ANALYSIS_TYPE_TAILORING.to_string(),
            input_data: json!({
                "cv_title": original.title,
                "job_description": job_description,
                "requested_model": self.metadata.requested_model,
                "ats_before": self.ats_before,
            }),
            output_data: json!({
                "document": self.document,
                "provenance": self.provenance,
                "ats_after": self.ats_after,
                "attempts": self.metadata.attempts,
                "provider": self.metadata.provider,
            }),
            requested_model: self.metadata.requested_model.clone(),
            model_used: self.metadata.model_used.clone(),
            provider_fallback: self.metadata.provider_fallback,
            is_fallback_document: self.is_fallback,
            tokens_used: i32::try_from(self.metadata.tokens_used).unwrap_or(i32::MAX),
            response_time_ms: i64::try_from(self.metadata.response_time_ms).unwrap_or(i64::MAX),
            cost: self.metadata.cost,
            success: !self.is_fallback,
            failure_stage,
            failure_reason,
            confidence_score,
            quality_score: self.ats_after.score as f64 / 100.0,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::cv::{ContactInfo, ExperienceEntry, SkillMap};
    use crate::providers::dispatcher::testing::{dispatcher_with, ScriptedClient, Step};
    use crate::providers::ErrorKind;

    const JD: &str = "Backend engineer: Rust, Kafka and PostgreSQL. Rust first.";

    const TAILORED_REPLY: &str = "I analyzed it. ```json\n{\"contact\":{\"name\":\"Ada Lovelace\"},\"experience\":[{\"title\":\"Backend Engineer\",\"organization\":\"Acme\",\"highlights\":[\"Built Rust services feeding Kafka and PostgreSQL\"]}],\"skills\":{\"languages\":[\"Rust\"],\"data\":[\"Kafka\",\"PostgreSQL\"]}}\n``` Thanks!";

    fn original_cv() -> OriginalCvRecord {
        let mut skills = SkillMap::new();
        skills.insert("languages".to_string(), vec!["Rust".to_string()]);
        skills.insert(
            "data".to_string(),
            vec!["Kafka".to_string(), "PostgreSQL".to_string()],
        );
        OriginalCvRecord {
            id: Uuid::new_v4(),
            user_id: Some(Uuid::new_v4()),
            title: "Main CV".to_string(),
            contact: ContactInfo {
                name: "Ada Lovelace".to_string(),
                ..Default::default()
            },
            experience: vec![ExperienceEntry {
                title: "Backend Engineer".to_string(),
                organization: "Acme".to_string(),
                highlights: vec!["Built services".to_string()],
                ..Default::default()
            }],
            skills,
            ..Default::default()
        }
    }

    fn request() -> TailorRequest {
        TailorRequest {
            original_cv: original_cv(),
            job_description: JD.to_string(),
            model_override: None,
            allow_fallback: None,
        }
    }

    fn pipeline(clients: Vec<(ProviderKind, Arc<ScriptedClient>)>) -> TailorPipeline {
        TailorPipeline::new(Arc::new(dispatcher_with("deepseek-chat", clients)), true)
    }

    #[tokio::test]
    async fn test_fenced_reply_is_tailored() {
        let pipeline = pipeline(vec![(
            ProviderKind::PrimaryChat,
            ScriptedClient::replying(TAILORED_REPLY),
        )]);

        let outcome = pipeline.run(&request()).await;
        assert_eq!(outcome.provenance, Provenance::Tailored);
        assert!(!outcome.is_fallback);
        assert!(!outcome.document.is_fallback());
        assert_eq!(outcome.metadata.extraction_stage, Some(ExtractionStage::Fenced));
        assert_eq!(outcome.metadata.model_used, "deepseek-chat");
        assert!(!outcome.metadata.provider_fallback);
        assert_eq!(
            outcome.document.experience()[0].highlights[0],
            "Built Rust services feeding Kafka and PostgreSQL"
        );
    }

    #[tokio::test]
    async fn test_apology_falls_back_to_original() {
        let pipeline = pipeline(vec![(
            ProviderKind::PrimaryChat,
            ScriptedClient::replying("Sorry, I cannot process this request."),
        )]);

        let req = request();
        let outcome = pipeline.run(&req).await;
        assert!(outcome.is_fallback);
        assert!(matches!(
            outcome.provenance,
            Provenance::Fallback {
                stage: PipelineStage::Extracting,
                ..
            }
        ));
        assert_eq!(outcome.document.experience(), req.original_cv.experience.as_slice());
        assert_eq!(outcome.document.skills(), &req.original_cv.skills);
        assert_eq!(outcome.document.contact(), &req.original_cv.contact);
    }

    #[tokio::test]
    async fn test_schema_failure_falls_back_at_validation() {
        let pipeline = pipeline(vec![(
            ProviderKind::PrimaryChat,
            ScriptedClient::replying(r#"{"contact": {}, "experience": []}"#),
        )]);

        let outcome = pipeline.run(&request()).await;
        match &outcome.provenance {
            Provenance::Fallback { stage, reason } => {
                assert_eq!(*stage, PipelineStage::Validating);
                assert!(reason.contains("skills"), "{reason}");
            }
            other => panic!("expected fallback, got {other:?}"),
        }
        assert_eq!(outcome.metadata.extraction_stage, Some(ExtractionStage::Direct));
    }

    #[tokio::test]
    async fn test_exhausted_providers_fall_back_at_dispatch() {
        let pipeline = pipeline(vec![
            (
                ProviderKind::PrimaryChat,
                ScriptedClient::new(vec![Step::Fail(ErrorKind::Auth)]),
            ),
            (
                ProviderKind::FallbackProviderA,
                ScriptedClient::new(vec![Step::Fail(ErrorKind::RateLimited)]),
            ),
        ]);

        let outcome = pipeline.run(&request()).await;
        assert!(outcome.is_fallback);
        match &outcome.provenance {
            Provenance::Fallback { stage, .. } => assert_eq!(*stage, PipelineStage::Dispatching),
            other => panic!("expected fallback, got {other:?}"),
        }
        assert_eq!(outcome.metadata.tokens_used, 0);
        assert_eq!(outcome.metadata.cost, 0.0);
    }

    #[tokio::test]
    async fn test_provider_fallback_is_recorded() {
        let pipeline = pipeline(vec![
            (
                ProviderKind::PrimaryChat,
                ScriptedClient::new(vec![Step::Fail(ErrorKind::Server)]),
            ),
            (
                ProviderKind::FallbackProviderA,
                ScriptedClient::replying(TAILORED_REPLY),
            ),
        ]);

        let req = request();
        let outcome = pipeline.run(&req).await;
        assert_eq!(outcome.provenance, Provenance::Tailored);
        assert!(outcome.metadata.provider_fallback);
        assert_eq!(outcome.metadata.requested_model, "deepseek-chat");
        assert_eq!(outcome.metadata.model_used, "gpt-4o-mini");

        let record = outcome.analysis_record(&req.original_cv, &req.job_description);
        assert_eq!(record.requested_model, "deepseek-chat");
        assert_eq!(record.model_used, "gpt-4o-mini");
        assert!(record.provider_fallback);
        assert!(record.success);
    }

    #[tokio::test]
    async fn test_request_can_disable_provider_fallback() {
        let fallback_a = ScriptedClient::replying(TAILORED_REPLY);
        let pipeline = pipeline(vec![
            (
                ProviderKind::PrimaryChat,
                ScriptedClient::new(vec![Step::Fail(ErrorKind::Server)]),
            ),
            (ProviderKind::FallbackProviderA, fallback_a.clone()),
        ]);

        let mut req = request();
        req.allow_fallback = Some(false);
        let outcome = pipeline.run(&req).await;
        assert!(outcome.is_fallback);
        assert_eq!(fallback_a.call_count(), 0);
    }

    #[tokio::test]
    async fn test_analysis_record_for_tailored_run() {
        let pipeline = pipeline(vec![(
            ProviderKind::PrimaryChat,
            ScriptedClient::replying(TAILORED_REPLY),
        )]);

        let req = request();
        let outcome = pipeline.run(&req).await;
        let record = outcome.analysis_record(&req.original_cv, &req.job_description);

        assert_eq!(record.cv_id, req.original_cv.id);
        assert_eq!(record.user_id, req.original_cv.user_id);
        assert_eq!(record.analysis_type, "cv_tailoring");
        assert!(record.success);
        assert!(!record.is_fallback_document);
        assert_eq!(record.tokens_used, 150);
        assert!(record.cost > 0.0);
        assert!((record.confidence_score - 0.9).abs() < f64::EPSILON);
        assert!((record.quality_score - outcome.ats_after.score as f64 / 100.0).abs() < 1e-9);
        assert_eq!(record.input_data["job_description"], JD);
        assert_eq!(record.output_data["provenance"]["kind"], "tailored");
        assert!(record.failure_stage.is_none());
    }

    #[tokio::test]
    async fn test_analysis_record_for_fallback_run() {
        let pipeline = pipeline(vec![(
            ProviderKind::PrimaryChat,
            ScriptedClient::replying("no json here"),
        )]);

        let req = request();
        let outcome = pipeline.run(&req).await;
        let record = outcome.analysis_record(&req.original_cv, &req.job_description);

        assert!(!record.success);
        assert!(record.is_fallback_document);
        assert_eq!(record.failure_stage.as_deref(), Some("extracting"));
        assert_eq!(record.confidence_score, 0.0);
        assert_eq!(record.output_data["document"]["is_fallback"], true);
    }

    #[tokio::test]
    async fn test_ats_scores_are_reported() {
        let pipeline = pipeline(vec![(
            ProviderKind::PrimaryChat,
            ScriptedClient::replying(TAILORED_REPLY),
        )]);

        let outcome = pipeline.run(&request()).await;
        assert!(outcome.ats_after.score >= outcome.ats_before.score);
        assert!(outcome.ats_after.matched.contains(&"kafka".to_string()));
    }

    #[tokio::test]
    async fn test_validation_failure_names_check_and_path() {
        let pipeline = pipeline(vec![(
            ProviderKind::PrimaryChat,
            ScriptedClient::replying(r#"{"contact": {}, "experience": [], "skills": {"x": [1]}}"#),
        )]);

        let req = request();
        let outcome = pipeline.run(&req).await;
        let record = outcome.analysis_record(&req.original_cv, &req.job_description);
        assert_eq!(record.failure_stage.as_deref(), Some("validating"));
        let reason = record.failure_reason.unwrap();
        assert!(reason.starts_with("skills_mapping check failed at skills.x[0]"), "{reason}");
    }

    #[tokio::test]
    async fn test_huge_token_counts_clamp_in_analysis_record() {
        let pipeline = pipeline(vec![(
            ProviderKind::PrimaryChat,
            ScriptedClient::replying(TAILORED_REPLY),
        )]);

        let req = request();
        let mut outcome = pipeline.run(&req).await;
        outcome.metadata.tokens_used = u32::MAX;
        outcome.metadata.response_time_ms = u64::MAX;
        let record = outcome.analysis_record(&req.original_cv, &req.job_description);
        assert_eq!(record.tokens_used, i32::MAX);
        assert_eq!(record.response_time_ms, i64::MAX);
    }

    #[test]
    fn test_token_estimate_without_usage() {
        let prompt = Prompt {
            system: "abcd".to_string(),
            user: "efgh".to_string(),
        };
        let raw = RawResponse {
            text: "ij".to_string(),
            provider: ProviderKind::PrimaryChat,
            model_id: "deepseek-chat".to_string(),
            requested_model: "deepseek-chat".to_string(),
            latency_ms: 5,
            succeeded: true,
            error: None,
            error_message: None,
            attempts: 1,
            fallback_used: false,
            usage: None,
        };
        assert_eq!(tokens_used(&prompt, &raw), 3);
    }
}
