//! Persistence collaborator: loads stored CVs and appends tailoring audit rows.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::analysis::AnalysisRecord;
use crate::models::cv::{OriginalCvRecord, SkillMap};

/// Skill category used when a CV stores its skills as a flat list.
pub const UNCATEGORIZED_SKILLS: &str = "general";

#[async_trait]
pub trait CvRepository: Send + Sync {
    async fn load_cv(&self, cv_id: Uuid) -> Result<Option<OriginalCvRecord>>;

    async fn save_analysis(&self, record: &AnalysisRecord) -> Result<()>;
}

pub struct PgCvRepository {
    pool: PgPool,
}

impl PgCvRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CvRepository for PgCvRepository {
    async fn load_cv(&self, cv_id: Uuid) -> Result<Option<OriginalCvRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, title, contact, experience, skills, education, projects
            FROM cvs
            WHERE id = $1
            "#,
        )
        .bind(cv_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to load CV {cv_id}"))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let skills: Value = row.try_get("skills")?;
        Ok(Some(OriginalCvRecord {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            title: row.try_get("title")?,
            contact: json_column(row.try_get("contact")?, "contact")?,
            experience: json_column(row.try_get("experience")?, "experience")?,
            skills: skills_from_json(skills)?,
            education: json_column(row.try_get("education")?, "education")?,
            projects: json_column(row.try_get("projects")?, "projects")?,
        }))
    }

    async fn save_analysis(&self, record: &AnalysisRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cv_analyses
                (id, cv_id, user_id, analysis_type, input_data, output_data,
                 requested_model, model_used, provider_fallback, is_fallback_document,
                 tokens_used, response_time_ms, cost, success, failure_stage,
                 failure_reason, confidence_score, quality_score, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                    $11, $12, $13, $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(record.id)
        .bind(record.cv_id)
        .bind(record.user_id)
        .bind(&record.analysis_type)
        .bind(&record.input_data)
        .bind(&record.output_data)
        .bind(&record.requested_model)
        .bind(&record.model_used)
        .bind(record.provider_fallback)
        .bind(record.is_fallback_document)
        .bind(record.tokens_used)
        .bind(record.response_time_ms)
        .bind(record.cost)
        .bind(record.success)
        .bind(&record.failure_stage)
        .bind(&record.failure_reason)
        .bind(record.confidence_score)
        .bind(record.quality_score)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save analysis for CV {}", record.cv_id))?;

        Ok(())
    }
}

fn json_column<T: DeserializeOwned + Default>(value: Option<Value>, column: &str) -> Result<T> {
    match value {
        None | Some(Value::Null) => Ok(T::default()),
        Some(v) => serde_json::from_value(v)
            .with_context(|| format!("Column '{column}' does not match the CV shape")),
    }
}

/// Accepts both `{"category": [...]}` and a flat `[...]` of skill names.
pub fn skills_from_json(value: Value) -> Result<SkillMap> {
    match value {
        Value::Null => Ok(SkillMap::new()),
        Value::Array(items) => {
            let skills: Vec<String> = items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(s) if !s.trim().is_empty() => Some(s),
                    _ => None,
                })
                .collect();
            let mut map = SkillMap::new();
            if !skills.is_empty() {
                map.insert(UNCATEGORIZED_SKILLS.to_string(), skills);
            }
            Ok(map)
        }
        other => serde_json::from_value(other).context("Column 'skills' is not a category map"),
    }
}
