use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Version tag stamped on documents produced by genuine AI tailoring
/// when the model does not report its own.
pub const TAILORED_FRAMEWORK_VERSION: &str = "tailor-v1";

/// Version tag stamped on documents assembled from the untailored CV.
pub const FALLBACK_FRAMEWORK_VERSION: &str = "fallback-v1";

/// Skills grouped by category, e.g. `"languages" -> ["Rust", "Go"]`.
pub type SkillMap = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperienceEntry {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub organization: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default)]
    pub highlights: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Education {
    #[serde(default)]
    pub institution: String,
    #[serde(default)]
    pub degree: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default)]
    pub details: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
    #[serde(default)]
    pub highlights: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// The user's CV as uploaded, before any tailoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OriginalCvRecord {
    #[serde(default = "Uuid::nil")]
    pub id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub contact: ContactInfo,
    #[serde(default)]
    pub experience: Vec<ExperienceEntry>,
    #[serde(default)]
    pub skills: SkillMap,
    #[serde(default)]
    pub education: Vec<Education>,
    #[serde(default)]
    pub projects: Vec<Project>,
}

/// A CV document returned to callers of the tailoring pipeline.
///
/// `contact`, `experience` and `skills` are always populated: either the
/// schema validator accepted them from the model output, or the fallback
/// composer copied them from the original CV. `is_fallback` tells the two apart.
///
/// Fields are private so a document cannot be edited once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TailoredCvDocument {
    contact: ContactInfo,
    experience: Vec<ExperienceEntry>,
    skills: SkillMap,
    education: Vec<Education>,
    projects: Vec<Project>,
    framework_version: String,
    is_fallback: bool,
}

/// Field bundle used to build a [`TailoredCvDocument`] exactly once.
pub struct DocumentParts {
    pub contact: ContactInfo,
    pub experience: Vec<ExperienceEntry>,
    pub skills: SkillMap,
    pub education: Vec<Education>,
    pub projects: Vec<Project>,
    pub framework_version: String,
}

impl TailoredCvDocument {
    pub fn tailored(parts: DocumentParts) -> Self {
        Self::build(parts, false)
    }

    pub fn fallback(parts: DocumentParts) -> Self {
        Self::build(parts, true)
    }

    fn build(parts: DocumentParts, is_fallback: bool) -> Self {
        let DocumentParts {
            contact,
            experience,
            skills,
            education,
            projects,
            framework_version,
        } = parts;
        Self {
            contact,
            experience,
            skills,
            education,
            projects,
            framework_version,
            is_fallback,
        }
    }

    #[cfg(test)]
    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    pub fn experience(&self) -> &[ExperienceEntry] {
        &self.experience
    }

    pub fn skills(&self) -> &SkillMap {
        &self.skills
    }

    pub fn education(&self) -> &[Education] {
        &self.education
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn framework_version(&self) -> &str {
        &self.framework_version
    }

    pub fn is_fallback(&self) -> bool {
        self.is_fallback
    }
}

/// Flattens every free-text field of a CV (contact excluded) into one
/// lower-cased haystack for keyword matching.
pub fn searchable_text(
    experience: &[ExperienceEntry],
    skills: &SkillMap,
    education: &[Education],
    projects: &[Project],
) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for e in experience {
        parts.push(&e.title);
        parts.push(&e.organization);
        parts.extend(e.highlights.iter().map(String::as_str));
    }
    for (category, items) in skills {
        parts.push(category);
        parts.extend(items.iter().map(String::as_str));
    }
    for ed in education {
        parts.push(&ed.institution);
        parts.push(&ed.degree);
        if let Some(field) = &ed.field {
            parts.push(field);
        }
        parts.extend(ed.details.iter().map(String::as_str));
    }
    for p in projects {
        parts.push(&p.name);
        if let Some(desc) = &p.description {
            parts.push(desc);
        }
        parts.extend(p.technologies.iter().map(String::as_str));
        parts.extend(p.highlights.iter().map(String::as_str));
    }
    parts.join("\n").to_lowercase()
}
