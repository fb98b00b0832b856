//! Schema Validator: turns a provisional JSON tree into a [`TailoredCvDocument`].
//!
//! Checks run in order and stop at the first failure:
//! (a) the top level is an object,
//! (b) `contact`, `experience` and `skills` are present and non-null,
//! (c) `experience` is an array of objects, each with a title or organization,
//! (d) `skills` maps category names to arrays of strings.
//!
//! Optional sections (`education`, `projects`) are parsed leniently: items
//! that do not fit are dropped with a warning rather than failing the run.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::models::cv::{
    ContactInfo, DocumentParts, ExperienceEntry, SkillMap, TailoredCvDocument,
    TAILORED_FRAMEWORK_VERSION,
};

const REQUIRED_KEYS: [&str; 3] = ["contact", "experience", "skills"];
const TITLE_KEYS: [&str; 3] = ["title", "role", "position"];
const ORGANIZATION_KEYS: [&str; 3] = ["organization", "company", "employer"];
const HIGHLIGHT_KEYS: [&str; 4] = ["highlights", "bullets", "achievements", "responsibilities"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaCheck {
    TopLevelObject,
    RequiredKeys,
    ExperienceEntries,
    SkillsMapping,
}

impl SchemaCheck {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaCheck::TopLevelObject => "top_level_object",
            SchemaCheck::RequiredKeys => "required_keys",
            SchemaCheck::ExperienceEntries => "experience_entries",
            SchemaCheck::SkillsMapping => "skills_mapping",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("top-level value must be an object, found {found}")]
    NotAnObject { found: &'static str },

    #[error("`{path}` is missing a required field")]
    MissingKey { check: SchemaCheck, path: String },

    #[error("`{path}` must be {expected}, found {found}")]
    WrongType {
        check: SchemaCheck,
        path: String,
        expected: &'static str,
        found: &'static str,
    },
}

impl ValidationError {
    pub fn check(&self) -> SchemaCheck {
        match self {
            ValidationError::NotAnObject { .. } => SchemaCheck::TopLevelObject,
            ValidationError::MissingKey { check, .. } | ValidationError::WrongType { check, .. } => {
                *check
            }
        }
    }

    /// Key path of the offending value; `$` is the document root.
    pub fn path(&self) -> &str {
        match self {
            ValidationError::NotAnObject { .. } => "$",
            ValidationError::MissingKey { path, .. } | ValidationError::WrongType { path, .. } => {
                path
            }
        }
    }
}

pub fn validate(candidate: &Value) -> Result<TailoredCvDocument, ValidationError> {
    // (a)
    let root = candidate.as_object().ok_or(ValidationError::NotAnObject {
        found: type_name(candidate),
    })?;

    // (b)
    for key in REQUIRED_KEYS {
        if root.get(key).map_or(true, Value::is_null) {
            return Err(ValidationError::MissingKey {
                check: SchemaCheck::RequiredKeys,
                path: key.to_string(),
            });
        }
    }
    let contact = validate_contact(&root["contact"])?;

    // (c)
    let experience = validate_experience(&root["experience"])?;

    // (d)
    let skills = validate_skills(&root["skills"])?;

    let framework_version = root
        .get("framework_version")
        .and_then(Value::as_str)
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(TAILORED_FRAMEWORK_VERSION)
        .to_string();

    Ok(TailoredCvDocument::tailored(DocumentParts {
        contact,
        experience,
        skills,
        education: parse_array_lenient(root.get("education"), "education"),
        projects: parse_array_lenient(root.get("projects"), "projects"),
        framework_version,
    }))
}

fn validate_contact(value: &Value) -> Result<ContactInfo, ValidationError> {
    let obj = value.as_object().ok_or(ValidationError::WrongType {
        check: SchemaCheck::RequiredKeys,
        path: "contact".to_string(),
        expected: "an object",
        found: type_name(value),
    })?;

    Ok(ContactInfo {
        name: first_string(obj, &["name", "full_name"]).unwrap_or_default(),
        email: first_string(obj, &["email"]),
        phone: first_string(obj, &["phone"]),
        location: first_string(obj, &["location"]),
        linkedin: first_string(obj, &["linkedin"]),
        website: first_string(obj, &["website", "portfolio"]),
    })
}

fn validate_experience(value: &Value) -> Result<Vec<ExperienceEntry>, ValidationError> {
    let items = value.as_array().ok_or(ValidationError::WrongType {
        check: SchemaCheck::ExperienceEntries,
        path: "experience".to_string(),
        expected: "an array",
        found: type_name(value),
    })?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let path = format!("experience[{i}]");
            let obj = item.as_object().ok_or_else(|| ValidationError::WrongType {
                check: SchemaCheck::ExperienceEntries,
                path: path.clone(),
                expected: "an object",
                found: type_name(item),
            })?;

            let title = first_string(obj, &TITLE_KEYS).unwrap_or_default();
            let organization = first_string(obj, &ORGANIZATION_KEYS).unwrap_or_default();
            if title.is_empty() && organization.is_empty() {
                return Err(ValidationError::MissingKey {
                    check: SchemaCheck::ExperienceEntries,
                    path: format!("{path}.title"),
                });
            }

            let mut highlights = HIGHLIGHT_KEYS
                .iter()
                .find_map(|k| obj.get(*k).and_then(Value::as_array))
                .map(|arr| string_items(arr))
                .unwrap_or_default();
            if highlights.is_empty() {
                if let Some(desc) = first_string(obj, &["description"]) {
                    highlights.push(desc);
                }
            }

            Ok(ExperienceEntry {
                title,
                organization,
                location: first_string(obj, &["location"]),
                start_date: first_string(obj, &["start_date", "from"]),
                end_date: first_string(obj, &["end_date", "to"]),
                highlights,
            })
        })
        .collect()
}

fn validate_skills(value: &Value) -> Result<SkillMap, ValidationError> {
    let obj = value.as_object().ok_or(ValidationError::WrongType {
        check: SchemaCheck::SkillsMapping,
        path: "skills".to_string(),
        expected: "an object of category -> string array",
        found: type_name(value),
    })?;

    let mut skills = SkillMap::new();
    for (category, items) in obj {
        let path = format!("skills.{category}");
        let arr = items.as_array().ok_or_else(|| ValidationError::WrongType {
            check: SchemaCheck::SkillsMapping,
            path: path.clone(),
            expected: "an array of strings",
            found: type_name(items),
        })?;

        let mut names = Vec::with_capacity(arr.len());
        for (i, item) in arr.iter().enumerate() {
            let name = item.as_str().ok_or_else(|| ValidationError::WrongType {
                check: SchemaCheck::SkillsMapping,
                path: format!("{path}[{i}]"),
                expected: "a string",
                found: type_name(item),
            })?;
            names.push(name.to_string());
        }
        skills.insert(category.clone(), names);
    }

    Ok(skills)
}

/// Parse an optional array leniently, skipping items that fail to deserialize.
fn parse_array_lenient<T: DeserializeOwned>(value: Option<&Value>, section: &str) -> Vec<T> {
    let Some(items) = value.and_then(Value::as_array) else {
        if value.is_some_and(|v| !v.is_null()) {
            warn!("Ignoring `{section}`: expected an array");
        }
        return vec![];
    };

    items
        .iter()
        .enumerate()
        .filter_map(|(i, v)| match serde_json::from_value(v.clone()) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("Dropping {section}[{i}]: {e}");
                None
            }
        })
        .collect()
}

fn first_string(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(String::from)
}

fn string_items(arr: &[Value]) -> Vec<String> {
    arr.iter()
        .filter_map(Value::as_str)
        .map(String::from)
        .collect()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_candidate() -> Value {
        json!({
            "contact": {"name": "Ada Lovelace", "email": "ada@example.com"},
            "experience": [
                {
                    "title": "Backend Engineer",
                    "organization": "Analytical Engines Ltd",
                    "start_date": "2021-01",
                    "highlights": ["Cut p99 latency by 40% with Redis caching"]
                },
                {"company": "Babbage & Co", "bullets": ["Maintained Rust services"]}
            ],
            "skills": {"languages": ["Rust", "Python"], "cloud": ["AWS"]},
            "education": [{"institution": "University of London", "degree": "BSc"}],
            "projects": [{"name": "difference-engine", "technologies": ["Rust"]}],
            "framework_version": "ats-2024"
        })
    }

    #[test]
    fn test_valid_candidate_builds_document() {
        let doc = validate(&valid_candidate()).unwrap();
        assert!(!doc.is_fallback());
        assert_eq!(doc.contact().name, "Ada Lovelace");
        assert_eq!(doc.experience().len(), 2);
        assert_eq!(doc.experience()[1].organization, "Babbage & Co");
        assert_eq!(doc.experience()[1].highlights, vec!["Maintained Rust services"]);
        assert_eq!(doc.skills()["languages"], vec!["Rust", "Python"]);
        assert_eq!(doc.education().len(), 1);
        assert_eq!(doc.projects()[0].name, "difference-engine");
        assert_eq!(doc.framework_version(), "ats-2024");
    }

    #[test]
    fn test_default_framework_version() {
        let mut candidate = valid_candidate();
        candidate.as_object_mut().unwrap().remove("framework_version");
        let doc = validate(&candidate).unwrap();
        assert_eq!(doc.framework_version(), TAILORED_FRAMEWORK_VERSION);
    }

    #[test]
    fn test_rejects_non_object_top_level() {
        let err = validate(&json!([1, 2])).unwrap_err();
        assert_eq!(err, ValidationError::NotAnObject { found: "an array" });
        assert_eq!(err.check(), SchemaCheck::TopLevelObject);
        assert!(validate(&json!("text")).is_err());
    }

    #[test]
    fn test_missing_skills_names_skills() {
        let mut candidate = valid_candidate();
        candidate.as_object_mut().unwrap().remove("skills");
        let err = validate(&candidate).unwrap_err();
        assert_eq!(err.check(), SchemaCheck::RequiredKeys);
        assert_eq!(err.path(), "skills");
    }

    #[test]
    fn test_null_contact_counts_as_missing() {
        let mut candidate = valid_candidate();
        candidate["contact"] = Value::Null;
        assert_eq!(validate(&candidate).unwrap_err().path(), "contact");
    }

    #[test]
    fn test_required_keys_checked_before_experience_shape() {
        let candidate = json!({"contact": {}, "experience": "oops"});
        let err = validate(&candidate).unwrap_err();
        assert_eq!(err.path(), "skills");
    }

    #[test]
    fn test_experience_must_be_array() {
        let mut candidate = valid_candidate();
        candidate["experience"] = json!({"title": "Engineer"});
        let err = validate(&candidate).unwrap_err();
        assert_eq!(err.check(), SchemaCheck::ExperienceEntries);
        assert_eq!(err.path(), "experience");
    }

    #[test]
    fn test_empty_experience_is_valid() {
        let mut candidate = valid_candidate();
        candidate["experience"] = json!([]);
        assert!(validate(&candidate).unwrap().experience().is_empty());
    }

    #[test]
    fn test_experience_entry_without_title_or_organization() {
        let mut candidate = valid_candidate();
        candidate["experience"] = json!([
            {"title": "A"},
            {"organization": "B"},
            {"highlights": ["Did things"]}
        ]);
        let err = validate(&candidate).unwrap_err();
        assert_eq!(err.check(), SchemaCheck::ExperienceEntries);
        assert_eq!(err.path(), "experience[2].title");
    }

    #[test]
    fn test_experience_entry_must_be_object() {
        let mut candidate = valid_candidate();
        candidate["experience"] = json!([{"title": "A"}, "Engineer at B"]);
        let err = validate(&candidate).unwrap_err();
        assert_eq!(err.path(), "experience[1]");
    }

    #[test]
    fn test_skills_must_be_mapping() {
        let mut candidate = valid_candidate();
        candidate["skills"] = json!(["Rust", "Go"]);
        let err = validate(&candidate).unwrap_err();
        assert_eq!(err.check(), SchemaCheck::SkillsMapping);
        assert_eq!(err.path(), "skills");
    }

    #[test]
    fn test_skill_items_must_be_strings() {
        let mut candidate = valid_candidate();
        candidate["skills"] = json!({"languages": ["Rust", 42]});
        let err = validate(&candidate).unwrap_err();
        assert_eq!(err.path(), "skills.languages[1]");
        assert!(err.to_string().contains("a number"));
    }

    #[test]
    fn test_skill_category_must_be_array() {
        let mut candidate = valid_candidate();
        candidate["skills"] = json!({"languages": "Rust, Go"});
        assert_eq!(validate(&candidate).unwrap_err().path(), "skills.languages");
    }

    #[test]
    fn test_bad_optional_items_are_dropped() {
        let mut candidate = valid_candidate();
        candidate["education"] = json!([{"institution": "MIT"}, "not an object", 7]);
        candidate["projects"] = json!("none");
        let doc = validate(&candidate).unwrap();
        assert_eq!(doc.education().len(), 1);
        assert!(doc.projects().is_empty());
    }

    #[test]
    fn test_document_does_not_alias_candidate() {
        let mut candidate = valid_candidate();
        let doc = validate(&candidate).unwrap();
        candidate["skills"]["languages"] = json!(["COBOL"]);
        assert_eq!(doc.skills()["languages"], vec!["Rust", "Python"]);
    }
}
