// Prompt constants for CV tailoring.
// Reuses cross-cutting fragments from providers::prompts.

use crate::providers::prompts::{JSON_ONLY_SYSTEM, NO_FABRICATION_INSTRUCTION};

/// System prompt for tailoring.
pub fn tailor_system() -> String {
    format!(
        "You are an expert CV writer who optimises CVs for applicant tracking systems. {JSON_ONLY_SYSTEM}"
    )
}

/// Tailoring prompt template. Replace `{cv_json}`, `{job_description}` and
/// `{no_fabrication}` before sending.
pub const TAILOR_PROMPT_TEMPLATE: &str = r#"Tailor the CV below to the job description.

{no_fabrication}

Return a JSON object with this EXACT schema:
{
  "contact": {"name": "", "email": "", "phone": "", "location": "", "linkedin": "", "website": ""},
  "experience": [
    {
      "title": "Backend Engineer",
      "organization": "Acme Corp",
      "location": "Berlin",
      "start_date": "2021-03",
      "end_date": "2024-01",
      "highlights": ["Reworded achievement using job-description vocabulary"]
    }
  ],
  "skills": {"languages": ["Rust"], "tools": ["Docker"]},
  "education": [
    {"institution": "", "degree": "", "field": "", "start_date": "", "end_date": "", "details": []}
  ],
  "projects": [
    {"name": "", "description": "", "technologies": [], "highlights": [], "url": ""}
  ],
  "framework_version": "tailor-v1"
}

Rules:
- Keep every experience entry; reorder highlights so the most relevant come first.
- Use the job description's terminology where the CV already supports it.
- Group skills into categories; list the most relevant skills first within each category.
- "contact", "experience" and "skills" are mandatory.

ORIGINAL CV (JSON):
{cv_json}

JOB DESCRIPTION:
{job_description}
"#;

pub fn build_tailor_prompt(cv_json: &str, job_description: &str) -> String {
    TAILOR_PROMPT_TEMPLATE
        .replace("{no_fabrication}", NO_FABRICATION_INSTRUCTION)
        .replace("{cv_json}", cv_json)
        .replace("{job_description}", job_description.trim())
}
