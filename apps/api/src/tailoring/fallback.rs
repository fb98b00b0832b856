//! Fallback Composer: the graceful-degradation boundary of the pipeline.
//!
//! When the provider fails, or its reply cannot be extracted or validated,
//! the caller still gets a usable document: the original CV, copied verbatim
//! and flagged `is_fallback`.

use crate::models::cv::{DocumentParts, OriginalCvRecord, TailoredCvDocument, FALLBACK_FRAMEWORK_VERSION};

/// Total: every original CV, even an empty one, yields a document.
pub fn compose(original: &OriginalCvRecord) -> TailoredCvDocument {
    TailoredCvDocument::fallback(DocumentParts {
        contact: original.contact.clone(),
        experience: original.experience.clone(),
        skills: original.skills.clone(),
        education: original.education.clone(),
        projects: original.projects.clone(),
        framework_version: FALLBACK_FRAMEWORK_VERSION.to_string(),
    })
}
