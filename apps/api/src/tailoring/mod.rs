// CV tailoring: turns an original CV plus a job description into a tailored
// document, or the original unchanged when any stage fails.
// Provider calls go through providers::dispatcher only.

pub mod ats;
pub mod extractor;
pub mod fallback;
pub mod handlers;
pub mod pipeline;
pub mod prompts;
pub mod schema;
