// Cross-cutting prompt fragments shared by every feature that calls a provider.
// Feature-specific prompts live next to the feature (see tailoring::prompts).

/// System prompt fragment that asks for JSON-only output.
/// Models ignore it often enough that the extractor never relies on it.
pub const JSON_ONLY_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Instruction appended to every CV-rewriting prompt.
pub const NO_FABRICATION_INSTRUCTION: &str = "\
    CRITICAL: Rephrase and reorder only. Every employer, title, date, degree, project \
    and skill in your output must already appear in the original CV. \
    Do NOT invent experience, metrics, certifications or technologies. \
    If the job description asks for something the CV does not contain, leave it out.";
