//! Response Extractor: recovers a JSON payload from free-text provider output.
//!
//! Strategies run in order and the first success wins:
//! 1. direct parse of the whole (trimmed) text
//! 2. fenced code blocks (` ```json ` first, untagged fences only if none is tagged)
//! 3. the first `{` and its balanced closing `}`
//! 4. artifact cleanup, then strategy 3 once more
//!
//! Later strategies are more permissive, so they only run when the earlier
//! ones fail. Every strategy is a pure `fn(&str) -> Option<Value>`.

use std::ops::Range;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStage {
    Direct,
    Fenced,
    Boundary,
    Cleanup,
}

impl ExtractionStage {
    /// How much the recovered payload can be trusted to be what the model meant.
    pub fn confidence(&self) -> f64 {
        match self {
            ExtractionStage::Direct => 1.0,
            ExtractionStage::Fenced => 0.9,
            ExtractionStage::Boundary => 0.75,
            ExtractionStage::Cleanup => 0.6,
        }
    }
}

/// A provisional JSON tree plus the strategy that recovered it.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub value: Value,
    pub stage: ExtractionStage,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("No valid JSON found in provider response")]
    NoValidJson,
}

type Strategy = fn(&str) -> Option<Value>;

const STRATEGIES: [(ExtractionStage, Strategy); 4] = [
    (ExtractionStage::Direct, parse_direct as Strategy),
    (ExtractionStage::Fenced, parse_fenced as Strategy),
    (ExtractionStage::Boundary, parse_boundary as Strategy),
    (ExtractionStage::Cleanup, parse_after_cleanup as Strategy),
];

pub fn extract(raw: &str) -> Result<Extracted, ExtractionError> {
    STRATEGIES
        .iter()
        .find_map(|(stage, strategy)| {
            strategy(raw).map(|value| Extracted {
                value,
                stage: *stage,
            })
        })
        .ok_or(ExtractionError::NoValidJson)
}

// ────────────────────────────────────────────────────────────────────────────
// Stage 1: direct parse
// ────────────────────────────────────────────────────────────────────────────

pub fn parse_direct(raw: &str) -> Option<Value> {
    serde_json::from_str(raw.trim()).ok()
}

// ────────────────────────────────────────────────────────────────────────────
// Stage 2: fenced code blocks
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
struct Fence<'a> {
    tag: Option<String>,
    body: &'a str,
}

impl Fence<'_> {
    fn is_json(&self) -> bool {
        self.tag.as_deref().is_some_and(|t| t.starts_with("json"))
    }
}

pub fn parse_fenced(raw: &str) -> Option<Value> {
    let fences = find_fences(raw);
    let tagged: Vec<&Fence> = fences.iter().filter(|f| f.is_json()).collect();
    let candidates = if tagged.is_empty() {
        fences.iter().filter(|f| f.tag.is_none()).collect()
    } else {
        tagged
    };

    candidates
        .into_iter()
        .find_map(|f| serde_json::from_str(f.body.trim()).ok())
}

/// All fenced regions in document order. An unclosed fence runs to the end
/// of the text, which covers replies cut off by the token limit.
///
/// Backtick runs inside the string literals of the first balanced object are
/// content, not fence markers.
fn find_fences(text: &str) -> Vec<Fence<'_>> {
    let quoted = balanced_object_range(text)
        .map(|range| string_literal_spans(text, range))
        .unwrap_or_default();
    let find_marker = |from: usize| {
        let mut at = from;
        while let Some(rel) = text[at..].find("```") {
            let pos = at + rel;
            if !quoted.iter().any(|span| span.contains(&pos)) {
                return Some(pos);
            }
            at = skip_backticks(text, pos);
        }
        None
    };

    let mut fences = Vec::new();
    let mut cursor = 0;

    while let Some(marker) = find_marker(cursor) {
        let open = skip_backticks(text, marker);
        let (region, next) = match find_marker(open) {
            Some(close) => (&text[open..close], close),
            None => (&text[open..], text.len()),
        };
        fences.push(split_info_string(region));
        cursor = skip_backticks(text, next);
    }

    fences
}

fn skip_backticks(text: &str, from: usize) -> usize {
    from + text[from..].len() - text[from..].trim_start_matches('`').len()
}

/// Separates the info string (` ```json `) from the fence body.
fn split_info_string(region: &str) -> Fence<'_> {
    let (first_line, rest) = match region.find('\n') {
        Some(i) => (&region[..i], &region[i + 1..]),
        None => (region, ""),
    };
    let info = first_line.trim();

    if info.is_empty() {
        return Fence {
            tag: None,
            body: rest,
        };
    }
    if info.chars().all(is_info_char) {
        return Fence {
            tag: Some(info.to_ascii_lowercase()),
            body: rest,
        };
    }

    // Inline form: ```json {"a": 1}```
    let lead = first_line.len() - first_line.trim_start().len();
    let inline_tagged = region
        .get(lead..lead + 4)
        .is_some_and(|t| t.eq_ignore_ascii_case("json"))
        && !region[lead + 4..].starts_with(|c: char| c.is_alphanumeric());
    if inline_tagged {
        return Fence {
            tag: Some("json".to_string()),
            body: &region[lead + 4..],
        };
    }

    Fence {
        tag: None,
        body: region,
    }
}

fn is_info_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '.' | '#')
}

// ────────────────────────────────────────────────────────────────────────────
// Stage 3: boundary matching
// ────────────────────────────────────────────────────────────────────────────

pub fn parse_boundary(raw: &str) -> Option<Value> {
    balanced_object(raw).and_then(|s| serde_json::from_str(s).ok())
}

/// The substring from the first `{` to its matching `}`.
///
/// Braces inside string literals (including escaped quotes) do not count
/// toward depth. Returns `None` when the object never closes.
fn balanced_object(text: &str) -> Option<&str> {
    balanced_object_range(text).map(|range| &text[range])
}

fn balanced_object_range(text: &str) -> Option<Range<usize>> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in text[start..].char_indices() {
        if in_string {
            if escape_next {
                escape_next = false;
            } else if c == '\\' {
                escape_next = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start..start + i + 1);
                }
            }
            _ => {}
        }
    }

    None
}

/// Byte ranges of the string literals (quotes included) inside `range`.
fn string_literal_spans(text: &str, range: Range<usize>) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut open: Option<usize> = None;
    let mut escape_next = false;

    for (i, c) in text[range.clone()].char_indices() {
        let pos = range.start + i;
        match open {
            Some(start) => {
                if escape_next {
                    escape_next = false;
                } else if c == '\\' {
                    escape_next = true;
                } else if c == '"' {
                    spans.push(start..pos + 1);
                    open = None;
                }
            }
            None if c == '"' => open = Some(pos),
            None => {}
        }
    }

    spans
}

// ────────────────────────────────────────────────────────────────────────────
// Stage 4: cleanup and retry
// ────────────────────────────────────────────────────────────────────────────

pub fn parse_after_cleanup(raw: &str) -> Option<Value> {
    parse_boundary(&clean_artifacts(raw))
}

/// Strips the usual chat-model debris around and inside a JSON object:
/// fence marker lines, `> ` quote prefixes, commentary lines before the
/// first line that opens an object, text after the last `}`, and trailing
/// commas before `}` or `]`.
fn clean_artifacts(raw: &str) -> String {
    let lines: Vec<&str> = raw
        .lines()
        .filter(|l| !l.trim_start().starts_with("```"))
        .map(strip_quote_marker)
        .collect();

    let first_object_line = lines
        .iter()
        .position(|l| l.trim_start().starts_with('{'))
        .unwrap_or(0);
    let joined = lines[first_object_line..].join("\n");

    let body = match (joined.find('{'), joined.rfind('}')) {
        (Some(start), Some(end)) if start < end => &joined[start..=end],
        _ => return String::new(),
    };

    remove_trailing_commas(body)
}

fn strip_quote_marker(line: &str) -> &str {
    let trimmed = line.trim_start();
    match trimmed.strip_prefix('>') {
        Some(rest) => rest.strip_prefix(' ').unwrap_or(rest),
        None => line,
    }
}

fn remove_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escape_next = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            if escape_next {
                escape_next = false;
            } else if c == '\\' {
                escape_next = true;
            } else if c == '"' {
                in_string = false;
            }
            out.push(c);
            continue;
        }
        if c == '"' {
            in_string = true;
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CV_JSON: &str = r#"{"contact":{"name":"Ada"},"experience":[],"skills":{"languages":["Rust"]}}"#;

    fn cv_value() -> Value {
        serde_json::from_str(CV_JSON).unwrap()
    }

    #[test]
    fn test_clean_json_uses_direct_stage() {
        let extracted = extract(CV_JSON).unwrap();
        assert_eq!(extracted.stage, ExtractionStage::Direct);
        assert_eq!(extracted.value, cv_value());
    }

    #[test]
    fn test_surrounding_whitespace_still_direct() {
        let extracted = extract(&format!("\n\n  {CV_JSON}  \n")).unwrap();
        assert_eq!(extracted.stage, ExtractionStage::Direct);
    }

    #[test]
    fn test_scalars_and_arrays_parse_directly() {
        assert_eq!(extract("[1, 2]").unwrap().value, json!([1, 2]));
        assert_eq!(extract("42").unwrap().stage, ExtractionStage::Direct);
    }

    #[test]
    fn test_json_fence_uses_fenced_stage() {
        let raw = format!("```json\n{CV_JSON}\n```");
        let extracted = extract(&raw).unwrap();
        assert_eq!(extracted.stage, ExtractionStage::Fenced);
        assert_eq!(extracted.value, cv_value());
    }

    #[test]
    fn test_fence_with_prose_around_it() {
        let raw = format!("I analyzed it. ```json\n{CV_JSON}\n``` Thanks!");
        let extracted = extract(&raw).unwrap();
        assert_eq!(extracted.stage, ExtractionStage::Fenced);
        assert_eq!(extracted.value, cv_value());
    }

    #[test]
    fn test_uppercase_tag_is_recognised() {
        let raw = "Result:\n```JSON\n{\"a\": 1}\n```";
        assert_eq!(extract(raw).unwrap().stage, ExtractionStage::Fenced);
    }

    #[test]
    fn test_untagged_fence_used_when_no_tagged_fence() {
        let raw = "Here you go:\n```\n{\"a\": 1}\n```\n";
        let extracted = extract(raw).unwrap();
        assert_eq!(extracted.stage, ExtractionStage::Fenced);
        assert_eq!(extracted.value, json!({"a": 1}));
    }

    #[test]
    fn test_tagged_fence_preferred_over_earlier_untagged() {
        let raw = "```\n{\"a\": 1}\n```\nand the real one\n```json\n{\"b\": 2}\n```";
        assert_eq!(extract(raw).unwrap().value, json!({"b": 2}));
    }

    #[test]
    fn test_first_parseable_fence_wins() {
        let raw = "```json\n{\"broken\": \n```\n```json\n{\"ok\": true}\n```\n```json\n{\"later\": 1}\n```";
        let extracted = extract(raw).unwrap();
        assert_eq!(extracted.stage, ExtractionStage::Fenced);
        assert_eq!(extracted.value, json!({"ok": true}));
    }

    #[test]
    fn test_non_json_tagged_fence_is_ignored() {
        let raw = "```python\nprint(payload)\n```\nAnswer: {\"a\": 1}";
        let extracted = extract(raw).unwrap();
        assert_eq!(extracted.stage, ExtractionStage::Boundary);
        assert_eq!(extracted.value, json!({"a": 1}));
    }

    #[test]
    fn test_inline_fence() {
        let raw = "Sure: ```json {\"a\": 1}```";
        let extracted = extract(raw).unwrap();
        assert_eq!(extracted.stage, ExtractionStage::Fenced);
        assert_eq!(extracted.value, json!({"a": 1}));
    }

    #[test]
    fn test_unclosed_fence_runs_to_end() {
        let raw = "```json\n{\"a\": [1, 2]}\n";
        let extracted = extract(raw).unwrap();
        assert_eq!(extracted.stage, ExtractionStage::Fenced);
        assert_eq!(extracted.value, json!({"a": [1, 2]}));
    }

    #[test]
    fn test_prose_wrapped_json_uses_boundary_stage() {
        let raw = format!("Here is the result:\n{CV_JSON}\nHope this helps!");
        let extracted = extract(&raw).unwrap();
        assert_eq!(extracted.stage, ExtractionStage::Boundary);
        assert_eq!(extracted.value, cv_value());
    }

    #[test]
    fn test_braces_inside_strings_do_not_break_matching() {
        let raw = r#"Here is the result:
{"note": "use {curly} braces", "closing": "}}}", "nested": {"x": "{"}}
Hope this helps!"#;
        let extracted = extract(raw).unwrap();
        assert_eq!(extracted.stage, ExtractionStage::Boundary);
        assert_eq!(extracted.value["note"], "use {curly} braces");
        assert_eq!(extracted.value["nested"]["x"], "{");
    }

    #[test]
    fn test_escaped_quotes_inside_strings() {
        let raw = r#"Output: {"quote": "she said \"hi {there}\"", "n": 1} -- end"#;
        let extracted = extract(raw).unwrap();
        assert_eq!(extracted.value["quote"], "she said \"hi {there}\"");
        assert_eq!(extracted.value["n"], 1);
    }

    #[test]
    fn test_trailing_prose_with_braces_is_ignored() {
        let raw = "{\"a\": 1}\nLet me know if you want {more} changes.";
        let extracted = extract(raw).unwrap();
        assert_eq!(extracted.stage, ExtractionStage::Boundary);
        assert_eq!(extracted.value, json!({"a": 1}));
    }

    #[test]
    fn test_leading_commentary_with_braces_needs_cleanup() {
        let raw = "I replaced the {name} placeholder.\n{\n  \"a\": 1\n}\nDone.";
        let extracted = extract(raw).unwrap();
        assert_eq!(extracted.stage, ExtractionStage::Cleanup);
        assert_eq!(extracted.value, json!({"a": 1}));
    }

    #[test]
    fn test_trailing_commas_need_cleanup() {
        let raw = "Result:\n{\"skills\": [\"Rust\", \"Go\",], \"x\": {\"y\": 1,},}\nThanks";
        let extracted = extract(raw).unwrap();
        assert_eq!(extracted.stage, ExtractionStage::Cleanup);
        assert_eq!(extracted.value, json!({"skills": ["Rust", "Go"], "x": {"y": 1}}));
    }

    #[test]
    fn test_trailing_comma_inside_string_is_kept() {
        let raw = "{\"a\": \"x,}\", \"b\": [1,],}";
        let extracted = extract(raw).unwrap();
        assert_eq!(extracted.value, json!({"a": "x,}", "b": [1]}));
    }

    #[test]
    fn test_quote_markers_need_cleanup() {
        let raw = "> {\n>   \"a\": 1\n> }";
        let extracted = extract(raw).unwrap();
        assert_eq!(extracted.stage, ExtractionStage::Cleanup);
        assert_eq!(extracted.value, json!({"a": 1}));
    }

    #[test]
    fn test_apology_has_no_json() {
        assert_eq!(
            extract("Sorry, I cannot process this request."),
            Err(ExtractionError::NoValidJson)
        );
    }

    #[test]
    fn test_empty_and_whitespace_input() {
        assert_eq!(extract(""), Err(ExtractionError::NoValidJson));
        assert_eq!(extract("   \n "), Err(ExtractionError::NoValidJson));
    }

    #[test]
    fn test_unbalanced_object_fails() {
        assert_eq!(
            extract("Here: {\"a\": {\"b\": 1}"),
            Err(ExtractionError::NoValidJson)
        );
    }

    #[test]
    fn test_braces_without_json_fail() {
        assert_eq!(
            extract("Use {curly} braces for {placeholders}."),
            Err(ExtractionError::NoValidJson)
        );
    }

    #[test]
    fn test_balanced_object_handles_multibyte_text() {
        let raw = "Résumé → {\"name\": \"Zoë\", \"city\": \"Zürich\"} ✓";
        assert_eq!(
            balanced_object(raw),
            Some("{\"name\": \"Zoë\", \"city\": \"Zürich\"}")
        );
    }

    #[test]
    fn test_backticks_inside_object_strings_are_not_fences() {
        let raw = r#"Result: {"note": "wrap it as ``` [1] ``` please", "n": 2} done"#;
        let out = extract(raw).unwrap();
        assert_eq!(out.stage, ExtractionStage::Boundary);
        assert_eq!(out.value, json!({"note": "wrap it as ``` [1] ``` please", "n": 2}));
    }

    #[test]
    fn test_fence_body_may_contain_backticks_in_strings() {
        let raw = "Here:\n```json\n{\"cmd\": \"```sh\"}\n```\nok";
        let out = extract(raw).unwrap();
        assert_eq!(out.stage, ExtractionStage::Fenced);
        assert_eq!(out.value, json!({"cmd": "```sh"}));
    }

    #[test]
    fn test_find_fences_splits_tags() {
        let fences = find_fences("a ```json\n{}\n``` b ```\n[]\n``` c");
        assert_eq!(fences.len(), 2);
        assert_eq!(fences[0].tag.as_deref(), Some("json"));
        assert_eq!(fences[1].tag, None);
        assert_eq!(fences[1].body.trim(), "[]");
    }

    #[test]
    fn test_confidence_decreases_with_permissiveness() {
        let stages = [
            ExtractionStage::Direct,
            ExtractionStage::Fenced,
            ExtractionStage::Boundary,
            ExtractionStage::Cleanup,
        ];
        for pair in stages.windows(2) {
            assert!(pair[0].confidence() > pair[1].confidence());
        }
    }
}
