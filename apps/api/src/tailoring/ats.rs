//! ATS keyword scoring: how well a CV covers the vocabulary of a job description.
//!
//! Pure-Rust, deterministic, no provider call. Applicant tracking systems mostly
//! rank on literal keyword hits, so this mirrors that:
//! 1. `extract_keywords` builds a frequency-ranked keyword inventory from the JD
//! 2. `score_*` checks which keywords appear as whole tokens in the CV text
//! 3. score = Σ(frequency of matched) / Σ(frequency) × 100

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::models::cv::{searchable_text, OriginalCvRecord, TailoredCvDocument};

const MAX_KEYWORDS: usize = 40;

/// Tokens shorter than three characters are noise, except these.
const SHORT_TERMS: &[&str] = &[
    "go", "c", "r", "c#", "c++", "ai", "ml", "ui", "ux", "qa", "ci", "cd", "js", "ts", "k8s",
];

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "you", "your", "our", "are", "will", "can", "have", "has",
    "from", "this", "that", "they", "their", "who", "what", "all", "any", "not", "but", "its",
    "into", "about", "such", "than", "more", "most", "also", "etc", "including", "across",
    "within", "well", "work", "working", "team", "teams", "role", "join", "looking", "ability",
    "strong", "experience", "years", "year", "plus", "bonus", "preferred", "required",
    "requirements", "responsibilities", "must", "nice", "skills", "knowledge", "understanding",
    "using", "use", "new", "help", "other", "both", "each", "able", "should", "would",
    "need", "needs", "company", "candidate", "position", "job", "we", "us", "an", "be", "in",
    "of", "on", "or", "to", "as", "at", "by", "is", "it", "if", "do", "a",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobKeyword {
    pub keyword: String,
    pub frequency: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtsReport {
    pub score: u32, // 0 – 100
    pub matched: Vec<String>,
    pub missing: Vec<String>,
    pub recommendation: String,
}

/// Frequency-ranked keyword inventory of a job description.
/// Ties keep first-appearance order.
pub fn extract_keywords(job_description: &str) -> Vec<JobKeyword> {
    let mut order: Vec<JobKeyword> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for token in tokenize(job_description) {
        if !is_keyword(&token) {
            continue;
        }
        match index.get(&token) {
            Some(&i) => order[i].frequency += 1,
            None => {
                index.insert(token.clone(), order.len());
                order.push(JobKeyword {
                    keyword: token,
                    frequency: 1,
                });
            }
        }
    }

    // sort_by is stable, so equal frequencies keep first-appearance order
    order.sort_by(|a, b| b.frequency.cmp(&a.frequency));
    order.truncate(MAX_KEYWORDS);
    order
}

pub fn score_document(doc: &TailoredCvDocument, keywords: &[JobKeyword]) -> AtsReport {
    score_text(
        &searchable_text(doc.experience(), doc.skills(), doc.education(), doc.projects()),
        keywords,
    )
}

pub fn score_original(cv: &OriginalCvRecord, keywords: &[JobKeyword]) -> AtsReport {
    score_text(
        &searchable_text(&cv.experience, &cv.skills, &cv.education, &cv.projects),
        keywords,
    )
}

fn score_text(text: &str, keywords: &[JobKeyword]) -> AtsReport {
    if keywords.is_empty() {
        return AtsReport {
            score: 0,
            matched: vec![],
            missing: vec![],
            recommendation: "No keywords found in the job description; cannot score.".to_string(),
        };
    }

    let tokens: HashSet<String> = tokenize(text).collect();
    let mut matched = Vec::new();
    let mut missing = Vec::new();
    let mut total_weight = 0u32;
    let mut matched_weight = 0u32;

    for kw in keywords {
        total_weight += kw.frequency;
        if tokens.contains(&kw.keyword) {
            matched_weight += kw.frequency;
            matched.push(kw.keyword.clone());
        } else {
            missing.push(kw.keyword.clone());
        }
    }

    let score = ((matched_weight as f64 / total_weight as f64) * 100.0).round() as u32;
    let recommendation = build_recommendation(score, &missing);

    AtsReport {
        score,
        matched,
        missing,
        recommendation,
    }
}

/// Lower-cased tokens. `+`, `#` and inner `.`/`-` are kept so `c++`, `c#`,
/// `node.js` and `ci-cd` survive; sentence punctuation is trimmed.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || matches!(c, '+' | '#' | '.' | '-')))
        .map(|t| t.trim_matches(|c| c == '.' || c == '-'))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

fn is_keyword(token: &str) -> bool {
    if STOP_WORDS.contains(&token) || token.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    token.chars().count() >= 3 || SHORT_TERMS.contains(&token)
}

fn build_recommendation(score: u32, missing: &[String]) -> String {
    let top_missing: Vec<&str> = missing.iter().take(5).map(String::as_str).collect();

    if score >= 80 {
        "Strong ATS match. The CV covers the key job-description terms.".to_string()
    } else if score >= 50 {
        format!(
            "Moderate ATS match ({score}/100). If accurate, consider mentioning: {}.",
            top_missing.join(", ")
        )
    } else {
        format!(
            "Low ATS match ({score}/100). Missing terms: {}.",
            top_missing.join(", ")
        )
    }
}
