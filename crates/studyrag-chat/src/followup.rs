//! Suggested follow-up questions.
//!
//! A cheap heuristic gate decides whether suggestions are worth a second
//! generation call; the reply is then parsed leniently. Nothing here can
//! fail a chat turn: any problem yields no suggestions.
use regex::Regex;
use std::sync::LazyLock;

use crate::orchestrator::GenerationOrchestrator;
use crate::outcome::GenerationOutcome;

const MAX_FOLLOW_UPS: usize = 2;
const RESPONSE_EXCERPT_CHARS: usize = 500;

const GREETINGS: [&str; 7] = ["hi", "hello", "hey", "thanks", "thank you", "bye", "goodbye"];
const PROCEDURAL: [&str; 5] =
    ["how do i", "where can i", "show me how", "can you help", "i need help with"];
const NO_CONTEXT: [&str; 3] = ["i don't have", "no information", "cannot find"];

static NUMBERING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+[.):]?\s*").expect("static regex"));
static Q_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^Q[0-9]+:?\s*").expect("static regex"));

pub fn should_generate_follow_ups(query: &str, response: &str) -> bool {
    let query_lower = query.trim().to_lowercase();
    let response_lower = response.to_lowercase();
    if GREETINGS.iter().any(|g| query_lower.starts_with(g)) {
        return false;
    }
    if query.split_whitespace().count() <= 3 && !query.contains('?') {
        return false;
    }
    if response.split_whitespace().count() < 30 {
        return false;
    }
    if PROCEDURAL.iter().any(|p| query_lower.contains(p)) {
        return false;
    }
    !NO_CONTEXT.iter().any(|p| response_lower.contains(p))
}

pub fn follow_up_prompt(query: &str, response: &str) -> String {
    let excerpt: String = response.chars().take(RESPONSE_EXCERPT_CHARS).collect();
    format!(
        "Given this tutoring exchange, suggest 2 follow-up questions that take the student \
         one step deeper.\n\
         \n\
         Student asked: \"{query}\"\n\
         \n\
         Tutor explained: \"{excerpt}...\"\n\
         \n\
         Each question should explore a specific point from the explanation, \
         stay on the core topic, and be answerable from the same material.\n\
         \n\
         Format: one question per line, no numbering, no extra text. Each line ends with '?'"
    )
}

pub fn parse_follow_ups(text: &str) -> Vec<String> {
    text.trim()
        .lines()
        .filter_map(|line| {
            let q = NUMBERING_RE.replace(line.trim(), "");
            let q = Q_PREFIX_RE.replace(&q, "").trim().to_string();
            (q.ends_with('?') && q.split_whitespace().count() > 3).then_some(q)
        })
        .take(MAX_FOLLOW_UPS)
        .collect()
}

pub async fn generate_follow_ups(
    orchestrator: &GenerationOrchestrator,
    query: &str,
    response: &str,
) -> Vec<String> {
    if !should_generate_follow_ups(query, response) {
        return Vec::new();
    }
    match orchestrator.generate(follow_up_prompt(query, response)).await {
        GenerationOutcome::Success { text } => parse_follow_ups(&text),
        other => {
            tracing::warn!(outcome = ?other, "follow-up generation produced no questions");
            Vec::new()
        }
    }
}
