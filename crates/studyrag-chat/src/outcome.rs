//! Classification of generation results.
//!
//! Upstream failures arrive as opaque text. [`classify_failure`] maps that
//! text onto a small taxonomy so callers can tell a transient rate limit or
//! a missing model (both answered with a degraded reply) from a genuine fault.
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use crate::error::GenerationError;

static RETRY_IN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)retry in\s*([0-9]+)(?:\.[0-9]+)?\s*s").expect("static regex")
});

static RETRY_DELAY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"retry_delay\s*\{[^}]*seconds:\s*(\d+)").expect("static regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GenerationOutcome {
    Success { text: String },
    RateLimited { wait_seconds: Option<u64> },
    Unavailable,
    Empty,
    Unknown { cause: String },
}

/// Outcomes that still produce a complete, user-presentable answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degraded {
    RateLimited { wait_seconds: Option<u64> },
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    Degraded(Degraded),
}

fn explicit_wait(text: &str) -> Option<u64> {
    RETRY_IN_RE
        .captures(text)
        .or_else(|| RETRY_DELAY_RE.captures(text))
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Map raw upstream failure text to an outcome. First match wins:
/// an explicit wait, then `429`/`quota`, then `404`, else `Unknown`.
pub fn classify_failure(text: &str) -> GenerationOutcome {
    if let Some(wait) = explicit_wait(text) {
        return GenerationOutcome::RateLimited { wait_seconds: Some(wait) };
    }
    if text.contains("429") || text.to_lowercase().contains("quota") {
        return GenerationOutcome::RateLimited { wait_seconds: None };
    }
    if text.contains("404") {
        return GenerationOutcome::Unavailable;
    }
    GenerationOutcome::Unknown { cause: text.to_string() }
}

/// A call that returned without error; absent or blank text is `Empty`.
pub fn classify_response(text: Option<&str>) -> GenerationOutcome {
    match text.map(str::trim) {
        Some(t) if !t.is_empty() => GenerationOutcome::Success { text: t.to_string() },
        _ => GenerationOutcome::Empty,
    }
}

impl GenerationOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, GenerationOutcome::RateLimited { .. } | GenerationOutcome::Unavailable)
    }

    pub fn into_reply(self) -> Result<Reply, GenerationError> {
        match self {
            GenerationOutcome::Success { text } => Ok(Reply::Text(text)),
            GenerationOutcome::RateLimited { wait_seconds } => {
                Ok(Reply::Degraded(Degraded::RateLimited { wait_seconds }))
            }
            GenerationOutcome::Unavailable => Ok(Reply::Degraded(Degraded::Unavailable)),
            GenerationOutcome::Empty => Err(GenerationError::Empty),
            GenerationOutcome::Unknown { cause } => Err(GenerationError::Unknown { cause }),
        }
    }
}

impl Degraded {
    pub fn message(&self) -> String {
        match self {
            Degraded::RateLimited { wait_seconds } => {
                let wait_hint = match wait_seconds {
                    Some(n) if *n > 0 => format!(" Please wait ~{n}s and try again."),
                    _ => " Please wait a bit and try again.".to_string(),
                };
                format!(
                    "You're temporarily rate-limited by the generation service.{wait_hint} \
                     If this happens often, consider switching models or raising your rate limits."
                )
            }
            Degraded::Unavailable => {
                "The selected model is unavailable right now. Please try again shortly.".to_string()
            }
        }
    }
}
