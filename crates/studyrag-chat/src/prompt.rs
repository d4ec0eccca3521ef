//! Tutor prompt composition.
use serde::{Deserialize, Serialize};
use std::fmt;

use studyrag_core::types::RetrievalResult;

const HISTORY_TURNS: usize = 4;
const HISTORY_CHARS: usize = 200;
const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptStyle {
    #[default]
    Explanation,
    Plan,
    Example,
    Summary,
    ProblemSolving,
    Quiz,
}

impl PromptStyle {
    /// Unknown names fall back to [`PromptStyle::Explanation`].
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "plan" => PromptStyle::Plan,
            "example" => PromptStyle::Example,
            "summary" => PromptStyle::Summary,
            "problem_solving" => PromptStyle::ProblemSolving,
            "quiz" => PromptStyle::Quiz,
            _ => PromptStyle::Explanation,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PromptStyle::Explanation => "explanation",
            PromptStyle::Plan => "plan",
            PromptStyle::Example => "example",
            PromptStyle::Summary => "summary",
            PromptStyle::ProblemSolving => "problem_solving",
            PromptStyle::Quiz => "quiz",
        }
    }

    pub fn hint(&self) -> &'static str {
        match self {
            PromptStyle::Explanation => {
                "Give a clear, steadily paced explanation that builds intuition."
            }
            PromptStyle::Plan => {
                "Lay out a short plan or sequence of steps the student can follow next."
            }
            PromptStyle::Example => {
                "Work through one example that illustrates the idea with minimal setup."
            }
            PromptStyle::Summary => {
                "Summarize the key points crisply without opening new tangents."
            }
            PromptStyle::ProblemSolving => "Show the reasoning path to the solution step by step.",
            PromptStyle::Quiz => {
                "Ask 2-3 short check-yourself questions, each followed by a brief answer."
            }
        }
    }
}

impl fmt::Display for PromptStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    fn label(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Assistant => "ASSISTANT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

fn display_source(source: &str) -> String {
    let name = source.replace(".pdf", "");
    if name.trim().is_empty() { "Unknown Source".to_string() } else { name }
}

/// Render retrieved chunks as prompt context. Blank chunks are skipped;
/// the result may be empty.
pub fn build_context(results: &[RetrievalResult]) -> String {
    results
        .iter()
        .filter(|r| !r.text.trim().is_empty())
        .map(|r| format!("From {}:\n{}", display_source(&r.metadata.source), r.text))
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

pub fn render_history(history: &[ChatMessage]) -> String {
    if history.is_empty() {
        return String::new();
    }
    let start = history.len().saturating_sub(HISTORY_TURNS);
    let mut out = String::from("\n\nPrevious conversation:\n");
    for msg in &history[start..] {
        let excerpt: String = msg.content.chars().take(HISTORY_CHARS).collect();
        out.push_str(&format!("{}: {}...\n", msg.role.label(), excerpt));
    }
    out
}

pub fn tutor_prompt(
    query: &str,
    context: &str,
    history: &[ChatMessage],
    style: PromptStyle,
) -> String {
    format!(
        "You are a patient tutor whose goal is for the student to genuinely understand, \
         not to impress.\n\
         If the student greets you or chats casually, reply briefly \
         and do not introduce course material.\n\
         \n\
         Match depth to the question: slow down and ground the basics \
         when the student sounds unsure, \
         go straight to the insight when they sound confident, \
         and clarify vague questions by explaining.\n\
         Start from the simplest accurate framing and build forward one idea at a time. \
         Use examples only when they add clarity, and prefer plain language to jargon.\n\
         \n\
         Requested response style: {hint}\n\
         \n\
         Treat the following material as authoritative context:\n\
         {context}\
         {history}\n\
         \n\
         Student's question:\n\
         {query}\n\
         \n\
         Answer directly without preamble, explain the reasoning as you go, \
         mention a common misunderstanding if there is one, \
         and stop when the explanation is complete.",
        hint = style.hint(),
        context = context,
        history = render_history(history),
        query = query,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use studyrag_core::types::ChunkMetadata;

    fn result(source: &str, text: &str) -> RetrievalResult {
        RetrievalResult {
            text: text.into(),
            metadata: ChunkMetadata {
                source: source.into(),
                chunk_id: 0,
                total_chunks: 1,
                origin_path: String::new(),
            },
            distance: Some(0.1),
        }
    }

    #[test]
    fn unknown_style_falls_back_to_explanation() {
        assert_eq!(PromptStyle::parse("quiz"), PromptStyle::Quiz);
        assert_eq!(PromptStyle::parse("Problem_Solving"), PromptStyle::ProblemSolving);
        assert_eq!(PromptStyle::parse("limerick"), PromptStyle::Explanation);
        assert_eq!(PromptStyle::default().as_str(), "explanation");
    }

    #[test]
    fn context_strips_pdf_and_skips_blank_chunks() {
        let ctx = build_context(&[
            result("cell_biology.pdf", "Ribosomes build proteins."),
            result("empty.pdf", "   "),
            result("", "Orphan text."),
        ]);
        assert_eq!(
            ctx,
            "From cell_biology:\nRibosomes build proteins.\n\n---\n\n\
             From Unknown Source:\nOrphan text."
        );
        assert_eq!(build_context(&[]), "");
    }

    #[test]
    fn history_keeps_last_four_and_truncates() {
        let long = "x".repeat(500);
        let history = vec![
            ChatMessage::user("first"),
            ChatMessage::assistant("second"),
            ChatMessage::user("third"),
            ChatMessage::assistant(long),
            ChatMessage::user("fifth"),
        ];
        let rendered = render_history(&history);
        assert!(rendered.starts_with("\n\nPrevious conversation:\n"));
        assert!(!rendered.contains("first"));
        assert!(rendered.contains("ASSISTANT: second...\n"));
        assert!(rendered.contains(&format!("ASSISTANT: {}...\n", "x".repeat(200))));
        assert!(!rendered.contains(&"x".repeat(201)));
        assert!(rendered.ends_with("USER: fifth...\n"));
        assert_eq!(render_history(&[]), "");
    }

    #[test]
    fn prompt_embeds_style_context_and_question() {
        let context = "From optics:\nRayleigh scattering.";
        let prompt = tutor_prompt("Why is the sky blue?", context, &[], PromptStyle::Summary);
        assert!(prompt.contains(PromptStyle::Summary.hint()));
        assert!(prompt.contains("From optics:\nRayleigh scattering."));
        assert!(prompt.contains("Student's question:\nWhy is the sky blue?"));
        assert!(!prompt.contains("Previous conversation"));
    }
}
