//! Answer composition on top of retrieval: tutor prompts, a single
//! classified generation call, cited sources and follow-up suggestions.
pub mod client;
pub mod error;
pub mod followup;
pub mod orchestrator;
pub mod outcome;
pub mod prompt;
pub mod service;
pub mod sources;

pub use client::{GenerationClient, GenerationRequest, UpstreamFailure};
pub use error::{ChatError, GenerationError};
pub use orchestrator::GenerationOrchestrator;
pub use outcome::{classify_failure, classify_response, Degraded, GenerationOutcome, Reply};
pub use prompt::{ChatMessage, PromptStyle, Role};
pub use service::{ChatAnswer, ChatService};
pub use sources::{relevance_score, Source};
