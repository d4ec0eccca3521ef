use std::sync::Arc;
use std::time::Instant;

use studyrag_core::config::GenerationSettings;

use crate::client::{GenerationClient, GenerationRequest};
use crate::outcome::{classify_failure, classify_response, GenerationOutcome};

/// One generation call per request, classified; no retries.
#[derive(Clone)]
pub struct GenerationOrchestrator {
    client: Arc<dyn GenerationClient>,
    temperature: f32,
    max_output_tokens: u32,
}

impl GenerationOrchestrator {
    pub fn new(client: Arc<dyn GenerationClient>, settings: &GenerationSettings) -> Self {
        Self {
            client,
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
        }
    }

    pub fn request(&self, prompt: impl Into<String>) -> GenerationRequest {
        GenerationRequest {
            prompt: prompt.into(),
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
        }
    }

    pub async fn generate(&self, prompt: impl Into<String>) -> GenerationOutcome {
        let request = self.request(prompt);
        let start = Instant::now();
        let outcome = match self.client.generate(&request).await {
            Ok(text) => classify_response(text.as_deref()),
            Err(failure) => classify_failure(&failure.0),
        };
        let ms = start.elapsed().as_millis() as u64;
        match &outcome {
            GenerationOutcome::Success { text } => {
                tracing::info!(ms, chars = text.len(), "generation succeeded");
            }
            GenerationOutcome::RateLimited { wait_seconds } => {
                tracing::warn!(ms, ?wait_seconds, "generation rate limited");
            }
            GenerationOutcome::Unavailable => tracing::warn!(ms, "generation model unavailable"),
            GenerationOutcome::Empty => tracing::error!(ms, "generation returned empty text"),
            GenerationOutcome::Unknown { cause } => {
                tracing::error!(ms, %cause, "generation failed");
            }
        }
        outcome
    }
}
