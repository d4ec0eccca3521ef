use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

/// Raw failure text from the generation backend, classified by
/// [`crate::outcome::classify_failure`].
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct UpstreamFailure(pub String);

/// The hosted text-generation capability. `Ok(None)` means the call
/// succeeded but carried no text.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<Option<String>, UpstreamFailure>;
}
