use thiserror::Error;

/// Fatal generation outcomes. Degraded outcomes are never raised.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generation returned an empty response")]
    Empty,

    #[error("Generation failed: {cause}")]
    Unknown { cause: String },
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Retrieval failed: {0}")]
    Retrieval(#[from] studyrag_core::error::Error),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

pub type Result<T> = std::result::Result<T, ChatError>;
