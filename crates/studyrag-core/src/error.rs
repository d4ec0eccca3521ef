use thiserror::Error;

/// The embedding provider could not produce a vector.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Embedding model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Embedding inference failed: {0}")]
    Inference(String),

    #[error("Embedder returned {got} vectors for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },

    #[error("Embedding worker failed: {0}")]
    Worker(String),
}

/// Storage or query failure inside the vector index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Vector index is not initialized")]
    NotInitialized,

    #[error("Vector dimension mismatch: got {got}, expected {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("{chunks} chunks but {vectors} vectors")]
    LengthMismatch { chunks: usize, vectors: usize },

    #[error("Unsupported filter key: {0}")]
    InvalidFilter(String),

    #[error(
        "Add failed at batch {failed_batch} (last committed batch: {}): {source}",
        .last_committed_batch.map_or_else(|| "none".to_string(), |b| b.to_string())
    )]
    PartialAdd {
        last_committed_batch: Option<usize>,
        failed_batch: usize,
        #[source]
        source: Box<IndexError>,
    },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl IndexError {
    /// Offset (in chunks) from which a failed add can be resumed.
    pub fn resume_offset(&self, batch_size: usize) -> Option<usize> {
        match self {
            IndexError::PartialAdd { failed_batch, .. } => Some(failed_batch * batch_size),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("Operation failed: {0}")]
    Operation(String),
}

pub type Result<T> = std::result::Result<T, Error>;
