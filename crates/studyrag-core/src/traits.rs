use async_trait::async_trait;

use crate::error::{EmbeddingError, IndexError};
use crate::types::{Chunk, EmbeddingVector, IndexStats, MetadataFilter, RetrievalResult};

/// Text to fixed-dimension vectors. Implementations are blocking and must be
/// driven from a worker thread when called from async code.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, EmbeddingError>;

    fn embed_one(&self, text: &str) -> Result<EmbeddingVector, EmbeddingError> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or(EmbeddingError::CountMismatch { expected: 1, got: 0 })
    }
}

/// Persistent nearest-neighbor index over chunk embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Open or create the backing store. Idempotent and safe under concurrent callers.
    async fn initialize(&self) -> Result<(), IndexError>;

    /// Upsert chunks by identity key. An empty input is a no-op.
    async fn add(&self, chunks: &[Chunk], vectors: &[EmbeddingVector]) -> Result<usize, IndexError>;

    /// Up to `k` nearest neighbors by cosine distance, ascending.
    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalResult>, IndexError>;

    async fn delete_all(&self) -> Result<(), IndexError>;

    async fn count(&self) -> Result<usize, IndexError>;

    async fn stats(&self) -> Result<IndexStats, IndexError>;
}
