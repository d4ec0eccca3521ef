//! Semantic search over the chunk index.
//!
//! [`RetrievalEngine`] owns the embedding model lifecycle: the model is loaded
//! on first use (or on [`RetrievalEngine::preload`]) exactly once, even when
//! many searches arrive concurrently. Query embeddings are memoized in a
//! bounded FIFO cache before the index is consulted.
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use tokio::runtime::{Builder, Runtime};

use studyrag_core::config::Settings;
use studyrag_core::error::{EmbeddingError, Error, Result};
use studyrag_core::lifecycle::InitCell;
use studyrag_core::traits::{Embedder, VectorIndex};
use studyrag_core::types::{Chunk, IndexStats, MetadataFilter, RetrievalResult};
use studyrag_vector::{LanceVectorIndex, QueryEmbeddingCache};

/// Builds the embedder. Runs on the blocking pool, at most once per
/// successful initialization.
pub type EmbedderFactory =
    Arc<dyn Fn() -> std::result::Result<Box<dyn Embedder>, EmbeddingError> + Send + Sync>;

const EMBED_BATCH: usize = 64;

/// Runtime backing the blocking search form. Dropping it never blocks, so the
/// owning engine may be released from inside an async context.
struct BlockingRuntime(Option<Runtime>);

impl BlockingRuntime {
    fn start() -> Result<Self> {
        let rt = Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .map_err(|e| Error::Operation(format!("failed to start runtime: {e}")))?;
        Ok(Self(Some(rt)))
    }

    fn runtime(&self) -> Result<&Runtime> {
        self.0.as_ref().ok_or_else(|| Error::Operation("runtime unavailable".into()))
    }
}

impl Drop for BlockingRuntime {
    fn drop(&mut self) {
        if let Some(rt) = self.0.take() {
            rt.shutdown_background();
        }
    }
}

pub struct RetrievalEngine {
    index: Arc<dyn VectorIndex>,
    factory: EmbedderFactory,
    embedder: InitCell<Arc<dyn Embedder>>,
    cache: QueryEmbeddingCache,
    blocking_rt: OnceLock<BlockingRuntime>,
}

fn worker_failed(e: tokio::task::JoinError) -> Error {
    Error::Embedding(EmbeddingError::Worker(e.to_string()))
}

impl RetrievalEngine {
    pub fn new(
        index: Arc<dyn VectorIndex>,
        factory: EmbedderFactory,
        cache_capacity: usize,
    ) -> Self {
        Self {
            index,
            factory,
            embedder: InitCell::new(),
            cache: QueryEmbeddingCache::new(cache_capacity),
            blocking_rt: OnceLock::new(),
        }
    }

    /// Wire the LanceDB index and the configured embedder.
    pub fn from_settings(settings: &Settings) -> Self {
        let index = LanceVectorIndex::new(
            settings.index.persist_path().to_string_lossy(),
            settings.index.table_name.clone(),
            settings.embedding.dim,
            settings.index.batch_size,
        );
        let embedding = settings.embedding.clone();
        let factory: EmbedderFactory =
            Arc::new(move || studyrag_embed::get_default_embedder(&embedding));
        Self::new(Arc::new(index), factory, settings.cache.capacity)
    }

    pub fn cache(&self) -> &QueryEmbeddingCache { &self.cache }

    pub fn index(&self) -> &Arc<dyn VectorIndex> { &self.index }

    /// Number of embedder load attempts so far.
    pub fn load_count(&self) -> usize { self.embedder.load_count() }

    pub fn is_initialized(&self) -> bool { self.embedder.is_ready() }

    async fn embedder(&self) -> Result<Arc<dyn Embedder>> {
        let embedder = self
            .embedder
            .get_or_try_init(|| async {
                let factory = self.factory.clone();
                let start = Instant::now();
                let loaded = tokio::task::spawn_blocking(move || factory())
                    .await
                    .map_err(worker_failed)??;
                let ms = start.elapsed().as_millis() as u64;
                tracing::info!(dim = loaded.dim(), ms, "embedding model ready");
                Ok::<_, Error>(Arc::from(loaded))
            })
            .await?;
        Ok(embedder.clone())
    }

    /// Load the embedding model and open the index.
    pub async fn initialize(&self) -> Result<()> {
        self.embedder().await?;
        self.index.initialize().await?;
        Ok(())
    }

    /// Eager initialization at startup; identical to [`Self::initialize`].
    pub async fn preload(&self) -> Result<()> {
        self.initialize().await
    }

    pub async fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalResult>> {
        if k == 0 {
            return Err(Error::Operation("search requires k > 0".into()));
        }
        let embedder = self.embedder().await?;
        self.index.initialize().await?;
        let vector = match self.cache.get(query) {
            Some(v) => v,
            None => {
                let text = query.to_string();
                let v = tokio::task::spawn_blocking(move || embedder.embed_one(&text))
                    .await
                    .map_err(worker_failed)??;
                self.cache.put(query, v.clone());
                v
            }
        };
        let results = self.index.query(&vector, k, filter).await?;
        tracing::debug!(k, hits = results.len(), "search complete");
        Ok(results)
    }

    /// Blocking form of [`Self::search`] for synchronous callers. Runs on an
    /// engine-owned runtime and must not be called from inside an async context.
    pub fn search_blocking(
        &self,
        query: &str,
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalResult>> {
        self.block_on_engine(self.search(query, k, filter))?
    }

    fn block_on_engine<F: std::future::Future>(&self, fut: F) -> Result<F::Output> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(Error::Operation(
                "blocking call made from inside an async runtime; use the async form".into(),
            ));
        }
        if self.blocking_rt.get().is_none() {
            let _ = self.blocking_rt.set(BlockingRuntime::start()?);
        }
        let rt = self
            .blocking_rt
            .get()
            .ok_or_else(|| Error::Operation("runtime unavailable".into()))?
            .runtime()?;
        Ok(rt.block_on(fut))
    }

    /// Embed chunk texts with the shared model and upsert them into the index.
    pub async fn ingest(&self, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let embedder = self.embedder().await?;
        self.index.initialize().await?;
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = tokio::task::spawn_blocking(move || {
            let mut out = Vec::with_capacity(texts.len());
            for batch in texts.chunks(EMBED_BATCH) {
                out.extend(embedder.embed_batch(batch)?);
            }
            Ok::<_, EmbeddingError>(out)
        })
        .await
        .map_err(worker_failed)??;
        if vectors.len() != chunks.len() {
            let mismatch =
                EmbeddingError::CountMismatch { expected: chunks.len(), got: vectors.len() };
            return Err(mismatch.into());
        }
        Ok(self.index.add(chunks, &vectors).await?)
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        self.index.initialize().await?;
        Ok(self.index.stats().await?)
    }

    pub async fn delete_all(&self) -> Result<()> {
        self.index.initialize().await?;
        self.index.delete_all().await?;
        Ok(())
    }
}
