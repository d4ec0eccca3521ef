use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use studyrag_core::error::{EmbeddingError, Error, IndexError};
use studyrag_core::traits::{Embedder, VectorIndex};
use studyrag_core::types::{Chunk, EmbeddingVector, IndexStats, MetadataFilter, RetrievalResult};
use studyrag_embed::FakeEmbedder;
use studyrag_retrieval::{EmbedderFactory, RetrievalEngine};
use studyrag_vector::LanceVectorIndex;
use tempfile::TempDir;

const DIM: usize = 32;

struct CountingEmbedder {
    inner: FakeEmbedder,
    calls: Arc<AtomicUsize>,
}

impl Embedder for CountingEmbedder {
    fn dim(&self) -> usize { self.inner.dim() }
    fn max_len(&self) -> usize { self.inner.max_len() }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed_batch(texts)
    }
}

struct Counters {
    loads: Arc<AtomicUsize>,
    embeds: Arc<AtomicUsize>,
}

fn counting_factory() -> (EmbedderFactory, Counters) {
    let loads = Arc::new(AtomicUsize::new(0));
    let embeds = Arc::new(AtomicUsize::new(0));
    let (l, e) = (loads.clone(), embeds.clone());
    let factory: EmbedderFactory = Arc::new(move || {
        l.fetch_add(1, Ordering::SeqCst);
        // Widen the window in which concurrent callers race on first use.
        std::thread::sleep(Duration::from_millis(50));
        let embedder = CountingEmbedder { inner: FakeEmbedder::new(DIM), calls: e.clone() };
        Ok(Box::new(embedder) as Box<dyn Embedder>)
    });
    (factory, Counters { loads, embeds })
}

fn lance_engine(tmp: &TempDir, factory: EmbedderFactory) -> RetrievalEngine {
    let index = LanceVectorIndex::new(tmp.path().to_string_lossy(), "notegpt_documents", DIM, 100);
    RetrievalEngine::new(Arc::new(index), factory, 1000)
}

fn chunks() -> Vec<Chunk> {
    [
        "cell membranes regulate transport",
        "enzymes lower activation energy",
        "dna replication is semi conservative",
    ]
    .iter()
    .enumerate()
    .map(|(i, t)| Chunk {
        text: t.to_string(),
        source: "bio_notes.pdf".into(),
        chunk_id: i as u32,
        total_chunks: 3,
        origin_path: "uploads/bio_notes.pdf".into(),
    })
    .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_first_searches_load_model_once() {
    let tmp = TempDir::new().unwrap();
    let (factory, counters) = counting_factory();
    let engine = Arc::new(lance_engine(&tmp, factory));
    engine.ingest(&chunks()).await.unwrap();
    assert_eq!(counters.loads.load(Ordering::SeqCst), 1);

    let tmp2 = TempDir::new().unwrap();
    let (factory, counters) = counting_factory();
    let cold = Arc::new(lance_engine(&tmp2, factory));
    let mut handles = Vec::new();
    for i in 0..64 {
        let engine = cold.clone();
        let query = format!("question {i}");
        handles.push(tokio::spawn(async move { engine.search(&query, 3, None).await }));
    }
    for h in handles {
        h.await.unwrap().expect("search");
    }
    assert_eq!(counters.loads.load(Ordering::SeqCst), 1);
    assert_eq!(cold.load_count(), 1);
    assert!(cold.is_initialized());
}

#[tokio::test]
async fn identical_searches_embed_once() {
    let tmp = TempDir::new().unwrap();
    let (factory, counters) = counting_factory();
    let engine = lance_engine(&tmp, factory);
    engine.ingest(&chunks()).await.unwrap();
    let before = counters.embeds.load(Ordering::SeqCst);

    let first = engine.search("how do enzymes work", 2, None).await.unwrap();
    let second = engine.search("how do enzymes work", 2, None).await.unwrap();
    assert_eq!(counters.embeds.load(Ordering::SeqCst) - before, 1);
    assert_eq!(first, second);
    assert_eq!(engine.cache().len(), 1);
}

#[tokio::test]
async fn ingest_then_search_ranks_exact_text_first() {
    let tmp = TempDir::new().unwrap();
    let (factory, _) = counting_factory();
    let engine = lance_engine(&tmp, factory);
    assert_eq!(engine.ingest(&[]).await.unwrap(), 0);
    assert_eq!(engine.ingest(&chunks()).await.unwrap(), 3);

    let hits = engine.search("enzymes lower activation energy", 3, None).await.unwrap();
    assert_eq!(hits[0].metadata.chunk_id, 1);
    assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));

    let filter = MetadataFilter::new().with("chunk_id", 2u32);
    let hits = engine.search("enzymes", 3, Some(&filter)).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].metadata.chunk_id, 2);

    let stats = engine.stats().await.unwrap();
    assert_eq!(stats.count, 3);
    engine.delete_all().await.unwrap();
    assert_eq!(engine.stats().await.unwrap().count, 0);
}

#[tokio::test]
async fn zero_k_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let (factory, _) = counting_factory();
    let engine = lance_engine(&tmp, factory);
    assert!(matches!(engine.search("q", 0, None).await, Err(Error::Operation(_))));
}

#[tokio::test]
async fn failed_model_load_is_retried() {
    let tmp = TempDir::new().unwrap();
    let attempts = Arc::new(AtomicUsize::new(0));
    let a = attempts.clone();
    let factory: EmbedderFactory = Arc::new(move || {
        if a.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(EmbeddingError::ModelUnavailable("weights missing".into()));
        }
        Ok(Box::new(FakeEmbedder::new(DIM)) as Box<dyn Embedder>)
    });
    let engine = lance_engine(&tmp, factory);
    let err = engine.preload().await.unwrap_err();
    assert!(matches!(err, Error::Embedding(EmbeddingError::ModelUnavailable(_))));
    assert!(!engine.is_initialized());
    engine.preload().await.expect("second load succeeds");
    assert_eq!(engine.load_count(), 2);
}

struct BrokenIndex;

#[async_trait]
impl VectorIndex for BrokenIndex {
    async fn initialize(&self) -> Result<(), IndexError> { Ok(()) }
    async fn add(&self, _: &[Chunk], _: &[EmbeddingVector]) -> Result<usize, IndexError> {
        Err(IndexError::Storage("read-only".into()))
    }
    async fn query(
        &self,
        _: &[f32],
        _: usize,
        _: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalResult>, IndexError> {
        Err(IndexError::Storage("corrupt fragment".into()))
    }
    async fn delete_all(&self) -> Result<(), IndexError> { Ok(()) }
    async fn count(&self) -> Result<usize, IndexError> { Ok(0) }
    async fn stats(&self) -> Result<IndexStats, IndexError> {
        Ok(IndexStats { name: "broken".into(), count: 0, location: "nowhere".into() })
    }
}

#[tokio::test]
async fn cache_is_populated_even_when_index_query_fails() {
    let (factory, counters) = counting_factory();
    let engine = RetrievalEngine::new(Arc::new(BrokenIndex), factory, 10);
    let err = engine.search("what is osmosis", 3, None).await.unwrap_err();
    assert!(matches!(err, Error::Index(IndexError::Storage(_))));
    assert_eq!(engine.cache().len(), 1);
    let _ = engine.search("what is osmosis", 3, None).await;
    assert_eq!(counters.embeds.load(Ordering::SeqCst), 1);
}

#[test]
fn blocking_search_matches_async_semantics() {
    let tmp = TempDir::new().unwrap();
    let (factory, counters) = counting_factory();
    let engine = lance_engine(&tmp, factory);
    let hits = engine.search_blocking("dna replication", 2, None).unwrap();
    assert!(hits.is_empty());
    let again = engine.search_blocking("dna replication", 2, None).unwrap();
    assert!(again.is_empty());
    assert_eq!(counters.loads.load(Ordering::SeqCst), 1);
    assert_eq!(counters.embeds.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn blocking_search_refuses_inside_runtime() {
    let (factory, _) = counting_factory();
    let engine = RetrievalEngine::new(Arc::new(BrokenIndex), factory, 10);
    assert!(matches!(engine.search_blocking("q", 1, None), Err(Error::Operation(_))));
}

#[test]
fn engine_used_blocking_can_be_dropped_inside_runtime() {
    let tmp = TempDir::new().unwrap();
    let (factory, _) = counting_factory();
    let engine = lance_engine(&tmp, factory);
    engine.search_blocking("cell membranes", 1, None).unwrap();

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async move {
        tokio::task::yield_now().await;
        drop(engine);
    });
}
