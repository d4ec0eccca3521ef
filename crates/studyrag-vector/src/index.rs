//! LanceDB-backed [`VectorIndex`].
//!
//! The table handle is opened lazily through an [`InitCell`], so concurrent
//! first callers share one open/create sequence. Adds are upserts keyed on
//! the chunk identity (`source_chunkid`) and are committed in fixed-size
//! batches; a failing batch reports the last batch that made it to disk.
use arrow_array::{Array, Float32Array, Int64Array, RecordBatch, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;

use studyrag_core::error::IndexError;
use studyrag_core::lifecycle::InitCell;
use studyrag_core::traits::VectorIndex;
use studyrag_core::types::{
    Chunk, ChunkMetadata, EmbeddingVector, FilterValue, IndexStats, MetadataFilter, RetrievalResult,
};

use crate::schema::{self, build_chunk_schema};
use crate::table::{chunks_to_record_batch, ensure_table, open_db, storage, upsert_batch};

pub const DEFAULT_BATCH_SIZE: usize = 100;

pub struct LanceVectorIndex {
    uri: String,
    table_name: String,
    dim: usize,
    batch_size: usize,
    table: InitCell<Table>,
}

impl LanceVectorIndex {
    pub fn new(
        uri: impl Into<String>,
        table_name: impl Into<String>,
        dim: usize,
        batch_size: usize,
    ) -> Self {
        Self {
            uri: uri.into(),
            table_name: table_name.into(),
            dim,
            batch_size: batch_size.max(1),
            table: InitCell::new(),
        }
    }

    pub fn at_path(path: &Path, table_name: impl Into<String>, dim: usize) -> Self {
        Self::new(path.to_string_lossy().into_owned(), table_name, dim, DEFAULT_BATCH_SIZE)
    }

    pub fn dim(&self) -> usize { self.dim }
    pub fn batch_size(&self) -> usize { self.batch_size }

    /// Number of times the open/create sequence has run.
    pub fn open_count(&self) -> usize { self.table.load_count() }

    async fn table(&self) -> Result<&Table, IndexError> {
        self.table
            .get_or_try_init(|| async {
                tracing::info!(
                    uri = %self.uri,
                    table = %self.table_name,
                    dim = self.dim,
                    "opening vector index"
                );
                let conn = open_db(&self.uri).await?;
                ensure_table(&conn, &self.table_name, build_chunk_schema(self.dim)).await
            })
            .await
    }

    /// Deduplicate and commit `chunks` in `batch_size` slices through `upsert`,
    /// stopping at the first failing batch.
    async fn commit_batches<F, Fut>(
        &self,
        chunks: &[Chunk],
        vectors: &[EmbeddingVector],
        mut upsert: F,
    ) -> Result<usize, IndexError>
    where
        F: FnMut(usize, RecordBatch) -> Fut,
        Fut: Future<Output = Result<(), IndexError>>,
    {
        let schema = build_chunk_schema(self.dim);
        let mut last_committed = None;
        let mut written = 0usize;
        for (batch_no, (chunk_batch, vector_batch)) in
            chunks.chunks(self.batch_size).zip(vectors.chunks(self.batch_size)).enumerate()
        {
            let (batch_chunks, batch_vectors) = dedupe_batch(chunk_batch, vector_batch);
            let built =
                chunks_to_record_batch(schema.clone(), &batch_chunks, &batch_vectors, self.dim);
            let result = match built {
                Ok(rb) => upsert(batch_no, rb).await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                tracing::error!(
                    batch = batch_no,
                    last_committed = ?last_committed,
                    error = %e,
                    "vector add failed"
                );
                return Err(IndexError::PartialAdd {
                    last_committed_batch: last_committed,
                    failed_batch: batch_no,
                    source: Box::new(e),
                });
            }
            written += batch_chunks.len();
            last_committed = Some(batch_no);
            tracing::debug!(batch = batch_no, rows = batch_chunks.len(), "committed vector batch");
        }
        Ok(written)
    }

    fn check_dim(&self, got: usize) -> Result<(), IndexError> {
        if got != self.dim {
            return Err(IndexError::DimensionMismatch { expected: self.dim, got });
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for LanceVectorIndex {
    async fn initialize(&self) -> Result<(), IndexError> {
        self.table().await.map(|_| ())
    }

    async fn add(
        &self,
        chunks: &[Chunk],
        vectors: &[EmbeddingVector],
    ) -> Result<usize, IndexError> {
        if chunks.len() != vectors.len() {
            return Err(IndexError::LengthMismatch { chunks: chunks.len(), vectors: vectors.len() });
        }
        if chunks.is_empty() {
            return Ok(0);
        }
        for v in vectors {
            self.check_dim(v.len())?;
        }
        let table = self.table().await?;
        let written = self.commit_batches(chunks, vectors, |_, rb| upsert_batch(table, rb)).await?;
        tracing::info!(chunks = written, table = %self.table_name, "added chunks to vector index");
        Ok(written)
    }

    async fn query(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<RetrievalResult>, IndexError> {
        self.check_dim(vector.len())?;
        let predicate = match filter {
            Some(f) if !f.is_empty() => Some(filter_to_sql(f)?),
            _ => None,
        };
        let table = self.table().await?;
        if k == 0 || table.count_rows(None).await.map_err(storage)? == 0 {
            return Ok(Vec::new());
        }
        let mut query = table
            .vector_search(vector.to_vec())
            .map_err(storage)?
            .distance_type(DistanceType::Cosine)
            .limit(k);
        if let Some(sql) = predicate {
            query = query.only_if(sql);
        }
        let batches: Vec<RecordBatch> =
            query.execute().await.map_err(storage)?.try_collect().await.map_err(storage)?;
        let mut results = Vec::new();
        for batch in &batches {
            results.extend(batch_to_results(batch)?);
        }
        results.sort_by(|a, b| match (a.distance, b.distance) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        results.truncate(k);
        Ok(results)
    }

    async fn delete_all(&self) -> Result<(), IndexError> {
        let table = self.table().await?;
        table.delete("id IS NOT NULL").await.map_err(storage)?;
        tracing::info!(table = %self.table_name, "cleared vector index");
        Ok(())
    }

    async fn count(&self) -> Result<usize, IndexError> {
        let table = self.table().await?;
        table.count_rows(None).await.map_err(storage)
    }

    async fn stats(&self) -> Result<IndexStats, IndexError> {
        let count = self.count().await?;
        Ok(IndexStats { name: self.table_name.clone(), count, location: self.uri.clone() })
    }
}

/// Within one batch, keep only the last occurrence of each identity key.
fn dedupe_batch<'a>(
    chunks: &'a [Chunk],
    vectors: &'a [EmbeddingVector],
) -> (Vec<&'a Chunk>, Vec<&'a EmbeddingVector>) {
    let mut last: HashMap<String, usize> = HashMap::with_capacity(chunks.len());
    for (i, c) in chunks.iter().enumerate() {
        last.insert(c.key(), i);
    }
    chunks
        .iter()
        .zip(vectors)
        .enumerate()
        .filter(|(i, (c, _))| last.get(&c.key()) == Some(i))
        .map(|(_, pair)| pair)
        .unzip()
}

/// Render exact-match constraints as a SQL predicate. Keys are restricted to
/// the metadata columns; text values are single-quoted with `'` doubled.
pub fn filter_to_sql(filter: &MetadataFilter) -> Result<String, IndexError> {
    let mut clauses = Vec::new();
    for (key, value) in filter.iter() {
        let numeric = schema::FILTERABLE
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, numeric)| *numeric)
            .ok_or_else(|| IndexError::InvalidFilter(key.clone()))?;
        let rendered = match (numeric, value) {
            (true, FilterValue::Int(n)) => n.to_string(),
            (true, FilterValue::Text(s)) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| {
                    IndexError::InvalidFilter(format!("{key} expects an integer, got {s:?}"))
                })?
                .to_string(),
            (false, v) => format!("'{}'", v.to_string().replace('\'', "''")),
        };
        clauses.push(format!("{key} = {rendered}"));
    }
    Ok(clauses.join(" AND "))
}

fn string_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, IndexError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| IndexError::Storage(format!("{name} column missing")))
}

fn int_col<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int64Array, IndexError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
        .ok_or_else(|| IndexError::Storage(format!("{name} column missing")))
}

fn batch_to_results(batch: &RecordBatch) -> Result<Vec<RetrievalResult>, IndexError> {
    let texts = string_col(batch, schema::TEXT)?;
    let sources = string_col(batch, schema::SOURCE)?;
    let chunk_ids = int_col(batch, schema::CHUNK_ID)?;
    let totals = int_col(batch, schema::TOTAL_CHUNKS)?;
    let origins = string_col(batch, schema::ORIGIN_PATH)?;
    let distances = batch
        .column_by_name(schema::DISTANCE)
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>());
    let mut out = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let distance = distances.filter(|d| !d.is_null(i)).map(|d| d.value(i).max(0.0));
        out.push(RetrievalResult {
            text: texts.value(i).to_string(),
            metadata: ChunkMetadata {
                source: sources.value(i).to_string(),
                chunk_id: u32::try_from(chunk_ids.value(i)).unwrap_or_default(),
                total_chunks: u32::try_from(totals.value(i)).unwrap_or_default(),
                origin_path: origins.value(i).to_string(),
            },
            distance,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(source: &str, id: u32, text: &str) -> Chunk {
        Chunk {
            text: text.into(),
            source: source.into(),
            chunk_id: id,
            total_chunks: 3,
            origin_path: format!("/tmp/{source}"),
        }
    }

    #[test]
    fn filter_sql_escapes_and_orders_keys() {
        let f = MetadataFilter::new().with("source", "O'Reilly.pdf").with("chunk_id", 2u32);
        assert_eq!(filter_to_sql(&f).unwrap(), "chunk_id = 2 AND source = 'O''Reilly.pdf'");
    }

    #[test]
    fn filter_rejects_unknown_keys_and_bad_ints() {
        let f = MetadataFilter::new().with("id", "x");
        assert!(matches!(filter_to_sql(&f), Err(IndexError::InvalidFilter(k)) if k == "id"));
        let f = MetadataFilter::new().with("chunk_id", "two");
        assert!(matches!(filter_to_sql(&f), Err(IndexError::InvalidFilter(_))));
        let f = MetadataFilter::new().with("total_chunks", "7");
        assert_eq!(filter_to_sql(&f).unwrap(), "total_chunks = 7");
    }

    #[test]
    fn dedupe_keeps_last_occurrence_in_place() {
        let chunks =
            vec![chunk("a.pdf", 0, "old"), chunk("b.pdf", 0, "b"), chunk("a.pdf", 0, "new")];
        let vectors = vec![vec![0.0], vec![1.0], vec![2.0]];
        let (c, v) = dedupe_batch(&chunks, &vectors);
        assert_eq!(c.len(), 2);
        assert_eq!(c[0].text, "b");
        assert_eq!(c[1].text, "new");
        assert_eq!(*v[1], vec![2.0]);
    }

    #[tokio::test]
    async fn failing_batch_reports_last_committed_and_keeps_earlier_rows() {
        let tmp = tempfile::TempDir::new().unwrap();
        let index = LanceVectorIndex::new(tmp.path().to_string_lossy(), "chunks", 4, 2);
        let chunks: Vec<Chunk> = (0..6).map(|i| chunk("notes.pdf", i, "text")).collect();
        let vectors: Vec<EmbeddingVector> =
            (0..6).map(|i| vec![1.0, i as f32, 0.0, 0.0]).collect();

        let table = index.table().await.unwrap();
        let err = index
            .commit_batches(&chunks, &vectors, |n, rb| async move {
                if n == 2 {
                    return Err(IndexError::Storage("disk full".into()));
                }
                upsert_batch(table, rb).await
            })
            .await
            .unwrap_err();

        match &err {
            IndexError::PartialAdd { last_committed_batch, failed_batch, source } => {
                assert_eq!(*last_committed_batch, Some(1));
                assert_eq!(*failed_batch, 2);
                assert!(matches!(**source, IndexError::Storage(_)));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(err.resume_offset(index.batch_size()), Some(4));
        assert_eq!(index.count().await.unwrap(), 4);
    }
}
