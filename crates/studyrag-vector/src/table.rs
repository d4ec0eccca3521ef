//! LanceDB connection and table helpers.
use arrow_array::types::Float32Type;
use arrow_array::{FixedSizeListArray, Int64Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::Schema;
use lancedb::{connect, Connection, Table};
use std::sync::Arc;

use studyrag_core::error::IndexError;
use studyrag_core::types::{Chunk, EmbeddingVector};

pub(crate) fn storage<E: std::fmt::Display>(e: E) -> IndexError {
    IndexError::Storage(e.to_string())
}

pub async fn open_db(uri: &str) -> Result<Connection, IndexError> {
    connect(uri).execute().await.map_err(storage)
}

/// Open `name`, creating it empty with `schema` when missing.
pub async fn ensure_table(
    conn: &Connection,
    name: &str,
    schema: Arc<Schema>,
) -> Result<Table, IndexError> {
    let names = conn.table_names().execute().await.map_err(storage)?;
    if !names.iter().any(|n| n == name) {
        tracing::info!(table = name, "creating vector table");
        let empty = RecordBatch::new_empty(schema.clone());
        let iter = RecordBatchIterator::new(vec![Ok(empty)], schema);
        conn.create_table(name, Box::new(iter)).execute().await.map_err(storage)?;
    }
    conn.open_table(name).execute().await.map_err(storage)
}

pub fn chunks_to_record_batch(
    schema: Arc<Schema>,
    chunks: &[&Chunk],
    vectors: &[&EmbeddingVector],
    dim: usize,
) -> Result<RecordBatch, IndexError> {
    let ids = StringArray::from_iter_values(chunks.iter().map(|c| c.key()));
    let texts = StringArray::from_iter_values(chunks.iter().map(|c| c.text.as_str()));
    let sources = StringArray::from_iter_values(chunks.iter().map(|c| c.source.as_str()));
    let chunk_ids = Int64Array::from_iter_values(chunks.iter().map(|c| i64::from(c.chunk_id)));
    let totals = Int64Array::from_iter_values(chunks.iter().map(|c| i64::from(c.total_chunks)));
    let origins = StringArray::from_iter_values(chunks.iter().map(|c| c.origin_path.as_str()));
    let vector_array = FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(
        vectors.iter().map(|v| Some(v.iter().copied().map(Some).collect::<Vec<_>>())),
        dim as i32,
    );
    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(ids),
            Arc::new(texts),
            Arc::new(sources),
            Arc::new(chunk_ids),
            Arc::new(totals),
            Arc::new(origins),
            Arc::new(vector_array),
        ],
    )
    .map_err(storage)
}

/// Upsert one record batch keyed on `id`.
pub async fn upsert_batch(table: &Table, batch: RecordBatch) -> Result<(), IndexError> {
    let schema = batch.schema();
    let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)], schema));
    let mut mi = table.merge_insert(&["id"]);
    mi.when_matched_update_all(None).when_not_matched_insert_all();
    let _ = mi.execute(reader).await.map_err(storage)?;
    Ok(())
}
