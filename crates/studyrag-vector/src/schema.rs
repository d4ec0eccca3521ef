use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const ID: &str = "id";
pub const TEXT: &str = "text";
pub const SOURCE: &str = "source";
pub const CHUNK_ID: &str = "chunk_id";
pub const TOTAL_CHUNKS: &str = "total_chunks";
pub const ORIGIN_PATH: &str = "origin_path";
pub const VECTOR: &str = "vector";
pub const DISTANCE: &str = "_distance";

/// Metadata columns a query filter may constrain, and whether each is numeric.
pub const FILTERABLE: [(&str, bool); 4] =
    [(SOURCE, false), (CHUNK_ID, true), (TOTAL_CHUNKS, true), (ORIGIN_PATH, false)];

pub fn build_chunk_schema(dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new(ID, DataType::Utf8, false),
        Field::new(TEXT, DataType::Utf8, false),
        Field::new(SOURCE, DataType::Utf8, false),
        Field::new(CHUNK_ID, DataType::Int64, false),
        Field::new(TOTAL_CHUNKS, DataType::Int64, false),
        Field::new(ORIGIN_PATH, DataType::Utf8, false),
        Field::new(
            VECTOR,
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dim as i32,
            ),
            false,
        ),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_width_follows_dim() {
        let schema = build_chunk_schema(384);
        match schema.field_with_name(VECTOR).unwrap().data_type() {
            DataType::FixedSizeList(_, n) => assert_eq!(*n, 384),
            other => panic!("unexpected vector type {other:?}"),
        }
        assert_eq!(schema.fields().len(), 7);
    }
}
