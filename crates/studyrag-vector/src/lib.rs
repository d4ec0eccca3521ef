//! Persistent vector index over chunk embeddings and the query-embedding cache.
pub mod cache;
pub mod index;
pub mod schema;
pub mod table;

pub use cache::{cache_key, QueryEmbeddingCache};
pub use index::{filter_to_sql, LanceVectorIndex};
