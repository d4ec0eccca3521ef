//! Domain types shared by the embedding, index, retrieval and chat crates.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type EmbeddingVector = Vec<f32>;

/// A chunk of a source document that is independently indexed.
///
/// - `text`: the text payload of the chunk
/// - `source`: source document name (e.g. the file name)
/// - `chunk_id`/`total_chunks`: position within the parent document
/// - `origin_path`: original path to the source file
///
/// Identity within an index is `source + "_" + chunk_id`, see [`Chunk::key`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub source: String,
    pub chunk_id: u32,
    pub total_chunks: u32,
    pub origin_path: String,
}

impl Chunk {
    pub fn key(&self) -> String {
        format!("{}_{}", self.source, self.chunk_id)
    }

    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            source: self.source.clone(),
            chunk_id: self.chunk_id,
            total_chunks: self.total_chunks,
            origin_path: self.origin_path.clone(),
        }
    }
}

/// Provenance stored next to every vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub chunk_id: u32,
    pub total_chunks: u32,
    pub origin_path: String,
}

/// One ranked hit from a nearest-neighbor query.
///
/// `distance` is cosine distance (0 = identical); `None` only when the
/// backing index did not report distances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub text: String,
    pub metadata: ChunkMetadata,
    pub distance: Option<f32>,
}

/// Exact-match constraint value for metadata filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Int(i64),
    Text(String),
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self { FilterValue::Text(v.to_string()) }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self { FilterValue::Text(v) }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self { FilterValue::Int(v) }
}

impl From<u32> for FilterValue {
    fn from(v: u32) -> Self { FilterValue::Int(i64::from(v)) }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Int(i) => write!(f, "{i}"),
            FilterValue::Text(s) => write!(f, "{s}"),
        }
    }
}

/// Conjunction of exact key/value constraints on chunk metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFilter(pub BTreeMap<String, FilterValue>);

impl MetadataFilter {
    pub fn new() -> Self { Self::default() }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FilterValue)> { self.0.iter() }
}

/// Read-only index introspection for health and admin surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub name: String,
    pub count: usize,
    pub location: String,
}
