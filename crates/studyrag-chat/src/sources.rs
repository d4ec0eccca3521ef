use serde::{Deserialize, Serialize};

use studyrag_core::types::RetrievalResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub source: String,
    pub chunk_id: u32,
    pub relevance_score: f32,
}

/// `round(1 - distance, 2)`, or `default` when the index reported no distance.
pub fn relevance_score(distance: Option<f32>, default: f32) -> f32 {
    match distance {
        Some(d) => ((1.0 - d) * 100.0).round() / 100.0,
        None => default,
    }
}

/// The first `max` results that carry a source name, in rank order.
pub fn build_sources(
    results: &[RetrievalResult],
    max: usize,
    default_relevance: f32,
) -> Vec<Source> {
    results
        .iter()
        .take(max)
        .filter(|r| !r.metadata.source.is_empty())
        .map(|r| Source {
            source: r.metadata.source.clone(),
            chunk_id: r.metadata.chunk_id,
            relevance_score: relevance_score(r.distance, default_relevance),
        })
        .collect()
}
