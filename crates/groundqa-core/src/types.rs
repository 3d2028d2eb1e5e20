//! Domain types shared by the retriever, the cache and the pipeline.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const MIN_TOP_K: usize = 3;
pub const DEFAULT_TOP_K: usize = 5;
pub const MAX_TOP_K: usize = 20;

/// One retrievable passage, as described by the metadata sidecar.
///
/// - `text`: the passage payload fed to the model
/// - `chunk_id`: stable identifier, unique within the index
/// - `category`: tag used for filtering (e.g. `credit_card`)
/// - `topic`/`source_entity`: free-text labels, empty when absent
///
/// Immutable once loaded; the index owns each passage behind an `Arc`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PassageChunk {
    pub text: String,
    pub chunk_id: String,
    pub category: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub source_entity: String,
}

/// A passage paired with its distance to a particular query (lower is closer).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredPassage {
    pub passage: Arc<PassageChunk>,
    pub distance: f32,
}

impl ScoredPassage {
    pub fn text(&self) -> &str { &self.passage.text }
    pub fn category(&self) -> &str { &self.passage.category }
    pub fn topic(&self) -> &str { &self.passage.topic }
}

/// Raw hit from a neighbour search. `ordinal` indexes the metadata sidecar
/// and may be negative or out of range when the index returns padding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub ordinal: i64,
    pub distance: f32,
}

/// Clamp a requested top-k into `[MIN_TOP_K, max_top_k]`. Out-of-range values
/// are corrected, never rejected.
pub fn clamp_top_k(requested: i64, max_top_k: usize) -> usize {
    let max = max_top_k.max(MIN_TOP_K);
    let requested = usize::try_from(requested.max(0)).unwrap_or(usize::MAX);
    requested.clamp(MIN_TOP_K, max)
}
