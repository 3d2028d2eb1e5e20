use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use groundqa_core::config::IndexSettings;
use groundqa_core::error::{Error, Result};
use groundqa_core::retry::RetryPolicy;
use groundqa_core::traits::NeighborSearch;
use groundqa_core::types::{PassageChunk, ScoredPassage};

use crate::lance::LanceNeighbors;
use crate::metadata::load_metadata;

/// A neighbour index plus the parallel passage metadata array. Read-only once
/// built; share it freely across threads.
pub struct VectorIndex {
    neighbors: Box<dyn NeighborSearch>,
    passages: Vec<Arc<PassageChunk>>,
}

impl VectorIndex {
    pub fn new(neighbors: Box<dyn NeighborSearch>, passages: Vec<Arc<PassageChunk>>) -> Self {
        if neighbors.ntotal() != passages.len() {
            warn!(
                vectors = neighbors.ntotal(),
                passages = passages.len(),
                "vector count and metadata length differ; unmatched hits will be skipped"
            );
        }
        Self { neighbors, passages }
    }

    /// Load the Lance table and metadata sidecar under `base`, retrying
    /// transient load failures. Missing artifacts are fatal.
    pub fn open(settings: &IndexSettings, base: &Path) -> Result<Self> {
        let dir = settings.index_dir(base);
        let metadata_path = settings.metadata_path(base);
        let policy = load_policy(settings);
        let neighbors = policy.run("open vector index", |_| LanceNeighbors::open(&dir, &settings.table))?;
        let passages = policy.run("load metadata", |_| load_metadata(&metadata_path))?;
        info!(
            dir = %dir.display(),
            passages = passages.len(),
            dim = neighbors.dim(),
            "vector index loaded"
        );
        Ok(Self::new(Box::new(neighbors), passages))
    }

    pub fn passage_count(&self) -> usize { self.passages.len() }

    pub fn dim(&self) -> usize { self.neighbors.dim() }

    /// k nearest passages in ascending distance. Hits whose ordinal falls
    /// outside the metadata array, or whose distance is not finite, are
    /// dropped, so fewer than `k` results may come back.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredPassage>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let mut hits = Vec::with_capacity(k);
        for n in self.neighbors.search(query, k)? {
            let passage = usize::try_from(n.ordinal).ok().and_then(|i| self.passages.get(i));
            match passage {
                Some(p) if n.distance.is_finite() => {
                    hits.push(ScoredPassage { passage: Arc::clone(p), distance: n.distance.max(0.0) });
                }
                _ => debug!(ordinal = n.ordinal, distance = n.distance, "skipping unusable neighbour"),
            }
        }
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Ok(hits)
    }
}

/// Missing artifacts will not appear on their own; anything else that goes
/// wrong while loading gets another attempt.
fn load_policy(settings: &IndexSettings) -> RetryPolicy<Error> {
    RetryPolicy::new(
        settings.load_attempts,
        Duration::from_secs_f64(settings.load_retry_delay_secs.max(0.0)),
        |e| !matches!(e, Error::IndexUnavailable(_)),
    )
}
