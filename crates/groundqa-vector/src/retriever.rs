use tracing::{debug, info};

use groundqa_core::error::{Error, Result};
use groundqa_core::traits::Embedder;
use groundqa_core::types::{ScoredPassage, MAX_TOP_K};

use crate::index::VectorIndex;

/// Neighbours fetched per requested result when a category filter applies.
pub const FILTER_OVERSAMPLE: usize = 3;

pub struct Retriever {
    embedder: Box<dyn Embedder>,
    index: VectorIndex,
    max_top_k: usize,
}

impl Retriever {
    pub fn new(embedder: Box<dyn Embedder>, index: VectorIndex) -> Result<Self> {
        if embedder.dim() != index.dim() {
            return Err(Error::InvalidConfig(format!(
                "embedder dimension {} does not match index dimension {}",
                embedder.dim(),
                index.dim()
            )));
        }
        Ok(Self { embedder, index, max_top_k: MAX_TOP_K })
    }

    pub fn with_max_top_k(mut self, max_top_k: usize) -> Self {
        self.max_top_k = max_top_k.max(1);
        self
    }

    pub fn index(&self) -> &VectorIndex { &self.index }

    /// Up to `top_k` passages for `query`, closest first. With a category
    /// filter, `top_k * FILTER_OVERSAMPLE` neighbours are scanned and only
    /// matching ones kept, so fewer than `top_k` may come back.
    pub fn retrieve(&self, query: &str, top_k: usize, category_filter: Option<&str>) -> Result<Vec<ScoredPassage>> {
        let top_k = top_k.min(self.max_top_k);
        debug!(top_k, filter = category_filter, "retrieving passages");

        let vector = self
            .embedder
            .embed_query(query)
            .map_err(|e| Error::Embedding(e.to_string()))?;
        if vector.len() != self.index.dim() {
            return Err(Error::Embedding(format!(
                "encoder produced {} values, index expects {}",
                vector.len(),
                self.index.dim()
            )));
        }

        let results: Vec<ScoredPassage> = match category_filter {
            None => self.index.search(&vector, top_k)?,
            Some(category) => self
                .index
                .search(&vector, top_k * FILTER_OVERSAMPLE)?
                .into_iter()
                .filter(|hit| hit.category() == category)
                .take(top_k)
                .collect(),
        };
        info!(count = results.len(), top_k, filter = category_filter, "retrieved passages");
        Ok(results)
    }
}
