use crate::error::Result;
use crate::types::Neighbor;

/// Turns text into fixed-dimension vectors. Implementations are stateless per
/// call and shared across threads.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    fn embed_query(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector"))
    }
}

/// k-nearest-neighbour search over the vectors of a loaded index.
///
/// Results are ordered by ascending distance. Ordinals refer to positions in
/// the metadata sidecar.
pub trait NeighborSearch: Send + Sync {
    /// Number of vectors held by the index.
    fn ntotal(&self) -> usize;
    fn dim(&self) -> usize;
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>>;
}
