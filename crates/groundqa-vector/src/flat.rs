use groundqa_core::error::{Error, Result};
use groundqa_core::traits::NeighborSearch;
use groundqa_core::types::Neighbor;

/// Exact nearest-neighbour search over vectors held in memory, by squared L2
/// distance (the metric the Lance table uses by default).
pub struct FlatNeighbors {
    dim: usize,
    data: Vec<f32>,
}

impl FlatNeighbors {
    pub fn from_vectors(dim: usize, vectors: &[Vec<f32>]) -> Result<Self> {
        if dim == 0 {
            return Err(Error::InvalidConfig("vector dimension must be positive".into()));
        }
        let mut data = Vec::with_capacity(dim * vectors.len());
        for (i, v) in vectors.iter().enumerate() {
            if v.len() != dim {
                return Err(Error::InvalidConfig(format!(
                    "vector {i} has dimension {}, expected {dim}",
                    v.len()
                )));
            }
            data.extend_from_slice(v);
        }
        Ok(Self { dim, data })
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

impl NeighborSearch for FlatNeighbors {
    fn ntotal(&self) -> usize { self.data.len() / self.dim }

    fn dim(&self) -> usize { self.dim }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dim {
            return Err(Error::Embedding(format!(
                "query has dimension {}, index expects {}",
                query.len(),
                self.dim
            )));
        }
        let mut hits: Vec<Neighbor> = self
            .data
            .chunks_exact(self.dim)
            .enumerate()
            .map(|(i, v)| Neighbor {
                ordinal: i64::try_from(i).unwrap_or(i64::MAX),
                distance: squared_l2(query, v),
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(k);
        Ok(hits)
    }
}
