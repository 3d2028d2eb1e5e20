//! Passage retrieval: a persisted neighbour index, its metadata sidecar and
//! the filter-aware retriever on top.

pub mod flat;
pub mod index;
pub mod lance;
pub mod metadata;
pub mod retriever;
pub mod schema;

pub use flat::FlatNeighbors;
pub use index::VectorIndex;
pub use lance::LanceNeighbors;
pub use metadata::load_metadata;
pub use retriever::{Retriever, FILTER_OVERSAMPLE};
