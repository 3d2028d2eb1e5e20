//! LanceDB-backed neighbour search over the persisted passage vector table.
//!
//! LanceDB is async; this type owns a small tokio runtime and blocks on it so
//! the retriever stays synchronous. Do not call it from inside another tokio
//! runtime.
use arrow_array::{Array, Float32Array, Int32Array, RecordBatch};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{connect, DistanceType, Table};
use std::path::Path;
use tokio::runtime::Runtime;
use tracing::{debug, info};

use groundqa_core::error::{Error, Result};
use groundqa_core::traits::NeighborSearch;
use groundqa_core::types::Neighbor;

use crate::schema::{vector_dim, DISTANCE_COLUMN, ORDINAL_COLUMN};

pub struct LanceNeighbors {
    rt: Runtime,
    table: Table,
    dim: usize,
    ntotal: usize,
}

impl LanceNeighbors {
    /// Open `table_name` under the LanceDB directory `db_dir`. A missing
    /// directory, missing table or table without a vector column is
    /// `Error::IndexUnavailable`; LanceDB failures while opening are
    /// `Error::Operation`.
    pub fn open(db_dir: &Path, table_name: &str) -> Result<Self> {
        if !db_dir.exists() {
            return Err(Error::IndexUnavailable(format!("vector index not found at {}", db_dir.display())));
        }
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(|e| Error::Operation(format!("tokio runtime: {e}")))?;
        let uri = db_dir.to_string_lossy().to_string();
        let (table, dim, ntotal) = rt.block_on(async {
            let db = connect(&uri).execute().await.map_err(load_failed)?;
            let names = db.table_names().execute().await.map_err(load_failed)?;
            if !names.iter().any(|n| n == table_name) {
                return Err(Error::IndexUnavailable(format!("table '{table_name}' not found in {uri}")));
            }
            let table = db.open_table(table_name).execute().await.map_err(load_failed)?;
            let schema = table.schema().await.map_err(load_failed)?;
            let dim = vector_dim(&schema).ok_or_else(|| {
                Error::IndexUnavailable(format!("table '{table_name}' has no fixed-size vector column"))
            })?;
            let ntotal = table.count_rows(None).await.map_err(load_failed)?;
            Ok::<_, Error>((table, dim, ntotal))
        })?;
        info!(table = table_name, dim, ntotal, "opened lance vector index");
        Ok(Self { rt, table, dim, ntotal })
    }
}

fn load_failed(e: lancedb::Error) -> Error { Error::Operation(format!("opening vector index: {e}")) }

fn operation(e: lancedb::Error) -> Error { Error::Operation(format!("vector search: {e}")) }

fn batch_neighbors(batch: &RecordBatch, out: &mut Vec<Neighbor>) -> Result<()> {
    let ordinals = batch
        .column_by_name(ORDINAL_COLUMN)
        .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
        .ok_or_else(|| Error::Operation(format!("search result lacks Int32 '{ORDINAL_COLUMN}' column")))?;
    let distances = batch
        .column_by_name(DISTANCE_COLUMN)
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
        .ok_or_else(|| Error::Operation(format!("search result lacks '{DISTANCE_COLUMN}' column")))?;
    for i in 0..batch.num_rows() {
        // A null ordinal maps to -1 so the index skips it like any other bad slot.
        let ordinal = if ordinals.is_valid(i) { i64::from(ordinals.value(i)) } else { -1 };
        let distance = if distances.is_valid(i) { distances.value(i) } else { f32::NAN };
        out.push(Neighbor { ordinal, distance });
    }
    Ok(())
}

impl NeighborSearch for LanceNeighbors {
    fn ntotal(&self) -> usize { self.ntotal }

    fn dim(&self) -> usize { self.dim }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dim {
            return Err(Error::Embedding(format!(
                "query has dimension {}, index expects {}",
                query.len(),
                self.dim
            )));
        }
        let hits = self.rt.block_on(async {
            let mut stream = self
                .table
                .vector_search(query.to_vec())
                .map_err(operation)?
                .distance_type(DistanceType::L2)
                .select(Select::columns(&[ORDINAL_COLUMN]))
                .limit(k)
                .execute()
                .await
                .map_err(operation)?;
            let mut hits = Vec::with_capacity(k);
            while let Some(batch) = stream.try_next().await.map_err(operation)? {
                batch_neighbors(&batch, &mut hits)?;
            }
            Ok::<_, Error>(hits)
        })?;
        debug!(k, returned = hits.len(), "lance vector search");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn batch_neighbors_maps_nulls_to_skippable_values() {
        let schema = Arc::new(arrow_schema::Schema::new(vec![
            arrow_schema::Field::new(ORDINAL_COLUMN, arrow_schema::DataType::Int32, true),
            arrow_schema::Field::new(DISTANCE_COLUMN, arrow_schema::DataType::Float32, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int32Array::from(vec![Some(4), None])),
                Arc::new(Float32Array::from(vec![Some(0.5), Some(0.7)])),
            ],
        )
        .expect("batch");
        let mut out = Vec::new();
        batch_neighbors(&batch, &mut out).expect("neighbors");
        assert_eq!(out[0], Neighbor { ordinal: 4, distance: 0.5 });
        assert_eq!(out[1].ordinal, -1);
    }

    #[test]
    fn missing_directory_is_index_unavailable() {
        let tmp = tempfile::tempdir().expect("tmp");
        let err = LanceNeighbors::open(&tmp.path().join("absent"), "passages").err().expect("fail");
        assert!(matches!(err, Error::IndexUnavailable(_)));
    }
}
