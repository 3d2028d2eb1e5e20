//! Metadata sidecar: a JSON array with one passage object per indexed vector,
//! in vector-ordinal order. A missing file is `IndexUnavailable`; one that
//! cannot be read or parsed is `Operation`, which index loading retries.

use std::path::Path;
use std::sync::Arc;

use groundqa_core::error::{Error, Result};
use groundqa_core::types::PassageChunk;

pub fn load_metadata(path: &Path) -> Result<Vec<Arc<PassageChunk>>> {
    if !path.exists() {
        return Err(Error::IndexUnavailable(format!("metadata not found at {}", path.display())));
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::Operation(format!("reading {}: {e}", path.display())))?;
    let entries: Vec<PassageChunk> = serde_json::from_str(&raw)
        .map_err(|e| Error::Operation(format!("parsing {}: {e}", path.display())))?;
    Ok(entries.into_iter().map(Arc::new).collect())
}
