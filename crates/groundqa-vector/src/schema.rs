use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const ORDINAL_COLUMN: &str = "ordinal";
pub const VECTOR_COLUMN: &str = "vector";
/// Column LanceDB appends to vector-search results.
pub const DISTANCE_COLUMN: &str = "_distance";

/// Layout of the passage vector table: one row per metadata entry, `ordinal`
/// being the entry's position in the sidecar array.
pub fn index_schema(dim: i32) -> Arc<Schema> {
	Arc::new(Schema::new(vec![
		Field::new(ORDINAL_COLUMN, DataType::Int32, false),
		Field::new(VECTOR_COLUMN, DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim), true),
	]))
}

/// Vector dimension declared by a table schema, if it has a usable vector column.
pub fn vector_dim(schema: &Schema) -> Option<usize> {
	match schema.field_with_name(VECTOR_COLUMN).ok()?.data_type() {
		DataType::FixedSizeList(_, n) => usize::try_from(*n).ok(),
		_ => None,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn vector_dim_reads_fixed_size_list() {
		assert_eq!(vector_dim(&index_schema(384)), Some(384));
		let no_vec = Schema::new(vec![Field::new(ORDINAL_COLUMN, DataType::Int32, false)]);
		assert_eq!(vector_dim(&no_vec), None);
	}
}
