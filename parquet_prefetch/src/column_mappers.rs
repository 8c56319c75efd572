//! Index structures over the column chunks of a Parquet file
use std::collections::HashMap;

use twox_hash::XxHash64;

use crate::{footer::FooterMetadata, range::ByteRange};

/// A single physical column chunk within a row group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMetadata {
    pub row_group_index: u32,
    /// Dot-joined path of the column in the schema, e.g., `location.city`
    pub column_name: String,
    /// Where fetching the chunk starts: the dictionary page offset if the chunk has one, else
    /// the offset of its first data page
    pub chunk_offset: u64,
    pub compressed_size: u64,
    pub schema_hash: i64,
}

impl ColumnMetadata {
    /// The bytes occupied by the chunk, `None` if it is empty
    pub fn byte_range(&self) -> Option<ByteRange> {
        ByteRange::with_len(self.chunk_offset, self.compressed_size)
    }
}

/// Lookups from chunk offsets and column names to the [`ColumnMetadata`] of a file
///
/// Built once from the footer of a file and immutable thereafter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMappers {
    offset_index_to_column: HashMap<u64, ColumnMetadata>,
    column_name_to_columns: HashMap<String, Vec<ColumnMetadata>>,
    schema_hash: i64,
}

impl ColumnMappers {
    /// Build the mappers for a file from its decoded footer
    pub fn build(footer: &FooterMetadata) -> Self {
        let schema_hash = schema_hash(footer);
        let mut offset_index_to_column = HashMap::new();
        let mut column_name_to_columns: HashMap<String, Vec<ColumnMetadata>> = HashMap::new();

        for (row_group_index, row_group) in (0u32..).zip(&footer.row_groups) {
            for chunk in &row_group.columns {
                let column_name = chunk.path_in_schema.join(".");
                let chunk_offset = if chunk.dictionary_page_offset != 0 {
                    chunk.dictionary_page_offset
                } else {
                    chunk.file_offset
                };
                let column = ColumnMetadata {
                    row_group_index,
                    column_name,
                    chunk_offset,
                    compressed_size: chunk.total_compressed_size,
                    schema_hash,
                };
                column_name_to_columns
                    .entry(column.column_name.clone())
                    .or_default()
                    .push(column.clone());
                offset_index_to_column.insert(chunk_offset, column);
            }
        }

        Self {
            offset_index_to_column,
            column_name_to_columns,
            schema_hash,
        }
    }

    pub fn offset_index_to_column(&self) -> &HashMap<u64, ColumnMetadata> {
        &self.offset_index_to_column
    }

    pub fn column_name_to_columns(&self) -> &HashMap<String, Vec<ColumnMetadata>> {
        &self.column_name_to_columns
    }

    /// Find the column chunk that starts at `position`
    pub fn column_at(&self, position: u64) -> Option<&ColumnMetadata> {
        self.offset_index_to_column.get(&position)
    }

    /// All chunks of the named column, in row group order
    pub fn columns_named(&self, column_name: &str) -> &[ColumnMetadata] {
        self.column_name_to_columns
            .get(column_name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Hash of the column names of the first row group, shared by every [`ColumnMetadata`] of
    /// the file
    pub fn schema_hash(&self) -> i64 {
        self.schema_hash
    }
}

fn schema_hash(footer: &FooterMetadata) -> i64 {
    let concatenated: String = footer
        .row_groups
        .first()
        .map(|rg| {
            rg.columns
                .iter()
                .map(|chunk| chunk.path_in_schema.join("."))
                .collect()
        })
        .unwrap_or_default();
    XxHash64::oneshot(0, concatenated.as_bytes()) as i64
}
