//! Parquet files written in memory
use std::sync::Arc;

use arrow::{
    datatypes::{DataType, Field, Fields, Schema},
    record_batch::RecordBatch,
};
use arrow_array::{ArrayRef, Int64Array, StringArray, StructArray};
use bytes::Bytes;
use parquet::{arrow::ArrowWriter, file::properties::WriterProperties};

#[derive(Debug, Clone)]
pub struct TestParquetFile {
    pub bytes: Bytes,
    pub row_group_count: usize,
}

/// Write a parquet file with columns `id`, `name` and `location.city`, holding `row_groups`
/// row groups of `rows_per_group` rows each
pub fn write_parquet_file(row_groups: usize, rows_per_group: usize) -> TestParquetFile {
    let rows = row_groups * rows_per_group;
    let city = Field::new("city", DataType::Utf8, false);
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("name", DataType::Utf8, false),
        Field::new(
            "location",
            DataType::Struct(Fields::from(vec![city.clone()])),
            false,
        ),
    ]));

    let ids: ArrayRef = Arc::new(Int64Array::from_iter_values(0..rows as i64));
    let names: ArrayRef = Arc::new(StringArray::from_iter_values(
        (0..rows).map(|i| format!("name-{}", i % 7)),
    ));
    let cities: ArrayRef = Arc::new(StringArray::from_iter_values(
        (0..rows).map(|i| format!("city-{}", i % 3)),
    ));
    let locations: ArrayRef = Arc::new(StructArray::from(vec![(Arc::new(city), cities)]));
    let batch = RecordBatch::try_new(Arc::clone(&schema), vec![ids, names, locations])
        .expect("valid record batch");

    let props = WriterProperties::builder()
        .set_max_row_group_size(rows_per_group)
        .build();
    let mut buffer = Vec::new();
    let mut writer =
        ArrowWriter::try_new(&mut buffer, schema, Some(props)).expect("create parquet writer");
    writer.write(&batch).expect("write record batch");
    writer.close().expect("close parquet writer");

    TestParquetFile {
        bytes: Bytes::from(buffer),
        row_group_count: row_groups,
    }
}
