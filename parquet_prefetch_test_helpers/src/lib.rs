//! Helpers for testing the prefetching engine against an object store

pub mod object_store;
pub mod parquet_file;
