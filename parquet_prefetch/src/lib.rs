//! A prefetching read layer for Parquet files held in an object store
//!
//! Reading a Parquet file from an object store naively results in many small ranged requests:
//! one for the footer, then one per column chunk, often one per page. This crate turns the reads
//! made of a file into fewer, larger and earlier fetches, using what it knows about the layout of
//! Parquet files:
//!
//! * the tail of a file, holding its footer and page index, is fetched as soon as it is opened,
//! * the footer is parsed in the background, and the location of every column chunk is stored
//!   in a [`ParquetMetadataStore`] shared by all files of a [`PrefetchSession`],
//! * once a read of a column chunk begins, the rest of the chunk is fetched,
//! * the columns read recently from files of the same schema are fetched before being asked for.
//!
//! All fetches are planned as [`IoPlan`]s of merged [`ByteRange`]s and executed by a
//! [`PhysicalIo`]. Prefetching never changes the outcome of a read: a failed prefetch is logged
//! and otherwise ignored.

pub mod column_mappers;
pub mod config;
pub mod footer;
pub mod logical_io;
pub mod physical;
pub mod plan;
pub mod prefetcher;
pub mod range;
pub mod store;
pub mod tail;
pub mod task;
pub mod telemetry;

#[cfg(test)]
mod test_util;

pub use column_mappers::{ColumnMappers, ColumnMetadata};
pub use config::{LogicalIoConfig, PrefetchMode};
pub use logical_io::{ParquetLogicalIo, PrefetchSession};
pub use physical::{ObjectMetadata, ObjectStorePhysicalIo, PhysicalIo, PhysicalIoError};
pub use plan::{IoPlan, IoPlanExecution, IoPlanState};
pub use prefetcher::{FooterPrefetch, ParquetPrefetcher, PrefetchHandle, PrefetchPolicy};
pub use range::{ByteRange, merge_ranges};
pub use store::ParquetMetadataStore;
