//! Prefetching the columns that readers of files with the same schema recently read
use std::{collections::HashSet, sync::Arc};

use parking_lot::Mutex;
use tracing::trace;

use crate::{
    column_mappers::{ColumnMappers, ColumnMetadata},
    physical::PhysicalIo,
    plan::{IoPlan, IoPlanExecution},
    range::ByteRange,
    store::ParquetMetadataStore,
    telemetry::{Operation, Telemetry},
};

use super::{PrefetchError, Result};

const OPERATION_NAME: &str = "parquet.task.prefetch.recent.columns";

/// Records the column chunks read through one stream, and prefetches the chunks of recently
/// read columns that the stream has not read yet
///
/// Clones share the set of chunks read.
#[derive(Debug, Clone)]
pub struct PredictivePrefetchingTask {
    physical: Arc<dyn PhysicalIo>,
    store: Arc<ParquetMetadataStore>,
    telemetry: Telemetry,
    /// Offsets of the chunks read through this stream
    read_offsets: Arc<Mutex<HashSet<u64>>>,
}

impl PredictivePrefetchingTask {
    pub fn new(
        physical: Arc<dyn PhysicalIo>,
        store: Arc<ParquetMetadataStore>,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            physical,
            store,
            telemetry,
            read_offsets: Default::default(),
        }
    }

    /// Note a read starting at `position`
    ///
    /// Returns the column chunk the read starts, if any. Never fetches anything.
    pub fn add_to_recent_column_list(&self, position: u64) -> Option<ColumnMetadata> {
        let column = self.store.record_access(self.physical.path(), position)?;
        self.read_offsets.lock().insert(column.chunk_offset);
        Some(column)
    }

    /// The ranges of every chunk of a recently read column that this stream has not read
    pub fn recent_column_ranges(&self, mappers: &ColumnMappers) -> Vec<ByteRange> {
        let recent = self.store.recent_columns(mappers.schema_hash());
        let read_offsets = self.read_offsets.lock();
        recent
            .iter()
            .flat_map(|name| mappers.columns_named(name))
            .filter(|column| !read_offsets.contains(&column.chunk_offset))
            .filter_map(ColumnMetadata::byte_range)
            .collect()
    }

    pub async fn prefetch_recent_columns(
        &self,
        mappers: &ColumnMappers,
    ) -> Result<IoPlanExecution> {
        let plan = IoPlan::new(self.recent_column_ranges(mappers));
        let path = self.physical.path();
        if plan.is_empty() {
            trace!(%path, "no recently read columns to prefetch");
            return Ok(IoPlanExecution::skipped());
        }

        let operation = Operation::new(OPERATION_NAME).with_uri(path);
        self.telemetry
            .measure_standard(operation, self.physical.execute(plan))
            .await
            .map_err(PrefetchError::fetch(path))
    }
}
