//! Prefetching the rest of a column chunk once a read of it begins
use std::sync::Arc;

use crate::{
    physical::PhysicalIo,
    plan::{IoPlan, IoPlanExecution},
    range::ByteRange,
    store::ParquetMetadataStore,
    telemetry::{Operation, Telemetry},
};

use super::{PrefetchError, Result};

const OPERATION_NAME: &str = "parquet.task.prefetch.remaining.column.chunk";

#[derive(Debug, Clone)]
pub struct RemainingColumnTask {
    physical: Arc<dyn PhysicalIo>,
    store: Arc<ParquetMetadataStore>,
    telemetry: Telemetry,
}

impl RemainingColumnTask {
    pub fn new(
        physical: Arc<dyn PhysicalIo>,
        store: Arc<ParquetMetadataStore>,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            physical,
            store,
            telemetry,
        }
    }

    /// The part of the column chunk starting at `position` that a read of `len` bytes leaves
    /// unread
    ///
    /// `None` if the file has no stored mappers, no chunk starts at `position`, or the read
    /// covers the whole chunk.
    pub fn remaining_range(&self, position: u64, len: u64) -> Option<ByteRange> {
        let mappers = self.store.get_column_mappers(self.physical.path())?;
        let chunk = mappers.column_at(position)?.byte_range()?;
        let start = position.checked_add(len)?;
        ByteRange::try_new(start, chunk.end()).ok()
    }

    pub async fn prefetch_remaining_column_chunk(
        &self,
        position: u64,
        len: u64,
    ) -> Result<IoPlanExecution> {
        let Some(range) = self.remaining_range(position, len) else {
            return Ok(IoPlanExecution::skipped());
        };

        let path = self.physical.path();
        let operation = Operation::new(OPERATION_NAME)
            .with_uri(path)
            .with_range(range);
        self.telemetry
            .measure_standard(
                operation,
                self.physical.execute(IoPlan::new([range])),
            )
            .await
            .map_err(PrefetchError::fetch(path))
    }
}
