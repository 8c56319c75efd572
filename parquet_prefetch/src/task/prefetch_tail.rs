//! Prefetching of the tail of a file, where its footer lives
use std::sync::Arc;

use crate::{
    config::LogicalIoConfig,
    physical::PhysicalIo,
    plan::IoPlan,
    range::ByteRange,
    tail::file_tail_range,
    telemetry::{Operation, Telemetry},
};

use super::{PrefetchError, Result};

const OPERATION_NAME: &str = "parquet.task.prefetch.tail";

/// Fetches the single tail range of a file so the footer is in the physical layer by the time
/// it is read
#[derive(Debug, Clone)]
pub struct PrefetchTailTask {
    physical: Arc<dyn PhysicalIo>,
    config: Arc<LogicalIoConfig>,
    telemetry: Telemetry,
}

impl PrefetchTailTask {
    pub fn new(
        physical: Arc<dyn PhysicalIo>,
        config: Arc<LogicalIoConfig>,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            physical,
            config,
            telemetry,
        }
    }

    /// Execute the tail plan, returning the ranges it held
    ///
    /// An empty object has no tail, so yields no ranges.
    pub async fn prefetch_tail(&self) -> Result<Vec<ByteRange>> {
        let operation = Operation::new(OPERATION_NAME).with_uri(self.physical.path());
        self.telemetry
            .measure_standard(operation, self.execute_tail_plan())
            .await
    }

    async fn execute_tail_plan(&self) -> Result<Vec<ByteRange>> {
        let path = self.physical.path();
        let content_length = self
            .physical
            .metadata()
            .await
            .map_err(PrefetchError::fetch(path))?
            .content_length;
        let plan = IoPlan::from(file_tail_range(&self.config, content_length));
        let ranges = plan.prefetch_ranges().to_vec();
        self.physical
            .execute(plan)
            .await
            .map_err(PrefetchError::fetch(path))?;
        Ok(ranges)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use object_store::path::Path;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{config::ONE_KB, test_util::MockPhysicalIo};

    fn task(physical: &Arc<MockPhysicalIo>, config: LogicalIoConfig) -> PrefetchTailTask {
        PrefetchTailTask::new(
            Arc::clone(physical) as _,
            Arc::new(config),
            Telemetry::default(),
        )
    }

    #[tokio::test]
    async fn prefetches_metadata_region() {
        let physical = Arc::new(MockPhysicalIo::new(
            Path::from("a.parquet"),
            Bytes::from(vec![0; 100 * ONE_KB as usize]),
        ));
        let config = LogicalIoConfig {
            small_objects_prefetching_enabled: false,
            ..Default::default()
        };
        let expected = ByteRange::try_new(
            100 * ONE_KB - config.file_metadata_prefetch_size,
            100 * ONE_KB - 1,
        )
        .unwrap();

        let ranges = task(&physical, config).prefetch_tail().await.unwrap();

        assert_eq!(vec![expected], ranges);
        assert_eq!(vec![IoPlan::new([expected])], physical.executed_plans());
    }

    #[tokio::test]
    async fn small_object_prefetched_whole() {
        let physical = Arc::new(MockPhysicalIo::new(
            Path::from("a.parquet"),
            Bytes::from(vec![0; 1_000]),
        ));

        let ranges = task(&physical, LogicalIoConfig::default())
            .prefetch_tail()
            .await
            .unwrap();

        assert_eq!(vec![ByteRange::try_new(0, 999).unwrap()], ranges);
    }

    #[tokio::test]
    async fn empty_object() {
        let physical = Arc::new(MockPhysicalIo::new(Path::from("a.parquet"), Bytes::new()));

        let ranges = task(&physical, LogicalIoConfig::default())
            .prefetch_tail()
            .await
            .unwrap();

        assert!(ranges.is_empty());
    }

    #[tokio::test]
    async fn physical_failure() {
        let physical = Arc::new(MockPhysicalIo::new(
            Path::from("a.parquet"),
            Bytes::from(vec![0; 1_000]),
        ));
        physical.fail();

        let err = task(&physical, LogicalIoConfig::default())
            .prefetch_tail()
            .await
            .unwrap_err();

        assert!(matches!(err, PrefetchError::Fetch { .. }));
    }
}
