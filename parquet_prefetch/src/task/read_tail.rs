//! Reading the tail of a file for footer parsing
use std::sync::Arc;

use crate::{
    config::LogicalIoConfig,
    footer::FileTail,
    physical::PhysicalIo,
    plan::IoPlan,
    tail::{file_tail_prefetch_ranges, file_tail_range},
    telemetry::{Operation, Telemetry},
};

use super::{PrefetchError, Result};

const OPERATION_NAME: &str = "parquet.task.read.tail";

/// Reads the bytes of the file tail
///
/// The whole tail prefetch plan, including the page index region, is executed first, so the page
/// index is fetched in the same request as the footer and is at hand when the reader needs it.
#[derive(Debug, Clone)]
pub struct ReadTailTask {
    physical: Arc<dyn PhysicalIo>,
    config: Arc<LogicalIoConfig>,
    telemetry: Telemetry,
}

impl ReadTailTask {
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

    pub async fn read_file_tail(&self) -> Result<FileTail> {
        let operation = Operation::new(OPERATION_NAME).with_uri(self.physical.path());
        self.telemetry
            .measure_standard(operation, self.read_tail())
            .await
    }

    async fn read_tail(&self) -> Result<FileTail> {
        let path = self.physical.path();
        let content_length = self
            .physical
            .metadata()
            .await
            .map_err(PrefetchError::fetch(path))?
            .content_length;
        let Some(tail_range) = file_tail_range(&self.config, content_length) else {
            return Err(PrefetchError::EmptyObject { path: path.clone() });
        };

        let plan = IoPlan::new(file_tail_prefetch_ranges(&self.config, content_length));
        self.physical
            .execute(plan)
            .await
            .map_err(PrefetchError::fetch(path))?;
        let bytes = self
            .physical
            .read(tail_range)
            .await
            .map_err(PrefetchError::fetch(path))?;
        Ok(FileTail::new(bytes))
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use object_store::path::Path;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{range::ByteRange, test_util::MockPhysicalIo};

    fn task(physical: &Arc<MockPhysicalIo>, config: LogicalIoConfig) -> ReadTailTask {
        ReadTailTask::new(
            Arc::clone(physical) as _,
            Arc::new(config),
            Telemetry::default(),
        )
    }

    #[tokio::test]
    async fn reads_tail_after_prefetching_page_index() {
        let content: Vec<u8> = (0..=255).cycle().take(1_000).collect();
        let physical = Arc::new(MockPhysicalIo::new(
            Path::from("a.parquet"),
            Bytes::from(content.clone()),
        ));
        let config = LogicalIoConfig {
            small_objects_prefetching_enabled: false,
            file_metadata_prefetch_size: 100,
            file_page_index_prefetch_size: 200,
            ..Default::default()
        };

        let tail = task(&physical, config).read_file_tail().await.unwrap();

        assert_eq!(100, tail.length());
        assert_eq!(&content[900..], tail.bytes().as_ref());
        assert_eq!(
            vec![IoPlan::new([ByteRange::try_new(700, 999).unwrap()])],
            physical.executed_plans()
        );
        assert_eq!(vec![ByteRange::try_new(900, 999).unwrap()], physical.reads());
    }

    #[tokio::test]
    async fn empty_object() {
        let physical = Arc::new(MockPhysicalIo::new(Path::from("a.parquet"), Bytes::new()));

        let err = task(&physical, LogicalIoConfig::default())
            .read_file_tail()
            .await
            .unwrap_err();

        assert!(matches!(err, PrefetchError::EmptyObject { .. }));
        assert!(physical.executed_plans().is_empty());
    }
}
