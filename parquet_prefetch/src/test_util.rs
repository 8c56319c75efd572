use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use object_store::path::Path;
use parking_lot::Mutex;

pub(crate) use parquet_prefetch_test_helpers::parquet_file::{TestParquetFile, write_parquet_file};

use crate::{
    physical::{ObjectMetadata, PhysicalIo, PhysicalIoError, Result},
    plan::{IoPlan, IoPlanExecution},
    range::ByteRange,
};

/// A [`PhysicalIo`] over bytes in memory, which records the plans it executes and the ranges it
/// reads
#[derive(Debug)]
pub(crate) struct MockPhysicalIo {
    path: Path,
    bytes: Bytes,
    executed_plans: Mutex<Vec<IoPlan>>,
    reads: Mutex<Vec<ByteRange>>,
    fail: AtomicBool,
}

impl MockPhysicalIo {
    pub(crate) fn new(path: Path, bytes: Bytes) -> Self {
        Self {
            path,
            bytes,
            executed_plans: Default::default(),
            reads: Default::default(),
            fail: AtomicBool::new(false),
        }
    }

    /// Make every subsequent request fail
    pub(crate) fn fail(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub(crate) fn content_length(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub(crate) fn executed_plans(&self) -> Vec<IoPlan> {
        self.executed_plans.lock().clone()
    }

    pub(crate) fn reads(&self) -> Vec<ByteRange> {
        self.reads.lock().clone()
    }

    fn check_failure(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PhysicalIoError::ObjectStore {
                path: self.path.clone(),
                source: object_store::Error::Generic {
                    store: "mock",
                    source: "injected failure".into(),
                },
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PhysicalIo for MockPhysicalIo {
    fn path(&self) -> &Path {
        &self.path
    }

    async fn metadata(&self) -> Result<ObjectMetadata> {
        self.check_failure()?;
        Ok(ObjectMetadata {
            content_length: self.content_length(),
        })
    }

    async fn execute(&self, plan: IoPlan) -> Result<IoPlanExecution> {
        self.check_failure()?;
        if plan.is_empty() {
            return Ok(IoPlanExecution::skipped());
        }
        self.executed_plans.lock().push(plan);
        Ok(IoPlanExecution::executed())
    }

    async fn read(&self, range: ByteRange) -> Result<Bytes> {
        self.check_failure()?;
        self.reads.lock().push(range);
        if range.end() >= self.content_length() {
            return Err(PhysicalIoError::OutOfBounds {
                path: self.path.clone(),
                range,
                content_length: self.content_length(),
            });
        }
        Ok(self.bytes.slice(range.to_std_range()))
    }
}
