//! Orchestration of the prefetch tasks for a single file
//!
//! The [`ParquetPrefetcher`] decides, based on the [`PrefetchPolicy`] derived from the
//! configuration, which tasks to run, and runs them in the background on the tokio runtime.
//! Prefetching is purely an optimization, so every failure stops here: it is logged, and the
//! caller sees a skipped execution instead.
use std::{
    fmt::Debug,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures::FutureExt;
use object_store::path::Path;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{
    column_mappers::ColumnMetadata,
    config::LogicalIoConfig,
    footer::{FooterDecoder, ParquetFooterDecoder},
    physical::PhysicalIo,
    plan::IoPlanExecution,
    range::ByteRange,
    store::ParquetMetadataStore,
    task::{
        MetadataParsingTask, PredictivePrefetchingTask, PrefetchTailTask, ReadTailTask,
        RemainingColumnTask,
    },
    telemetry::{Operation, Telemetry},
};

const PREFETCH_COLUMN_CHUNK_OPERATION: &str = "parquet.prefetcher.prefetch.column.chunk.async";
const PREFETCH_FOOTER_AND_METADATA_OPERATION: &str =
    "parquet.prefetcher.prefetch.footer.and.metadata.async";

/// Which prefetch stages run for a file
///
/// | metadata aware | predictive | metadata pipeline | predictive stage | remaining chunk |
/// |----------------|------------|-------------------|------------------|-----------------|
/// | no             | no         | no                | no               | no              |
/// | yes            | no         | yes               | no               | yes             |
/// | no             | yes        | yes               | yes              | no              |
/// | yes            | yes        | yes               | yes              | no              |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefetchPolicy {
    /// Prefetch the tail of the file when it is opened
    pub prefetch_tail: bool,
    /// Read and parse the footer, then store the column mappers of the file
    pub build_metadata: bool,
    /// Prefetch recently read columns once the column mappers are built
    pub predictive: bool,
    /// Prefetch the rest of a column chunk when a read of it begins
    pub remaining_column_chunk: bool,
}

impl PrefetchPolicy {
    pub fn new(footer_caching: bool, metadata_aware: bool, predictive: bool) -> Self {
        Self {
            prefetch_tail: footer_caching,
            build_metadata: metadata_aware || predictive,
            predictive,
            remaining_column_chunk: metadata_aware && !predictive,
        }
    }

    pub fn from_config(config: &LogicalIoConfig) -> Self {
        Self::new(
            config.footer_caching_enabled(),
            config.metadata_aware_prefetching(),
            config.predictive_prefetching(),
        )
    }
}

/// The eventual outcome of a background prefetch
///
/// A handle never fails: the task behind it converts its errors to a default value. Dropping the
/// handle leaves the task running.
pub struct PrefetchHandle<T> {
    inner: HandleInner<T>,
}

enum HandleInner<T> {
    Ready(Option<T>),
    Spawned(JoinHandle<T>),
}

impl<T> PrefetchHandle<T>
where
    T: Send + 'static,
{
    /// A handle already resolved to `value`
    pub fn ready(value: T) -> Self {
        Self {
            inner: HandleInner::Ready(Some(value)),
        }
    }

    /// Spawn `future` onto the tokio runtime
    pub fn spawn(future: impl Future<Output = T> + Send + 'static) -> Self {
        Self {
            inner: HandleInner::Spawned(tokio::spawn(future)),
        }
    }

    /// `true` if the handle was resolved without spawning a task
    pub fn is_ready(&self) -> bool {
        matches!(self.inner, HandleInner::Ready(_))
    }
}

// The join handle is Unpin and the ready value is never pinned.
impl<T> Unpin for PrefetchHandle<T> {}

impl<T> Future for PrefetchHandle<T>
where
    T: Default + Send + 'static,
{
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().inner {
            HandleInner::Ready(value) => Poll::Ready(value.take().unwrap_or_default()),
            HandleInner::Spawned(handle) => handle.poll_unpin(cx).map(|result| {
                result.unwrap_or_else(|error| {
                    warn!(%error, "prefetch task did not complete");
                    T::default()
                })
            }),
        }
    }
}

impl<T> Debug for PrefetchHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.inner {
            HandleInner::Ready(_) => "ready",
            HandleInner::Spawned(handle) if handle.is_finished() => "finished",
            HandleInner::Spawned(_) => "running",
        };
        f.debug_struct("PrefetchHandle")
            .field("state", &state)
            .finish()
    }
}

/// Handles for the prefetches started when a file is opened
#[derive(Debug)]
pub struct FooterPrefetch {
    /// The ranges of the tail prefetch, `None` if footer caching is disabled
    pub tail: Option<PrefetchHandle<Vec<ByteRange>>>,
    /// The outcome of the metadata pipeline, ending with the predictive prefetch
    pub metadata: PrefetchHandle<IoPlanExecution>,
}

/// Prefetching for one open file
///
/// Cheap to clone, all clones share the same tasks and the [`ParquetMetadataStore`] of the
/// session the file was opened in.
#[derive(Debug, Clone)]
pub struct ParquetPrefetcher {
    path: Path,
    store: Arc<ParquetMetadataStore>,
    policy: PrefetchPolicy,
    telemetry: Telemetry,
    prefetch_tail_task: PrefetchTailTask,
    read_tail_task: ReadTailTask,
    metadata_parsing_task: MetadataParsingTask,
    remaining_column_task: RemainingColumnTask,
    predictive_task: PredictivePrefetchingTask,
}

impl ParquetPrefetcher {
    pub fn new(
        physical: Arc<dyn PhysicalIo>,
        store: Arc<ParquetMetadataStore>,
        config: Arc<LogicalIoConfig>,
        telemetry: Telemetry,
    ) -> Self {
        Self::new_with_decoder(physical, store, config, telemetry, Arc::new(ParquetFooterDecoder))
    }

    pub fn new_with_decoder(
        physical: Arc<dyn PhysicalIo>,
        store: Arc<ParquetMetadataStore>,
        config: Arc<LogicalIoConfig>,
        telemetry: Telemetry,
        decoder: Arc<dyn FooterDecoder>,
    ) -> Self {
        let path = physical.path().clone();
        Self {
            policy: PrefetchPolicy::from_config(&config),
            prefetch_tail_task: PrefetchTailTask::new(
                Arc::clone(&physical),
                Arc::clone(&config),
                telemetry,
            ),
            read_tail_task: ReadTailTask::new(Arc::clone(&physical), config, telemetry),
            metadata_parsing_task: MetadataParsingTask::new(
                path.clone(),
                decoder,
                Arc::clone(&store),
            ),
            remaining_column_task: RemainingColumnTask::new(
                Arc::clone(&physical),
                Arc::clone(&store),
                telemetry,
            ),
            predictive_task: PredictivePrefetchingTask::new(
                physical,
                Arc::clone(&store),
                telemetry,
            ),
            path,
            store,
            telemetry,
        }
    }

    pub fn policy(&self) -> PrefetchPolicy {
        self.policy
    }

    /// Prefetch the tail of the file, and build and store its column mappers unless they are
    /// already stored
    ///
    /// Once the mappers are built, the columns recently read from files with the same schema are
    /// prefetched as well if predictive prefetching is enabled.
    pub fn prefetch_footer_and_build_metadata(&self) -> FooterPrefetch {
        let tail = self.policy.prefetch_tail.then(|| {
            let task = self.prefetch_tail_task.clone();
            let path = self.path.clone();
            PrefetchHandle::spawn(async move {
                task.prefetch_tail().await.unwrap_or_else(|error| {
                    warn!(%path, %error, "unable to prefetch file tail");
                    vec![]
                })
            })
        });

        if !self.should_prefetch() {
            debug!(path = %self.path, "not building column mappers");
            return FooterPrefetch {
                tail,
                metadata: PrefetchHandle::ready(IoPlanExecution::skipped()),
            };
        }

        let this = self.clone();
        let metadata = PrefetchHandle::spawn(async move {
            let operation =
                Operation::new(PREFETCH_FOOTER_AND_METADATA_OPERATION).with_uri(&this.path);
            this.telemetry
                .measure_standard(operation, this.build_metadata_and_prefetch())
                .await
                .unwrap_or_else(|error| {
                    warn!(path = %this.path, %error, "unable to prefetch parquet metadata");
                    IoPlanExecution::skipped()
                })
        });

        FooterPrefetch { tail, metadata }
    }

    async fn build_metadata_and_prefetch(&self) -> crate::task::Result<IoPlanExecution> {
        let tail = self.read_tail_task.read_file_tail().await?;
        let mappers = self.metadata_parsing_task.store_column_mappers(tail)?;
        if !self.policy.predictive {
            return Ok(IoPlanExecution::skipped());
        }
        self.predictive_task.prefetch_recent_columns(&mappers).await
    }

    /// Prefetch the rest of the column chunk a read of `len` bytes at `position` begins
    pub fn prefetch_remaining_column_chunk(
        &self,
        position: u64,
        len: u64,
    ) -> PrefetchHandle<IoPlanExecution> {
        if !self.policy.remaining_column_chunk {
            return PrefetchHandle::ready(IoPlanExecution::skipped());
        }

        let task = self.remaining_column_task.clone();
        let telemetry = self.telemetry;
        let path = self.path.clone();
        PrefetchHandle::spawn(async move {
            let mut operation = Operation::new(PREFETCH_COLUMN_CHUNK_OPERATION).with_uri(&path);
            if let Some(range) = ByteRange::with_len(position, len) {
                operation = operation.with_range(range);
            }
            telemetry
                .measure_verbose(operation, task.prefetch_remaining_column_chunk(position, len))
                .await
                .unwrap_or_else(|error| {
                    warn!(%path, position, %error, "unable to prefetch remaining column chunk");
                    IoPlanExecution::skipped()
                })
        })
    }

    /// Record a read starting at `position` in the recent column history
    pub fn add_to_recent_column_list(&self, position: u64) -> Option<ColumnMetadata> {
        self.predictive_task.add_to_recent_column_list(position)
    }

    /// Whether the metadata pipeline should run: it is enabled, and the mappers of the file are
    /// not stored yet
    pub fn should_prefetch(&self) -> bool {
        self.policy.build_metadata && self.store.get_column_mappers(&self.path).is_none()
    }
}
