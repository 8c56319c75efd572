//! The physical layer: fetching bytes of a single object from an object store
//!
//! The prefetching engine only ever talks to a [`PhysicalIo`]. [`ObjectStorePhysicalIo`] is the
//! implementation over an [`ObjectStore`], which keeps the bytes fetched by executed
//! [`IoPlan`]s in a bounded buffer so that later reads of those ranges are served without a
//! request.
use std::{collections::hash_map::RandomState, fmt::Debug, num::NonZeroUsize, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use clru::{CLruCache, CLruCacheConfig, WeightScale};
use object_store::{ObjectStore, path::Path};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, trace};

use crate::{
    plan::{IoPlan, IoPlanExecution},
    range::ByteRange,
};

#[derive(Debug, Error)]
pub enum PhysicalIoError {
    #[error("object store request for {path} failed")]
    ObjectStore {
        path: Path,
        #[source]
        source: object_store::Error,
    },

    #[error("range {range} is out of bounds for {path} of length {content_length}")]
    OutOfBounds {
        path: Path,
        range: ByteRange,
        content_length: u64,
    },

    #[error("object store returned {actual} bytes for range {range} of {path}")]
    ShortRead {
        path: Path,
        range: ByteRange,
        actual: usize,
    },
}

pub type Result<T, E = PhysicalIoError> = std::result::Result<T, E>;

/// Metadata of the object behind a [`PhysicalIo`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub content_length: u64,
}

/// Ranged access to the bytes of a single object
#[async_trait]
pub trait PhysicalIo: Debug + Send + Sync + 'static {
    /// Location of the object
    fn path(&self) -> &Path;

    async fn metadata(&self) -> Result<ObjectMetadata>;

    /// Fetch the ranges of `plan` ahead of them being read
    ///
    /// May be called concurrently with other plans for the same object.
    async fn execute(&self, plan: IoPlan) -> Result<IoPlanExecution>;

    /// Read a range of bytes, from previously fetched data where possible
    async fn read(&self, range: ByteRange) -> Result<Bytes>;
}

/// Weighs a fetched block by its size in bytes
#[derive(Debug)]
struct BlockScale;

impl WeightScale<u64, Bytes> for BlockScale {
    fn weight(&self, _start: &u64, block: &Bytes) -> usize {
        block.len()
    }
}

type BlockBuffer = CLruCache<u64, Bytes, RandomState, BlockScale>;

/// A [`PhysicalIo`] over an [`ObjectStore`]
///
/// The content length is fetched once with a `HEAD` request. Ranges fetched by
/// [`execute`][PhysicalIo::execute] are held in memory, keyed by their start offset, up to the
/// buffer capacity in bytes. The least recently read blocks are evicted to make room for new
/// ones, and a block larger than the whole buffer is not kept.
#[derive(Debug)]
pub struct ObjectStorePhysicalIo {
    store: Arc<dyn ObjectStore>,
    path: Path,
    metadata: OnceCell<ObjectMetadata>,
    /// `None` if buffering is disabled
    blocks: Option<Mutex<BlockBuffer>>,
}

impl ObjectStorePhysicalIo {
    /// Create a [`ObjectStorePhysicalIo`] buffering up to `buffer_capacity` bytes of fetched
    /// data, with 0 disabling buffering
    pub fn new(store: Arc<dyn ObjectStore>, path: Path, buffer_capacity: usize) -> Self {
        let blocks = NonZeroUsize::new(buffer_capacity).map(|capacity| {
            Mutex::new(CLruCache::with_config(
                CLruCacheConfig::new(capacity).with_scale(BlockScale),
            ))
        });
        Self {
            store,
            path,
            metadata: OnceCell::new(),
            blocks,
        }
    }

    /// Find a fetched block that fully covers `range`, and slice the range out of it
    fn buffered(&self, range: &ByteRange) -> Option<Bytes> {
        let mut blocks = self.blocks.as_ref()?.lock();
        let block_start = blocks
            .iter()
            .find(|(start, block)| block_covers(**start, block, range))
            .map(|(start, _)| *start)?;
        // a read marks the block as recently used:
        let block = blocks.get(&block_start)?;
        let offset = (range.start() - block_start) as usize;
        Some(block.slice(offset..offset + range.len() as usize))
    }

    fn is_buffered(&self, range: &ByteRange) -> bool {
        self.blocks.as_ref().is_some_and(|blocks| {
            blocks
                .lock()
                .iter()
                .any(|(start, block)| block_covers(*start, block, range))
        })
    }

    fn keep(&self, range: ByteRange, bytes: Bytes) {
        let Some(blocks) = &self.blocks else {
            return;
        };
        let mut blocks = blocks.lock();
        // keep the longer block if two plans fetched from the same start:
        if blocks
            .peek(&range.start())
            .is_some_and(|existing| existing.len() >= bytes.len())
        {
            return;
        }
        if blocks.put_with_weight(range.start(), bytes).is_err() {
            debug!(path = %self.path, %range, "fetched range larger than the buffer, not kept");
        }
    }

    fn check_bounds(&self, range: &ByteRange, content_length: u64) -> Result<()> {
        if range.end() >= content_length {
            return Err(PhysicalIoError::OutOfBounds {
                path: self.path.clone(),
                range: *range,
                content_length,
            });
        }
        Ok(())
    }

    async fn fetch(&self, ranges: &[ByteRange]) -> Result<Vec<Bytes>> {
        let std_ranges: Vec<_> = ranges.iter().map(ByteRange::to_std_range).collect();
        let fetched = self
            .store
            .get_ranges(&self.path, &std_ranges)
            .await
            .map_err(|source| PhysicalIoError::ObjectStore {
                path: self.path.clone(),
                source,
            })?;
        for (range, bytes) in ranges.iter().zip(&fetched) {
            if bytes.len() as u64 != range.len() {
                return Err(PhysicalIoError::ShortRead {
                    path: self.path.clone(),
                    range: *range,
                    actual: bytes.len(),
                });
            }
        }
        Ok(fetched)
    }
}

fn block_covers(block_start: u64, block: &Bytes, range: &ByteRange) -> bool {
    block_start <= range.start() && range.end() - block_start < block.len() as u64
}

#[async_trait]
impl PhysicalIo for ObjectStorePhysicalIo {
    fn path(&self) -> &Path {
        &self.path
    }

    async fn metadata(&self) -> Result<ObjectMetadata> {
        self.metadata
            .get_or_try_init(|| async {
                self.store
                    .head(&self.path)
                    .await
                    .map(|meta| ObjectMetadata {
                        content_length: meta.size as u64,
                    })
                    .map_err(|source| PhysicalIoError::ObjectStore {
                        path: self.path.clone(),
                        source,
                    })
            })
            .await
            .copied()
    }

    async fn execute(&self, plan: IoPlan) -> Result<IoPlanExecution> {
        let content_length = self.metadata().await?.content_length;
        let to_fetch: Vec<ByteRange> = plan
            .into_prefetch_ranges()
            .into_iter()
            .filter(|range| !self.is_buffered(range))
            .collect();
        if to_fetch.is_empty() {
            trace!(path = %self.path, "all planned ranges already fetched");
            return Ok(IoPlanExecution::skipped());
        }
        for range in &to_fetch {
            self.check_bounds(range, content_length)?;
        }

        let fetched = self.fetch(&to_fetch).await?;
        debug!(
            path = %self.path,
            n_ranges = to_fetch.len(),
            "fetched planned ranges"
        );
        for (range, bytes) in to_fetch.into_iter().zip(fetched) {
            self.keep(range, bytes);
        }
        Ok(IoPlanExecution::executed())
    }

    async fn read(&self, range: ByteRange) -> Result<Bytes> {
        if let Some(bytes) = self.buffered(&range) {
            trace!(path = %self.path, %range, "read served from fetched bytes");
            return Ok(bytes);
        }
        let content_length = self.metadata().await?.content_length;
        self.check_bounds(&range, content_length)?;
        let mut fetched = self.fetch(&[range]).await?;
        Ok(fetched.pop().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use object_store::{PutPayload, memory::InMemory};
    use parquet_prefetch_test_helpers::object_store::RequestCountedObjectStore;
    use pretty_assertions::assert_eq;

    use super::*;

    const BUFFER_CAPACITY: usize = 1024;

    fn r(start: u64, end: u64) -> ByteRange {
        ByteRange::try_new(start, end).unwrap()
    }

    async fn setup_with_capacity(
        payload: Bytes,
        buffer_capacity: usize,
    ) -> (Arc<RequestCountedObjectStore>, ObjectStorePhysicalIo) {
        let store = Arc::new(RequestCountedObjectStore::new(Arc::new(InMemory::new())));
        let path = Path::from("data/0.parquet");
        store
            .put(&path, PutPayload::from_bytes(payload))
            .await
            .unwrap();
        let io = ObjectStorePhysicalIo::new(Arc::clone(&store) as _, path, buffer_capacity);
        (store, io)
    }

    async fn setup(
        payload: &'static [u8],
    ) -> (Arc<RequestCountedObjectStore>, ObjectStorePhysicalIo) {
        setup_with_capacity(Bytes::from_static(payload), BUFFER_CAPACITY).await
    }

    fn buffered_bytes(io: &ObjectStorePhysicalIo) -> usize {
        io.blocks
            .as_ref()
            .map(|blocks| blocks.lock().iter().map(|(_, block)| block.len()).sum())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn metadata_fetched_once() {
        let (store, io) = setup(b"hello world").await;
        assert_eq!(11, io.metadata().await.unwrap().content_length);
        assert_eq!(11, io.metadata().await.unwrap().content_length);
        assert_eq!(1, store.total_head_request_count(io.path()));
    }

    #[tokio::test]
    async fn executed_plan_serves_reads() {
        let (store, io) = setup(b"0123456789abcdef").await;

        let execution = io.execute(IoPlan::new([r(2, 5), r(10, 15)])).await.unwrap();
        assert_eq!(IoPlanExecution::executed(), execution);
        assert_eq!(1, store.total_read_request_count(io.path()));
        assert_eq!(1, store.get_ranges_request_count(io.path()));

        assert_eq!(Bytes::from_static(b"345"), io.read(r(3, 5)).await.unwrap());
        assert_eq!(Bytes::from_static(b"abcdef"), io.read(r(10, 15)).await.unwrap());
        assert_eq!(1, store.total_read_request_count(io.path()));

        // spans a gap in what was fetched, so goes to the store:
        assert_eq!(Bytes::from_static(b"56789a"), io.read(r(5, 10)).await.unwrap());
        assert_eq!(2, store.total_read_request_count(io.path()));
    }

    #[tokio::test]
    async fn re_executing_a_plan_is_skipped() {
        let (store, io) = setup(b"0123456789").await;
        io.execute(IoPlan::new([r(0, 9)])).await.unwrap();

        let execution = io.execute(IoPlan::new([r(3, 4)])).await.unwrap();

        assert!(execution.is_skipped());
        assert_eq!(1, store.total_read_request_count(io.path()));
    }

    #[tokio::test]
    async fn read_served_by_larger_block_starting_earlier() {
        let content: Vec<u8> = (0..100).collect();
        let (store, io) = setup_with_capacity(content.clone().into(), BUFFER_CAPACITY).await;
        io.execute(IoPlan::new([r(50, 59)])).await.unwrap();
        io.execute(IoPlan::new([r(0, 99)])).await.unwrap();
        assert_eq!(2, store.total_read_request_count(io.path()));

        // the block at 50 is closer but too short, the one at 0 covers the read:
        assert_eq!(&content[55..=80], io.read(r(55, 80)).await.unwrap().as_ref());
        assert!(io.execute(IoPlan::new([r(52, 90)])).await.unwrap().is_skipped());
        assert_eq!(2, store.total_read_request_count(io.path()));
    }

    #[tokio::test]
    async fn buffer_is_bounded() {
        let content: Vec<u8> = (0..200).collect();
        let (store, io) = setup_with_capacity(content.clone().into(), 100).await;

        io.execute(IoPlan::new([r(0, 39)])).await.unwrap();
        io.execute(IoPlan::new([r(100, 139)])).await.unwrap();
        assert_eq!(80, buffered_bytes(&io));
        // reading the first block makes the second the least recently used:
        io.read(r(0, 39)).await.unwrap();

        io.execute(IoPlan::new([r(150, 189)])).await.unwrap();
        assert_eq!(80, buffered_bytes(&io));
        assert_eq!(3, store.total_read_request_count(io.path()));

        assert_eq!(&content[0..40], io.read(r(0, 39)).await.unwrap().as_ref());
        assert_eq!(&content[150..190], io.read(r(150, 189)).await.unwrap().as_ref());
        assert_eq!(3, store.total_read_request_count(io.path()));
        // evicted, so fetched again:
        assert_eq!(&content[100..140], io.read(r(100, 139)).await.unwrap().as_ref());
        assert_eq!(4, store.total_read_request_count(io.path()));

        // larger than the whole buffer, so not kept:
        io.execute(IoPlan::new([r(0, 149)])).await.unwrap();
        assert_eq!(5, store.total_read_request_count(io.path()));
        assert!(!io.is_buffered(&r(0, 149)));
        assert!(buffered_bytes(&io) <= 100);
    }

    #[tokio::test]
    async fn zero_capacity_disables_buffering() {
        let (store, io) = setup_with_capacity(Bytes::from_static(b"0123456789"), 0).await;

        io.execute(IoPlan::new([r(0, 9)])).await.unwrap();
        assert_eq!(0, buffered_bytes(&io));
        assert_eq!(Bytes::from_static(b"234"), io.read(r(2, 4)).await.unwrap());
        assert_eq!(2, store.total_read_request_count(io.path()));
    }

    #[tokio::test]
    async fn out_of_bounds() {
        let (_, io) = setup(b"0123456789").await;
        let err = io.execute(IoPlan::new([r(5, 10)])).await.unwrap_err();
        assert!(matches!(
            err,
            PhysicalIoError::OutOfBounds {
                content_length: 10,
                ..
            }
        ));
        assert!(io.read(r(10, 10)).await.is_err());
    }

    #[tokio::test]
    async fn missing_object() {
        let store = Arc::new(InMemory::new());
        let io = ObjectStorePhysicalIo::new(store, Path::from("nope.parquet"), BUFFER_CAPACITY);
        let err = io.metadata().await.unwrap_err();
        assert!(matches!(err, PhysicalIoError::ObjectStore { .. }));
    }
}
