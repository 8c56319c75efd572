//! Object store wrappers for tests
use std::{collections::HashMap, ops::Range, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use object_store::{
    GetOptions, GetResult, ListResult, MultipartUpload, ObjectMeta, ObjectStore, PutMultipartOpts,
    PutOptions, PutPayload, PutResult, Result, path::Path,
};
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RequestKind {
    Get,
    GetRange,
    GetRanges,
    Head,
}

/// Wraps an [`ObjectStore`] and counts the requests made per path
///
/// Requests are counted once per call, so a single `get_ranges` for any number of ranges counts
/// as one request.
#[derive(Debug)]
pub struct RequestCountedObjectStore {
    inner: Arc<dyn ObjectStore>,
    counts: Mutex<HashMap<(Path, RequestKind), usize>>,
}

impl RequestCountedObjectStore {
    pub fn new(inner: Arc<dyn ObjectStore>) -> Self {
        Self {
            inner,
            counts: Default::default(),
        }
    }

    fn count(&self, path: &Path, kind: RequestKind) {
        *self.counts.lock().entry((path.clone(), kind)).or_default() += 1;
    }

    fn total(&self, path: &Path, kinds: &[RequestKind]) -> usize {
        let counts = self.counts.lock();
        kinds
            .iter()
            .filter_map(|kind| counts.get(&(path.clone(), *kind)))
            .sum()
    }

    /// Number of requests for the bytes of the object at `path`
    pub fn total_read_request_count(&self, path: &Path) -> usize {
        self.total(
            path,
            &[
                RequestKind::Get,
                RequestKind::GetRange,
                RequestKind::GetRanges,
            ],
        )
    }

    /// Number of `get_ranges` requests for the object at `path`
    pub fn get_ranges_request_count(&self, path: &Path) -> usize {
        self.total(path, &[RequestKind::GetRanges])
    }

    /// Number of `HEAD` requests for the object at `path`
    pub fn total_head_request_count(&self, path: &Path) -> usize {
        self.total(path, &[RequestKind::Head])
    }
}

impl std::fmt::Display for RequestCountedObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RequestCounted({})", self.inner)
    }
}

#[async_trait]
impl ObjectStore for RequestCountedObjectStore {
    async fn put_opts(
        &self,
        location: &Path,
        payload: PutPayload,
        opts: PutOptions,
    ) -> Result<PutResult> {
        self.inner.put_opts(location, payload, opts).await
    }

    async fn put_multipart_opts(
        &self,
        location: &Path,
        opts: PutMultipartOpts,
    ) -> Result<Box<dyn MultipartUpload>> {
        self.inner.put_multipart_opts(location, opts).await
    }

    async fn get_opts(&self, location: &Path, options: GetOptions) -> Result<GetResult> {
        self.count(location, RequestKind::Get);
        self.inner.get_opts(location, options).await
    }

    async fn get_range(&self, location: &Path, range: Range<usize>) -> Result<Bytes> {
        self.count(location, RequestKind::GetRange);
        self.inner.get_range(location, range).await
    }

    async fn get_ranges(&self, location: &Path, ranges: &[Range<usize>]) -> Result<Vec<Bytes>> {
        self.count(location, RequestKind::GetRanges);
        self.inner.get_ranges(location, ranges).await
    }

    async fn head(&self, location: &Path) -> Result<ObjectMeta> {
        self.count(location, RequestKind::Head);
        self.inner.head(location).await
    }

    async fn delete(&self, location: &Path) -> Result<()> {
        self.inner.delete(location).await
    }

    fn list(&self, prefix: Option<&Path>) -> BoxStream<'_, Result<ObjectMeta>> {
        self.inner.list(prefix)
    }

    async fn list_with_delimiter(&self, prefix: Option<&Path>) -> Result<ListResult> {
        self.inner.list_with_delimiter(prefix).await
    }

    async fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        self.inner.copy(from, to).await
    }

    async fn copy_if_not_exists(&self, from: &Path, to: &Path) -> Result<()> {
        self.inner.copy_if_not_exists(from, to).await
    }
}
