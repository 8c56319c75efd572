//! A shared, bounded store of parsed Parquet metadata and recent column accesses
use std::{fmt::Debug, num::NonZeroUsize, sync::Arc};

use clru::CLruCache;
use indexmap::IndexSet;
use object_store::path::Path;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::{
    column_mappers::{ColumnMappers, ColumnMetadata},
    config::LogicalIoConfig,
};

/// The distinct column names most recently read from files of one schema
///
/// Names are kept in the order they were last read, most recent last. Once `capacity` is
/// exceeded the least recently read name is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentColumnAccess {
    columns: IndexSet<String>,
    capacity: usize,
}

impl RecentColumnAccess {
    pub fn new(capacity: usize) -> Self {
        Self {
            columns: IndexSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a read of `column_name`, making it the most recent entry
    pub fn record(&mut self, column_name: &str) {
        // re-inserting moves an existing name to the back:
        self.columns.shift_remove(column_name);
        self.columns.insert(column_name.to_string());
        while self.columns.len() > self.capacity {
            self.columns.shift_remove_index(0);
        }
    }

    /// Column names from least to most recently read
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Store of [`ColumnMappers`] by file, and [`RecentColumnAccess`] by schema
///
/// The store is shared by all files opened in a session, and is safe to use concurrently from
/// any number of readers. Both maps are bounded independently and evict least recently used
/// entries. A capacity of zero turns the respective map into a no-op.
///
/// Recent accesses are tracked per schema, identified by [`ColumnMappers::schema_hash`], so that
/// reads from one file inform prefetching for other files with the same columns.
pub struct ParquetMetadataStore {
    column_mappers: Option<Mutex<CLruCache<Path, Arc<ColumnMappers>>>>,
    recent_columns: Option<Mutex<CLruCache<i64, RecentColumnAccess>>>,
    max_column_access_count: usize,
}

impl ParquetMetadataStore {
    /// Create a store holding the mappers of up to `metadata_store_size` files, remembering up
    /// to `max_column_access_count` recently read columns per schema
    pub fn new(metadata_store_size: usize, max_column_access_count: usize) -> Self {
        let capacity = NonZeroUsize::new(metadata_store_size);
        Self {
            column_mappers: capacity.map(|c| Mutex::new(CLruCache::new(c))),
            recent_columns: capacity
                .filter(|_| max_column_access_count > 0)
                .map(|c| Mutex::new(CLruCache::new(c))),
            max_column_access_count,
        }
    }

    pub fn from_config(config: &LogicalIoConfig) -> Self {
        Self::new(
            config.parquet_metadata_store_size,
            config.max_column_access_count_store_size,
        )
    }

    /// Get the mappers for the file at `path`, if they have been stored
    pub fn get_column_mappers(&self, path: &Path) -> Option<Arc<ColumnMappers>> {
        self.column_mappers
            .as_ref()?
            .lock()
            .get(path)
            .map(Arc::clone)
    }

    /// Store the mappers for the file at `path`
    ///
    /// Files are treated as immutable, so mappers already stored for a path are kept and the new
    /// ones are dropped. This makes concurrent parses of the same file harmless.
    pub fn put_column_mappers(&self, path: &Path, mappers: Arc<ColumnMappers>) {
        let Some(store) = self.column_mappers.as_ref() else {
            return;
        };
        let mut store = store.lock();
        if store.peek(path).is_some() {
            trace!(%path, "column mappers already stored");
            return;
        }
        if store.len() == store.capacity() {
            if let Some((evicted, _)) = store.pop_back() {
                debug!(%path, %evicted, "evicted least recently used column mappers");
            }
        }
        store.put(path.clone(), mappers);
    }

    /// Record a read at `position` in the file at `path`
    ///
    /// If the position is the start of a known column chunk, its column becomes the most
    /// recently read one for the file's schema, and its [`ColumnMetadata`] is returned. Otherwise
    /// this is a no-op.
    pub fn record_access(&self, path: &Path, position: u64) -> Option<ColumnMetadata> {
        let mappers = self.get_column_mappers(path)?;
        let column = mappers.column_at(position)?.clone();
        if let Some(recent) = self.recent_columns.as_ref() {
            let mut recent = recent.lock();
            match recent.get_mut(&column.schema_hash) {
                Some(access) => access.record(&column.column_name),
                None => {
                    let mut access = RecentColumnAccess::new(self.max_column_access_count);
                    access.record(&column.column_name);
                    recent.put(column.schema_hash, access);
                }
            }
        }
        trace!(%path, position, column = %column.column_name, "recorded column access");
        Some(column)
    }

    /// Column names recently read from files with the given schema, least recent first
    pub fn recent_columns(&self, schema_hash: i64) -> Vec<String> {
        self.recent_columns
            .as_ref()
            .and_then(|recent| {
                recent
                    .lock()
                    .get(&schema_hash)
                    .map(|access| access.columns().map(str::to_string).collect())
            })
            .unwrap_or_default()
    }

    /// Number of files with stored mappers
    pub fn len(&self) -> usize {
        self.column_mappers
            .as_ref()
            .map(|store| store.lock().len())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything in the store
    pub fn clear(&self) {
        if let Some(store) = self.column_mappers.as_ref() {
            store.lock().clear();
        }
        if let Some(recent) = self.recent_columns.as_ref() {
            recent.lock().clear();
        }
    }
}

impl Debug for ParquetMetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParquetMetadataStore")
            .field("files", &self.len())
            .field("max_column_access_count", &self.max_column_access_count)
            .finish_non_exhaustive()
    }
}
