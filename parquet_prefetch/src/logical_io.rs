//! Reading Parquet files through the prefetching engine
//!
//! A [`PrefetchSession`] holds the state shared by all files read through it, most notably the
//! [`ParquetMetadataStore`]. Each file is read through a [`ParquetLogicalIo`] opened from the
//! session, which drives a [`ParquetPrefetcher`] from the reads made.
use std::sync::Arc;

use bytes::Bytes;
use object_store::{ObjectStore, path::Path};
use regex::Regex;
use tracing::debug;

use crate::{
    config::{ConfigError, LogicalIoConfig},
    physical::{ObjectMetadata, ObjectStorePhysicalIo, PhysicalIo, PhysicalIoError, Result},
    prefetcher::{FooterPrefetch, ParquetPrefetcher},
    range::ByteRange,
    store::ParquetMetadataStore,
    telemetry::Telemetry,
};

/// State shared by all files opened for reading from an [`ObjectStore`]
///
/// Dropping the session drops its metadata store once the last file opened from it is dropped.
#[derive(Debug)]
pub struct PrefetchSession {
    object_store: Arc<dyn ObjectStore>,
    config: Arc<LogicalIoConfig>,
    metadata_store: Arc<ParquetMetadataStore>,
    telemetry: Telemetry,
    format_selector: Regex,
}

impl PrefetchSession {
    pub fn new(
        object_store: Arc<dyn ObjectStore>,
        config: LogicalIoConfig,
    ) -> Result<Self, ConfigError> {
        let format_selector = config.format_selector()?;
        Ok(Self {
            object_store,
            metadata_store: Arc::new(ParquetMetadataStore::from_config(&config)),
            config: Arc::new(config),
            telemetry: Telemetry::default(),
            format_selector,
        })
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn config(&self) -> &LogicalIoConfig {
        &self.config
    }

    pub fn metadata_store(&self) -> &Arc<ParquetMetadataStore> {
        &self.metadata_store
    }

    /// Whether files at `path` are read as Parquet, as decided by the format selector
    pub fn is_parquet(&self, path: &Path) -> bool {
        self.format_selector.is_match(path.as_ref())
    }

    /// Open the object at `path` for reading
    ///
    /// Must be called from within a tokio runtime, as prefetching of Parquet files starts right
    /// away.
    pub fn open(&self, path: Path) -> ParquetLogicalIo {
        let physical = Arc::new(ObjectStorePhysicalIo::new(
            Arc::clone(&self.object_store),
            path,
            self.config.physical_io_buffer_size,
        ));
        self.open_physical(physical)
    }

    /// Open the object behind an existing [`PhysicalIo`] for reading
    pub fn open_physical(&self, physical: Arc<dyn PhysicalIo>) -> ParquetLogicalIo {
        let prefetcher = self.is_parquet(physical.path()).then(|| {
            ParquetPrefetcher::new(
                Arc::clone(&physical),
                Arc::clone(&self.metadata_store),
                Arc::clone(&self.config),
                self.telemetry,
            )
        });
        if prefetcher.is_none() {
            debug!(path = %physical.path(), "not a parquet file, reading without prefetching");
        }
        ParquetLogicalIo::new(physical, prefetcher)
    }
}

/// Reads of a single file, feeding the prefetcher of the file as they are made
///
/// Prefetch failures never surface here: reads only fail if their own fetch fails.
#[derive(Debug)]
pub struct ParquetLogicalIo {
    physical: Arc<dyn PhysicalIo>,
    prefetcher: Option<ParquetPrefetcher>,
    footer_prefetch: Option<FooterPrefetch>,
}

impl ParquetLogicalIo {
    /// Start reading through `physical`, prefetching the footer and metadata right away if there
    /// is a `prefetcher`
    pub fn new(physical: Arc<dyn PhysicalIo>, prefetcher: Option<ParquetPrefetcher>) -> Self {
        let footer_prefetch = prefetcher
            .as_ref()
            .map(ParquetPrefetcher::prefetch_footer_and_build_metadata);
        Self {
            physical,
            prefetcher,
            footer_prefetch,
        }
    }

    pub fn path(&self) -> &Path {
        self.physical.path()
    }

    pub fn prefetcher(&self) -> Option<&ParquetPrefetcher> {
        self.prefetcher.as_ref()
    }

    /// Take the handles of the prefetches started on open, to wait for them
    ///
    /// Dropping them, which happens when this is dropped, leaves the prefetches running.
    pub fn take_footer_prefetch(&mut self) -> Option<FooterPrefetch> {
        self.footer_prefetch.take()
    }

    pub async fn metadata(&self) -> Result<ObjectMetadata> {
        self.physical.metadata().await
    }

    /// Read `len` bytes starting at `position`
    ///
    /// A read running past the largest addressable offset fails as out of bounds.
    pub async fn read(&self, position: u64, len: u64) -> Result<Bytes> {
        if len == 0 {
            return Ok(Bytes::new());
        }
        let Some(range) = ByteRange::with_len(position, len) else {
            return Err(PhysicalIoError::OutOfBounds {
                path: self.path().clone(),
                range: ByteRange::starting_at(position),
                content_length: self.metadata().await?.content_length,
            });
        };
        if let Some(prefetcher) = &self.prefetcher {
            prefetcher.add_to_recent_column_list(position);
            // the read does not wait for the prefetch
            drop(prefetcher.prefetch_remaining_column_chunk(position, len));
        }
        self.physical.read(range).await
    }

    /// Read the last `len` bytes of the file, or the whole file if it is shorter
    pub async fn read_tail(&self, len: u64) -> Result<Bytes> {
        let content_length = self.metadata().await?.content_length;
        let len = len.min(content_length);
        let Some(range) = ByteRange::with_len(content_length - len, len) else {
            return Ok(Bytes::new());
        };
        self.physical.read(range).await
    }
}
