//! Planning of the byte ranges that make up the tail of a Parquet file
//!
//! The tail holds the file metadata (footer) and, preceding it, the page index. Since the size of
//! either is only known once the footer has been read, fixed sized regions, taken from the
//! [`LogicalIoConfig`], are fetched instead.
use crate::{config::LogicalIoConfig, range::ByteRange};

/// The regions making up the tail of a file of a given length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TailRegions {
    /// The object is small enough to be fetched whole
    WholeObject(ByteRange),
    /// The file metadata, optionally preceded by the page index
    Footer {
        metadata: ByteRange,
        page_index: Option<ByteRange>,
    },
}

fn tail_regions(config: &LogicalIoConfig, content_length: u64) -> Option<TailRegions> {
    if content_length == 0 {
        return None;
    }
    let last_byte = content_length - 1;

    if config.small_objects_prefetching_enabled
        && content_length <= config.small_object_size_threshold
    {
        return Some(TailRegions::WholeObject(ByteRange::try_new(0, last_byte).ok()?));
    }

    let (metadata_size, page_index_size) = if content_length >= config.large_file_size {
        (
            config.large_file_metadata_prefetch_size,
            config.large_file_page_index_prefetch_size,
        )
    } else {
        (
            config.file_metadata_prefetch_size,
            config.file_page_index_prefetch_size,
        )
    };

    let metadata_start = content_length.saturating_sub(metadata_size);
    let metadata = ByteRange::try_new(metadata_start, last_byte).ok()?;

    // only when there is something before the metadata region is there a page index to fetch:
    let has_page_index =
        config.page_index_prefetch_enabled && metadata_start > 0 && page_index_size > 0;
    let page_index = has_page_index
        .then(|| {
            ByteRange::try_new(
                metadata_start.saturating_sub(page_index_size),
                metadata_start - 1,
            )
            .ok()
        })
        .flatten();

    Some(TailRegions::Footer {
        metadata,
        page_index,
    })
}

/// The single inclusive range holding the file metadata
///
/// This is the whole object if it is small enough, or the metadata region at the end of the file
/// otherwise. `None` for an empty object.
pub fn file_tail_range(config: &LogicalIoConfig, content_length: u64) -> Option<ByteRange> {
    tail_regions(config, content_length).map(|regions| match regions {
        TailRegions::WholeObject(range) => range,
        TailRegions::Footer { metadata, .. } => metadata,
    })
}

/// All ranges to prefetch for the tail of a file: the metadata region first, followed by the page
/// index region when there is one
///
/// The ranges are returned unmerged; wrapping them in an [`IoPlan`][crate::plan::IoPlan] merges
/// them.
pub fn file_tail_prefetch_ranges(config: &LogicalIoConfig, content_length: u64) -> Vec<ByteRange> {
    match tail_regions(config, content_length) {
        None => vec![],
        Some(TailRegions::WholeObject(range)) => vec![range],
        Some(TailRegions::Footer {
            metadata,
            page_index,
        }) => std::iter::once(metadata).chain(page_index).collect(),
    }
}
