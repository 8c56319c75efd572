//! The units of work the [`ParquetPrefetcher`][crate::prefetcher::ParquetPrefetcher] schedules
//!
//! Each task fails with a [`PrefetchError`]. Tasks never log fetch failures themselves, that is
//! left to the caller, which decides whether a failure matters.
use object_store::path::Path;
use thiserror::Error;

use crate::{footer::FooterDecodeError, physical::PhysicalIoError};

pub mod metadata_parsing;
pub mod predictive;
pub mod prefetch_tail;
pub mod read_tail;
pub mod remaining_column;

pub use metadata_parsing::MetadataParsingTask;
pub use predictive::PredictivePrefetchingTask;
pub use prefetch_tail::PrefetchTailTask;
pub use read_tail::ReadTailTask;
pub use remaining_column::RemainingColumnTask;

#[derive(Debug, Error)]
pub enum PrefetchError {
    #[error("failed to fetch from {path}")]
    Fetch {
        path: Path,
        #[source]
        source: PhysicalIoError,
    },

    #[error("failed to decode the parquet footer of {path}")]
    Decode {
        path: Path,
        #[source]
        source: FooterDecodeError,
    },

    #[error("{path} is empty, so has no parquet footer")]
    EmptyObject { path: Path },
}

pub type Result<T, E = PrefetchError> = std::result::Result<T, E>;

impl PrefetchError {
    pub(crate) fn fetch(path: &Path) -> impl FnOnce(PhysicalIoError) -> Self {
        move |source| Self::Fetch {
            path: path.clone(),
            source,
        }
    }
}
