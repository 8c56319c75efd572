//! Parsing the footer of a file into its [`ColumnMappers`]
use std::sync::Arc;

use object_store::path::Path;
use tracing::{debug, error};

use crate::{
    column_mappers::ColumnMappers,
    footer::{FileTail, FooterDecoder},
    store::ParquetMetadataStore,
};

use super::{PrefetchError, Result};

#[derive(Debug, Clone)]
pub struct MetadataParsingTask {
    path: Path,
    decoder: Arc<dyn FooterDecoder>,
    store: Arc<ParquetMetadataStore>,
}

impl MetadataParsingTask {
    pub fn new(
        path: Path,
        decoder: Arc<dyn FooterDecoder>,
        store: Arc<ParquetMetadataStore>,
    ) -> Self {
        Self {
            path,
            decoder,
            store,
        }
    }

    /// Decode the footer held in `tail`, then build and store the mappers of the file
    ///
    /// Nothing is stored if decoding fails.
    pub fn store_column_mappers(&self, tail: FileTail) -> Result<Arc<ColumnMappers>> {
        let footer = self.decoder.decode(&tail).map_err(|source| {
            error!(
                path = %self.path,
                error = %source,
                "unable to parse parquet footer, falling back to synchronous reads"
            );
            PrefetchError::Decode {
                path: self.path.clone(),
                source,
            }
        })?;

        let mappers = Arc::new(ColumnMappers::build(&footer));
        self.store
            .put_column_mappers(&self.path, Arc::clone(&mappers));
        debug!(
            path = %self.path,
            n_row_groups = footer.row_groups.len(),
            "stored column mappers"
        );
        Ok(mappers)
    }
}
