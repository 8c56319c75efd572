//! Decoding of the structural metadata held in the tail of a Parquet file
//!
//! Only the parts of the footer needed to locate column chunks are surfaced, see
//! [`FooterMetadata`]. The value encodings of the columns themselves are never decoded.
use std::fmt::Debug;

use bytes::Bytes;
use parquet::{errors::ParquetError, file::metadata::ParquetMetaDataReader};
use thiserror::Error;

/// Length of the Parquet footer: a 4-byte metadata length followed by the 4-byte magic
const FOOTER_SIZE: usize = 8;
const PARQUET_MAGIC: [u8; 4] = *b"PAR1";

#[derive(Debug, Error)]
pub enum FooterDecodeError {
    #[error("file tail of {length} bytes is too short to hold a parquet footer")]
    TailTooShort { length: u64 },

    #[error("file tail does not end with the parquet magic bytes")]
    BadMagic,

    #[error(
        "file tail of {tail_length} bytes is truncated, the file metadata needs {metadata_length} \
        bytes plus the footer"
    )]
    TruncatedMetadata {
        tail_length: u64,
        metadata_length: u64,
    },

    #[error("failed to decode parquet file metadata")]
    Parquet(#[from] ParquetError),

    #[error("column chunk {column} in row group {row_group} has a negative {field}")]
    NegativeValue {
        row_group: usize,
        column: String,
        field: &'static str,
    },
}

/// The bytes read from the end of an object, which are expected to hold its Parquet footer
#[derive(Debug, Clone)]
pub struct FileTail {
    bytes: Bytes,
    length: u64,
}

impl FileTail {
    pub fn new(bytes: Bytes) -> Self {
        let length = bytes.len() as u64;
        Self { bytes, length }
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn length(&self) -> u64 {
        self.length
    }
}

/// The structure of a Parquet file: its row groups and the column chunks in each
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FooterMetadata {
    pub row_groups: Vec<RowGroupFooter>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowGroupFooter {
    pub columns: Vec<ColumnChunkFooter>,
}

/// Location of a single column chunk within the file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnChunkFooter {
    /// Path of the column in the schema, one element per nesting level
    pub path_in_schema: Vec<String>,
    /// Offset of the dictionary page, zero when the chunk has no dictionary
    pub dictionary_page_offset: u64,
    /// Offset of the first data page of the chunk
    pub file_offset: u64,
    pub total_compressed_size: u64,
}

/// Turns the raw bytes of a [`FileTail`] into a [`FooterMetadata`]
pub trait FooterDecoder: Debug + Send + Sync + 'static {
    fn decode(&self, tail: &FileTail) -> Result<FooterMetadata, FooterDecodeError>;
}

/// A [`FooterDecoder`] backed by the thrift decoder of the [`parquet`] crate
#[derive(Debug, Default, Clone, Copy)]
pub struct ParquetFooterDecoder;

impl FooterDecoder for ParquetFooterDecoder {
    fn decode(&self, tail: &FileTail) -> Result<FooterMetadata, FooterDecodeError> {
        let bytes = tail.bytes();
        if bytes.len() < FOOTER_SIZE {
            return Err(FooterDecodeError::TailTooShort {
                length: tail.length(),
            });
        }

        let footer_start = bytes.len() - FOOTER_SIZE;
        let footer = &bytes[footer_start..];
        if footer[4..] != PARQUET_MAGIC {
            return Err(FooterDecodeError::BadMagic);
        }
        let metadata_length =
            u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]) as usize;
        let Some(metadata_start) = footer_start.checked_sub(metadata_length) else {
            return Err(FooterDecodeError::TruncatedMetadata {
                tail_length: tail.length(),
                metadata_length: metadata_length as u64,
            });
        };

        let metadata =
            ParquetMetaDataReader::decode_metadata(&bytes[metadata_start..footer_start])?;

        let row_groups = metadata
            .row_groups()
            .iter()
            .enumerate()
            .map(|(row_group, rg)| {
                let columns = rg
                    .columns()
                    .iter()
                    .map(|chunk| {
                        let column = chunk.column_path().string();
                        let non_negative = |value: i64, field: &'static str| {
                            u64::try_from(value).map_err(|_| FooterDecodeError::NegativeValue {
                                row_group,
                                column: column.clone(),
                                field,
                            })
                        };
                        Ok(ColumnChunkFooter {
                            path_in_schema: chunk.column_path().parts().to_vec(),
                            dictionary_page_offset: non_negative(
                                chunk.dictionary_page_offset().unwrap_or_default(),
                                "dictionary page offset",
                            )?,
                            file_offset: non_negative(chunk.data_page_offset(), "file offset")?,
                            total_compressed_size: non_negative(
                                chunk.compressed_size(),
                                "compressed size",
                            )?,
                        })
                    })
                    .collect::<Result<Vec<_>, FooterDecodeError>>()?;
                Ok(RowGroupFooter { columns })
            })
            .collect::<Result<Vec<_>, FooterDecodeError>>()?;

        Ok(FooterMetadata { row_groups })
    }
}
