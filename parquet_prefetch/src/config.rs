//! Configuration of the logical IO layer and its Parquet prefetching policies
//!
//! All options have defaults (see [`LogicalIoConfig::default`]), and a configuration can be built
//! from any generic string key/value source with [`LogicalIoConfig::from_key_values`], using the
//! keys listed on each field.
use std::{collections::HashMap, fmt::Display, str::FromStr};

use regex::Regex;
use thiserror::Error;

pub const ONE_KB: u64 = 1024;
pub const ONE_MB: u64 = 1024 * ONE_KB;
pub const ONE_GB: u64 = 1024 * ONE_MB;

pub const FOOTER_PREFETCH_ENABLED_KEY: &str = "footer.prefetch.enabled";
pub const PAGE_INDEX_PREFETCH_ENABLED_KEY: &str = "page.index.prefetch.enabled";
pub const FILE_METADATA_PREFETCH_SIZE_KEY: &str = "file.metadata.prefetch.size";
pub const LARGE_FILE_METADATA_PREFETCH_SIZE_KEY: &str = "large.file.metadata.prefetch.size";
pub const FILE_PAGE_INDEX_PREFETCH_SIZE_KEY: &str = "file.page.index.prefetch.size";
pub const LARGE_FILE_PAGE_INDEX_PREFETCH_SIZE_KEY: &str = "large.file.page.index.prefetch.size";
pub const LARGE_FILE_SIZE_KEY: &str = "large.file.size";
pub const SMALL_OBJECTS_PREFETCHING_ENABLED_KEY: &str = "small.objects.prefetching.enabled";
pub const SMALL_OBJECT_SIZE_THRESHOLD_KEY: &str = "small.object.size.threshold";
pub const METADATA_AWARE_PREFETCHING_ENABLED_KEY: &str = "metadata.aware.prefetching.enabled";
pub const PREDICTIVE_PREFETCHING_ENABLED_KEY: &str = "predictive.prefetching.enabled";
pub const PREFETCHING_MODE_KEY: &str = "prefetching.mode";
pub const PARQUET_METADATA_STORE_SIZE_KEY: &str = "parquet.metadata.store.size";
pub const MAX_COLUMN_ACCESS_STORE_SIZE_KEY: &str = "max.column.access.store.size";
pub const PARQUET_FORMAT_SELECTOR_REGEX_KEY: &str = "parquet.format.selector.regex";
pub const PHYSICAL_IO_BUFFER_SIZE_KEY: &str = "physical.io.buffer.size";

const DEFAULT_PARQUET_FORMAT_SELECTOR_REGEX: &str = "^.*.(parquet|par)$";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for configuration key '{key}'")]
    InvalidValue { key: &'static str, value: String },

    #[error("invalid parquet format selector regex '{pattern}'")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

pub type Result<T, E = ConfigError> = std::result::Result<T, E>;

/// Which parts of a Parquet file are eligible for prefetching
///
/// [`PrefetchMode::Off`] acts as a kill switch for both metadata aware and predictive prefetching,
/// regardless of their individual flags. Footer prefetching is controlled on its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PrefetchMode {
    Off,
    All,
    #[default]
    RowGroup,
    ColumnBound,
}

impl PrefetchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::All => "all",
            Self::RowGroup => "row_group",
            Self::ColumnBound => "column_bound",
        }
    }
}

impl Display for PrefetchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrefetchMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(Self::Off),
            "all" => Ok(Self::All),
            "row_group" => Ok(Self::RowGroup),
            "column_bound" => Ok(Self::ColumnBound),
            _ => Err(ConfigError::InvalidValue {
                key: PREFETCHING_MODE_KEY,
                value: s.to_string(),
            }),
        }
    }
}

/// Configuration for the logical IO layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalIoConfig {
    /// Prefetch the tail of Parquet files when they are opened (`footer.prefetch.enabled`)
    pub footer_prefetch_enabled: bool,
    /// Include the page index region in tail prefetches (`page.index.prefetch.enabled`)
    pub page_index_prefetch_enabled: bool,
    /// Size of the tail, in bytes, assumed to hold the file metadata
    /// (`file.metadata.prefetch.size`)
    pub file_metadata_prefetch_size: u64,
    /// As `file_metadata_prefetch_size`, for files of at least `large_file_size`
    /// (`large.file.metadata.prefetch.size`)
    pub large_file_metadata_prefetch_size: u64,
    /// Size of the page index region preceding the metadata (`file.page.index.prefetch.size`)
    pub file_page_index_prefetch_size: u64,
    /// As `file_page_index_prefetch_size`, for files of at least `large_file_size`
    /// (`large.file.page.index.prefetch.size`)
    pub large_file_page_index_prefetch_size: u64,
    /// Content length from which a file is considered large (`large.file.size`)
    pub large_file_size: u64,
    /// Fetch small objects in their entirety (`small.objects.prefetching.enabled`)
    pub small_objects_prefetching_enabled: bool,
    /// Largest content length considered small (`small.object.size.threshold`)
    pub small_object_size_threshold: u64,
    /// Prefetch the remainder of a column chunk once its start is read
    /// (`metadata.aware.prefetching.enabled`)
    pub metadata_aware_prefetching_enabled: bool,
    /// Prefetch chunks of recently read columns (`predictive.prefetching.enabled`)
    pub predictive_prefetching_enabled: bool,
    /// `prefetching.mode`
    pub prefetching_mode: PrefetchMode,
    /// Number of files whose column maps are cached (`parquet.metadata.store.size`)
    pub parquet_metadata_store_size: usize,
    /// Number of recently read columns remembered per schema (`max.column.access.store.size`)
    pub max_column_access_count_store_size: usize,
    /// Object names matching this pattern are treated as Parquet
    /// (`parquet.format.selector.regex`)
    pub parquet_format_selector_regex: String,
    /// Bytes of fetched data held in memory per open file, 0 disables buffering
    /// (`physical.io.buffer.size`)
    pub physical_io_buffer_size: usize,
}

impl Default for LogicalIoConfig {
    fn default() -> Self {
        Self {
            footer_prefetch_enabled: true,
            page_index_prefetch_enabled: true,
            file_metadata_prefetch_size: 32 * ONE_KB,
            large_file_metadata_prefetch_size: ONE_MB,
            file_page_index_prefetch_size: ONE_MB,
            large_file_page_index_prefetch_size: 8 * ONE_MB,
            large_file_size: ONE_GB,
            small_objects_prefetching_enabled: true,
            small_object_size_threshold: 3 * ONE_MB,
            metadata_aware_prefetching_enabled: true,
            predictive_prefetching_enabled: true,
            prefetching_mode: PrefetchMode::default(),
            parquet_metadata_store_size: 45,
            max_column_access_count_store_size: 15,
            parquet_format_selector_regex: DEFAULT_PARQUET_FORMAT_SELECTOR_REGEX.to_string(),
            physical_io_buffer_size: (128 * ONE_MB) as usize,
        }
    }
}

impl LogicalIoConfig {
    /// Build a configuration from a generic key/value source
    ///
    /// Keys that are absent take their default value, and unknown keys are ignored.
    pub fn from_key_values(options: &HashMap<String, String>) -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            footer_prefetch_enabled: parse_or(
                options,
                FOOTER_PREFETCH_ENABLED_KEY,
                defaults.footer_prefetch_enabled,
            )?,
            page_index_prefetch_enabled: parse_or(
                options,
                PAGE_INDEX_PREFETCH_ENABLED_KEY,
                defaults.page_index_prefetch_enabled,
            )?,
            file_metadata_prefetch_size: parse_or(
                options,
                FILE_METADATA_PREFETCH_SIZE_KEY,
                defaults.file_metadata_prefetch_size,
            )?,
            large_file_metadata_prefetch_size: parse_or(
                options,
                LARGE_FILE_METADATA_PREFETCH_SIZE_KEY,
                defaults.large_file_metadata_prefetch_size,
            )?,
            file_page_index_prefetch_size: parse_or(
                options,
                FILE_PAGE_INDEX_PREFETCH_SIZE_KEY,
                defaults.file_page_index_prefetch_size,
            )?,
            large_file_page_index_prefetch_size: parse_or(
                options,
                LARGE_FILE_PAGE_INDEX_PREFETCH_SIZE_KEY,
                defaults.large_file_page_index_prefetch_size,
            )?,
            large_file_size: parse_or(options, LARGE_FILE_SIZE_KEY, defaults.large_file_size)?,
            small_objects_prefetching_enabled: parse_or(
                options,
                SMALL_OBJECTS_PREFETCHING_ENABLED_KEY,
                defaults.small_objects_prefetching_enabled,
            )?,
            small_object_size_threshold: parse_or(
                options,
                SMALL_OBJECT_SIZE_THRESHOLD_KEY,
                defaults.small_object_size_threshold,
            )?,
            metadata_aware_prefetching_enabled: parse_or(
                options,
                METADATA_AWARE_PREFETCHING_ENABLED_KEY,
                defaults.metadata_aware_prefetching_enabled,
            )?,
            predictive_prefetching_enabled: parse_or(
                options,
                PREDICTIVE_PREFETCHING_ENABLED_KEY,
                defaults.predictive_prefetching_enabled,
            )?,
            prefetching_mode: match options.get(PREFETCHING_MODE_KEY) {
                Some(value) => value.parse()?,
                None => defaults.prefetching_mode,
            },
            parquet_metadata_store_size: parse_or(
                options,
                PARQUET_METADATA_STORE_SIZE_KEY,
                defaults.parquet_metadata_store_size,
            )?,
            max_column_access_count_store_size: parse_or(
                options,
                MAX_COLUMN_ACCESS_STORE_SIZE_KEY,
                defaults.max_column_access_count_store_size,
            )?,
            parquet_format_selector_regex: options
                .get(PARQUET_FORMAT_SELECTOR_REGEX_KEY)
                .cloned()
                .unwrap_or(defaults.parquet_format_selector_regex),
            physical_io_buffer_size: parse_or(
                options,
                PHYSICAL_IO_BUFFER_SIZE_KEY,
                defaults.physical_io_buffer_size,
            )?,
        };
        // fail early on a bad pattern rather than when the first file is opened:
        config.format_selector()?;
        Ok(config)
    }

    /// Compile the Parquet format selector pattern
    pub fn format_selector(&self) -> Result<Regex> {
        Regex::new(&self.parquet_format_selector_regex).map_err(|source| {
            ConfigError::InvalidRegex {
                pattern: self.parquet_format_selector_regex.clone(),
                source,
            }
        })
    }

    /// Footer caching is driven by the footer prefetch flag
    pub fn footer_caching_enabled(&self) -> bool {
        self.footer_prefetch_enabled
    }

    /// Metadata aware prefetching, taking the [`PrefetchMode`] kill switch into account
    pub fn metadata_aware_prefetching(&self) -> bool {
        self.metadata_aware_prefetching_enabled && self.prefetching_mode != PrefetchMode::Off
    }

    /// Predictive prefetching, taking the [`PrefetchMode`] kill switch into account
    pub fn predictive_prefetching(&self) -> bool {
        self.predictive_prefetching_enabled && self.prefetching_mode != PrefetchMode::Off
    }
}

fn parse_or<T: FromStr>(
    options: &HashMap<String, String>,
    key: &'static str,
    default: T,
) -> Result<T> {
    match options.get(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                key,
                value: value.clone(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn options(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_source_gives_defaults() {
        let config = LogicalIoConfig::from_key_values(&HashMap::new()).unwrap();
        assert_eq!(LogicalIoConfig::default(), config);
        assert_eq!(32 * ONE_KB, config.file_metadata_prefetch_size);
        assert_eq!(8 * ONE_MB, config.large_file_page_index_prefetch_size);
        assert_eq!(PrefetchMode::RowGroup, config.prefetching_mode);
    }

    #[test]
    fn overrides_are_applied() {
        let config = LogicalIoConfig::from_key_values(&options(&[
            (FOOTER_PREFETCH_ENABLED_KEY, "false"),
            (FILE_METADATA_PREFETCH_SIZE_KEY, " 1024 "),
            (PARQUET_METADATA_STORE_SIZE_KEY, "7"),
            (PHYSICAL_IO_BUFFER_SIZE_KEY, "4096"),
            (PREFETCHING_MODE_KEY, "ALL"),
            (PARQUET_FORMAT_SELECTOR_REGEX_KEY, "^.*\\.pq$"),
            ("some.unknown.key", "whatever"),
        ]))
        .unwrap();

        assert!(!config.footer_prefetch_enabled);
        assert_eq!(1024, config.file_metadata_prefetch_size);
        assert_eq!(7, config.parquet_metadata_store_size);
        assert_eq!(4096, config.physical_io_buffer_size);
        assert_eq!(PrefetchMode::All, config.prefetching_mode);
        assert!(config.format_selector().unwrap().is_match("data/file.pq"));
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = LogicalIoConfig::from_key_values(&options(&[(LARGE_FILE_SIZE_KEY, "big")]))
            .unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { key, .. } if key == LARGE_FILE_SIZE_KEY)
        );

        let err =
            LogicalIoConfig::from_key_values(&options(&[(PREFETCHING_MODE_KEY, "sometimes")]))
                .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = LogicalIoConfig::from_key_values(&options(&[(
            PARQUET_FORMAT_SELECTOR_REGEX_KEY,
            "(unclosed",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRegex { .. }));
    }

    #[test]
    fn default_selector_matches_parquet_names() {
        let selector = LogicalIoConfig::default().format_selector().unwrap();
        assert!(selector.is_match("bucket/table/part-0001.parquet"));
        assert!(selector.is_match("part-0001.par"));
        assert!(!selector.is_match("part-0001.csv"));
    }

    #[test]
    fn prefetch_mode_off_is_a_kill_switch() {
        let config = LogicalIoConfig {
            prefetching_mode: PrefetchMode::Off,
            ..Default::default()
        };
        assert!(config.metadata_aware_prefetching_enabled);
        assert!(!config.metadata_aware_prefetching());
        assert!(!config.predictive_prefetching());
        assert!(config.footer_caching_enabled());
    }
}
