use std::env;
use std::path::{Path, PathBuf};

use parquet::basic::Compression;

use crate::constants::storage::{DEFAULT_OUTPUT_DIR, OUTPUT_DIR_ENV};
use crate::errors::LinkLedgerError;

/// Settings for a [`LinkDirectory`](crate::LinkDirectory).
#[derive(Clone, Debug)]
pub struct LinkStoreConfig {
    /// Directory holding one record file and one membership cache per storage key.
    pub output_dir: PathBuf,
    /// Compression codec applied to every column of rewritten record files.
    pub compression: Compression,
}

impl Default for LinkStoreConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            compression: Compression::SNAPPY,
        }
    }
}

impl LinkStoreConfig {
    /// Config rooted at `output_dir` with default writer settings.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    /// Resolve the output directory from `AUTO_BROWSING_LINKS_OUTPUT`.
    ///
    /// A non-blank override is trimmed and made absolute; otherwise the
    /// relative `links-output` directory is used.
    pub fn from_env() -> Result<Self, LinkLedgerError> {
        let override_value = env::var(OUTPUT_DIR_ENV).ok();
        Ok(Self::new(resolve_output_dir(override_value.as_deref())?))
    }

    /// Override the column compression codec.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }
}

/// Pick the output directory from an optional override value.
pub fn resolve_output_dir(override_value: Option<&str>) -> Result<PathBuf, LinkLedgerError> {
    match override_value.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => std::path::absolute(Path::new(value)).map_err(|err| {
            LinkLedgerError::Configuration(format!(
                "could not resolve {OUTPUT_DIR_ENV}='{value}': {err}"
            ))
        }),
        None => Ok(PathBuf::from(DEFAULT_OUTPUT_DIR)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_override_falls_back_to_default_dir() {
        assert_eq!(
            resolve_output_dir(None).unwrap(),
            PathBuf::from(DEFAULT_OUTPUT_DIR)
        );
        assert_eq!(
            resolve_output_dir(Some("   ")).unwrap(),
            PathBuf::from(DEFAULT_OUTPUT_DIR)
        );
    }

    #[test]
    fn override_is_trimmed_and_absolute() {
        let resolved = resolve_output_dir(Some("  custom-links  ")).unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("custom-links"));
    }

    #[test]
    fn builder_overrides_compression() {
        let config = LinkStoreConfig::new("out").with_compression(Compression::UNCOMPRESSED);
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.compression, Compression::UNCOMPRESSED);
        assert_eq!(LinkStoreConfig::default().compression, Compression::SNAPPY);
    }
}
