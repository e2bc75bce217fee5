use std::io;

use parquet::errors::ParquetError;
use thiserror::Error;

/// Error type for configuration, codec, and persistence failures.
///
/// Ingestion never returns these to its caller; they surface through the
/// diagnostics sink instead. Only directory setup and the read-side helpers
/// (`read_records`, `aggregate`) return them directly.
#[derive(Debug, Error)]
pub enum LinkLedgerError {
    /// Filesystem failure.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// Parquet reader or writer failure.
    #[error("parquet failure: {0}")]
    Parquet(#[from] ParquetError),
    /// Encoded data did not match the link record layout.
    #[error("link record codec failure: {0}")]
    Codec(String),
    /// Output directory could not be resolved or created.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Ingest request line could not be decoded.
    #[error("malformed ingest request: {0}")]
    Request(String),
}
