#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Offline per-site aggregation of record files.
pub mod aggregate;
/// Command-line runners shared by the binaries.
pub mod apps;
/// Parquet encoding and tolerant decoding of link records.
pub mod codec;
/// Output directory and writer settings.
pub mod config;
/// Centralized constants used across keys, codec, and stores.
pub mod constants;
/// Non-fatal event reporting.
pub mod diagnostics;
/// Store registry and the ingest entry point.
pub mod directory;
/// Storage key derivation.
pub mod key;
/// Link records, candidates, and decoded requests.
pub mod record;
/// Per-key merge-and-persist engine.
pub mod store;
/// Filesystem helpers (record file scans, atomic rewrites).
pub mod transport;
/// Shared type aliases.
pub mod types;

mod errors;

pub use aggregate::{AggregateOutput, AggregateSummary, aggregate};
pub use config::LinkStoreConfig;
pub use diagnostics::{Diagnostic, DiagnosticsSink, MemoryDiagnostics, TracingDiagnostics};
pub use directory::LinkDirectory;
pub use errors::LinkLedgerError;
pub use key::derive_key;
pub use record::{IngestRequest, LinkCandidate, LinkRecord};
pub use store::{IngestReport, LinkStore, LoadedLinks};
pub use types::{Href, LogMessage, MembershipKey, PageUrl, SiteId, StorageKey};
