//! Diagnostics channel for non-fatal persistence failures.
//!
//! Ingestion never returns errors to its caller. Everything worth knowing is
//! reported as a [`Diagnostic`] to the sink injected into the directory.

use std::path::PathBuf;
use std::sync::Mutex;

use tracing::{debug, info, warn};

use crate::constants::codec::SKIP_CORRUPT_ROW_MSG;
use crate::types::StorageKey;

/// Event emitted by the link store while loading, merging, or persisting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Diagnostic {
    /// Output directory resolved and ready.
    OutputDirReady {
        /// Resolved output directory.
        path: PathBuf,
    },
    /// First load of an existing record file by this process.
    LoadingExisting {
        /// Record file being loaded.
        path: PathBuf,
    },
    /// Existing records decoded from disk.
    ExistingLoaded {
        /// Storage key of the loaded file.
        key: StorageKey,
        /// Valid records decoded.
        records: usize,
        /// Distinct `siteId|href` keys among them.
        known: usize,
    },
    /// A single row (or row group) could not be decoded and was skipped.
    CorruptRow {
        /// Record file holding the row.
        path: PathBuf,
        /// Row position and decode failure.
        reason: String,
    },
    /// The whole record file could not be read; treated as empty.
    UnreadableFile {
        /// Record file that failed to open.
        path: PathBuf,
        /// Open or footer failure.
        reason: String,
    },
    /// Rewriting the record file failed; the previous file is untouched.
    PersistFailed {
        /// Record file that was not replaced.
        path: PathBuf,
        /// Write or verification failure.
        reason: String,
    },
    /// New records were written.
    Persisted {
        /// Rewritten record file.
        path: PathBuf,
        /// Records added by this ingest.
        new_records: usize,
    },
    /// Rewriting the membership cache failed.
    CacheRefreshFailed {
        /// Cache file that was not replaced.
        path: PathBuf,
        /// Write failure.
        reason: String,
    },
    /// A lock was poisoned by a panicking ingest and has been recovered.
    LockRecovered {
        /// Storage key whose lock was recovered.
        key: StorageKey,
    },
}

/// Receiver for [`Diagnostic`] events.
pub trait DiagnosticsSink: Send + Sync {
    /// Handle one event. Must not panic.
    fn report(&self, event: Diagnostic);
}

/// Default sink forwarding events to `tracing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingDiagnostics;

impl DiagnosticsSink for TracingDiagnostics {
    fn report(&self, event: Diagnostic) {
        match event {
            Diagnostic::OutputDirReady { path } => {
                info!(path = %path.display(), "[link_ledger] link output directory ready");
            }
            Diagnostic::LoadingExisting { path } => {
                info!(path = %path.display(), "[link_ledger] loading existing links");
            }
            Diagnostic::ExistingLoaded {
                key,
                records,
                known,
            } => {
                debug!(%key, records, known, "[link_ledger] existing records loaded");
            }
            Diagnostic::CorruptRow { path, reason } => {
                warn!(path = %path.display(), error = %reason, "{SKIP_CORRUPT_ROW_MSG}");
            }
            Diagnostic::UnreadableFile { path, reason } => {
                warn!(
                    path = %path.display(),
                    error = %reason,
                    "[link_ledger] failed to read existing parquet; treating as empty"
                );
            }
            Diagnostic::PersistFailed { path, reason } => {
                warn!(path = %path.display(), error = %reason, "[link_ledger] failed to persist links");
            }
            Diagnostic::Persisted { path, new_records } => {
                info!(path = %path.display(), new_records, "[link_ledger] saved new links");
            }
            Diagnostic::CacheRefreshFailed { path, reason } => {
                warn!(
                    path = %path.display(),
                    error = %reason,
                    "[link_ledger] failed to update known cache"
                );
            }
            Diagnostic::LockRecovered { key } => {
                warn!(%key, "[link_ledger] recovered poisoned store lock");
            }
        }
    }
}

/// Sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemoryDiagnostics {
    events: Mutex<Vec<Diagnostic>>,
}

impl MemoryDiagnostics {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events reported so far.
    pub fn events(&self) -> Vec<Diagnostic> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of recorded events matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&Diagnostic) -> bool) -> usize {
        self.events().iter().filter(|event| predicate(event)).count()
    }
}

impl DiagnosticsSink for MemoryDiagnostics {
    fn report(&self, event: Diagnostic) {
        match self.events.lock() {
            Ok(mut guard) => guard.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
