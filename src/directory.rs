//! Process-wide entry point owning the output directory and one store per key.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::LinkStoreConfig;
use crate::diagnostics::{Diagnostic, DiagnosticsSink, TracingDiagnostics};
use crate::errors::LinkLedgerError;
use crate::key::derive_key;
use crate::record::{IngestRequest, LinkCandidate};
use crate::store::{IngestReport, LinkStore, record_path_for};
use crate::types::StorageKey;

type SharedStore = Arc<Mutex<LinkStore>>;

/// Routes ingest calls to the [`LinkStore`] of their storage key.
///
/// Calls for the same key run one at a time; calls for different keys run
/// in parallel. Share it across threads behind an `Arc`.
pub struct LinkDirectory {
    config: LinkStoreConfig,
    diagnostics: Arc<dyn DiagnosticsSink>,
    stores: Mutex<HashMap<StorageKey, SharedStore>>,
}

impl fmt::Debug for LinkDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkDirectory")
            .field("config", &self.config)
            .finish()
    }
}

impl LinkDirectory {
    /// Open `config.output_dir`, creating it if needed, reporting through `tracing`.
    pub fn open(config: LinkStoreConfig) -> Result<Self, LinkLedgerError> {
        Self::open_with_diagnostics(config, Arc::new(TracingDiagnostics))
    }

    /// Open with the output directory taken from the environment.
    pub fn open_default() -> Result<Self, LinkLedgerError> {
        Self::open(LinkStoreConfig::from_env()?)
    }

    /// Open `config.output_dir` and report events to `diagnostics`.
    ///
    /// Failing to create the directory is the only fatal error of this layer.
    pub fn open_with_diagnostics(
        config: LinkStoreConfig,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Result<Self, LinkLedgerError> {
        fs::create_dir_all(&config.output_dir).map_err(|err| {
            LinkLedgerError::Configuration(format!(
                "could not create output directory {}: {err}",
                config.output_dir.display()
            ))
        })?;
        diagnostics.report(Diagnostic::OutputDirReady {
            path: config.output_dir.clone(),
        });
        Ok(Self {
            config,
            diagnostics,
            stores: Mutex::new(HashMap::new()),
        })
    }

    /// Directory holding the record files.
    pub fn output_dir(&self) -> &Path {
        &self.config.output_dir
    }

    /// Record file that `site_id`/`page_url` map onto.
    pub fn record_path(&self, site_id: Option<&str>, page_url: Option<&str>) -> PathBuf {
        record_path_for(self.output_dir(), &derive_key(site_id, page_url))
    }

    /// Merge `links` observed on `page_url` of `site_id` into persistent storage.
    ///
    /// Never fails; problems are reported to the diagnostics sink and
    /// reflected in the returned report.
    pub fn ingest_links(
        &self,
        site_id: Option<&str>,
        page_url: Option<&str>,
        links: &[LinkCandidate],
    ) -> IngestReport {
        let key = derive_key(site_id, page_url);
        let store = self.store_for(&key);
        let mut guard = self.lock_recovering(&store, &key);
        guard.ingest(site_id, page_url, links)
    }

    /// Ingest a decoded host request.
    pub fn ingest_request(&self, request: &IngestRequest) -> IngestReport {
        self.ingest_links(
            request.site_id.as_deref(),
            request.page_url.as_deref(),
            &request.links,
        )
    }

    fn store_for(&self, key: &str) -> SharedStore {
        let mut stores = match self.stores.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        stores
            .entry(key.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(LinkStore::new(
                    &self.config.output_dir,
                    key.to_string(),
                    self.config.compression,
                    Arc::clone(&self.diagnostics),
                )))
            })
            .clone()
    }

    fn lock_recovering<'a>(&self, store: &'a SharedStore, key: &str) -> MutexGuard<'a, LinkStore> {
        match store.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                self.diagnostics.report(Diagnostic::LockRecovered {
                    key: key.to_string(),
                });
                store.clear_poison();
                poisoned.into_inner()
            }
        }
    }
}
