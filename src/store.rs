use std::collections::HashSet;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use indexmap::IndexSet;
use parquet::basic::Compression;

use crate::codec::{footer_row_count, read_records, write_records};
use crate::constants::storage::{
    MEMBERSHIP_CACHE_LINE_SEPARATOR, MEMBERSHIP_CACHE_SUFFIX, RECORD_FILE_EXTENSION,
};
use crate::diagnostics::{Diagnostic, DiagnosticsSink};
use crate::errors::LinkLedgerError;
use crate::record::{LinkCandidate, LinkRecord, membership_key, sanitize};
use crate::transport::fs::write_atomically;
use crate::types::{MembershipKey, StorageKey};

/// Records currently persisted for one storage key.
#[derive(Clone, Debug, Default)]
pub struct LoadedLinks {
    /// Valid records, oldest first.
    pub records: Vec<LinkRecord>,
    /// `siteId|href` keys of `records`.
    pub known: HashSet<MembershipKey>,
    /// Rows dropped while decoding.
    pub skipped_rows: usize,
}

/// Outcome of one ingest call.
///
/// Failures never surface as errors; they are visible here and through the
/// diagnostics sink.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Storage key the candidates were routed to.
    pub key: StorageKey,
    /// Records loaded from disk before merging.
    pub existing_records: usize,
    /// Rows dropped while loading the existing file.
    pub skipped_rows: usize,
    /// Candidates accepted as new records.
    pub new_records: usize,
    /// True when the record file was rewritten.
    pub rewritten: bool,
    /// True when the membership cache was rewritten.
    pub cache_refreshed: bool,
}

/// Merge-and-persist engine for one storage key.
///
/// Owns `<output_dir>/<key>.parquet` and its `.known` membership cache.
/// Callers must serialize access; [`LinkDirectory`](crate::LinkDirectory)
/// does so with one mutex per key.
pub struct LinkStore {
    key: StorageKey,
    record_path: PathBuf,
    cache_path: PathBuf,
    compression: Compression,
    diagnostics: Arc<dyn DiagnosticsSink>,
    announced_existing: bool,
}

impl fmt::Debug for LinkStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkStore")
            .field("key", &self.key)
            .field("record_path", &self.record_path)
            .field("compression", &self.compression)
            .finish()
    }
}

impl LinkStore {
    /// Create the store for `key` inside `output_dir`. Touches no files.
    pub fn new(
        output_dir: &Path,
        key: StorageKey,
        compression: Compression,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        let record_path = record_path_for(output_dir, &key);
        let cache_path = cache_path_for(&record_path);
        Self {
            key,
            record_path,
            cache_path,
            compression,
            diagnostics,
            announced_existing: false,
        }
    }

    /// Storage key served by this store.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Path of the Parquet record file.
    pub fn record_path(&self) -> &Path {
        &self.record_path
    }

    /// Path of the membership cache side file.
    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// Load what is currently on disk, tolerating corruption.
    ///
    /// A missing file is empty. An unreadable file is also treated as empty
    /// and reported; the next persist replaces it.
    pub fn load(&mut self) -> LoadedLinks {
        let mut loaded = LoadedLinks::default();
        if !self.record_path.is_file() {
            return loaded;
        }
        if !self.announced_existing {
            self.announced_existing = true;
            self.report(Diagnostic::LoadingExisting {
                path: self.record_path.clone(),
            });
        }

        let decoded = match read_records(&self.record_path) {
            Ok(decoded) => decoded,
            Err(err) => {
                self.report(Diagnostic::UnreadableFile {
                    path: self.record_path.clone(),
                    reason: err.to_string(),
                });
                return loaded;
            }
        };

        loaded.skipped_rows = decoded.skipped.len();
        for reason in decoded.skipped {
            self.report(Diagnostic::CorruptRow {
                path: self.record_path.clone(),
                reason,
            });
        }
        for record in decoded.records {
            loaded.known.insert(record.membership_key());
            loaded.records.push(record);
        }
        self.report(Diagnostic::ExistingLoaded {
            key: self.key.clone(),
            records: loaded.records.len(),
            known: loaded.known.len(),
        });
        loaded
    }

    /// Merge `candidates` into the persisted set for this key.
    ///
    /// Duplicates by `(site_id, href)` and blank hrefs are dropped; the first
    /// stored version of a link always wins. When nothing new was merged the
    /// record file is left alone and only the membership cache is refreshed.
    pub fn ingest(
        &mut self,
        site_id: Option<&str>,
        page_url: Option<&str>,
        candidates: &[LinkCandidate],
    ) -> IngestReport {
        let mut report = IngestReport {
            key: self.key.clone(),
            ..IngestReport::default()
        };
        if !candidates.iter().any(|candidate| candidate.usable_href().is_some()) {
            return report;
        }

        let LoadedLinks {
            mut records,
            mut known,
            skipped_rows,
        } = self.load();
        report.existing_records = records.len();
        report.skipped_rows = skipped_rows;

        let site_id = sanitize(site_id);
        let ingested_at = Utc::now().timestamp_millis();
        for candidate in candidates {
            let Some(href) = candidate.usable_href() else {
                continue;
            };
            if !known.insert(membership_key(&site_id, href)) {
                continue;
            }
            records.push(LinkRecord {
                site_id: site_id.clone(),
                page_url: sanitize(page_url),
                href: href.to_string(),
                text: sanitize(candidate.text.as_deref()),
                published_at: sanitize(candidate.published_at.as_deref()),
                timestamp_millis: ingested_at,
            });
            report.new_records += 1;
        }

        if report.new_records > 0 {
            if let Err(err) = self.persist(&records) {
                self.report(Diagnostic::PersistFailed {
                    path: self.record_path.clone(),
                    reason: err.to_string(),
                });
                return report;
            }
            report.rewritten = true;
            self.report(Diagnostic::Persisted {
                path: self.record_path.clone(),
                new_records: report.new_records,
            });
        }

        match self.refresh_cache(&records) {
            Ok(()) => report.cache_refreshed = true,
            Err(err) => self.report(Diagnostic::CacheRefreshFailed {
                path: self.cache_path.clone(),
                reason: err.to_string(),
            }),
        }
        report
    }

    fn persist(&self, records: &[LinkRecord]) -> Result<(), LinkLedgerError> {
        let expected_rows = records.len();
        write_atomically(&self.record_path, |file| {
            write_records(&mut *file, records, self.compression)?;
            file.flush()?;
            let written_rows = footer_row_count(file.try_clone()?)?;
            if usize::try_from(written_rows).ok() != Some(expected_rows) {
                return Err(LinkLedgerError::Codec(format!(
                    "rewritten file holds {written_rows} rows, expected {expected_rows}"
                )));
            }
            Ok(())
        })
    }

    fn refresh_cache(&self, records: &[LinkRecord]) -> Result<(), LinkLedgerError> {
        let hrefs: IndexSet<&str> = records
            .iter()
            .map(|record| record.href.as_str())
            .filter(|href| !href.trim().is_empty())
            .collect();
        let body = hrefs
            .into_iter()
            .collect::<Vec<_>>()
            .join(MEMBERSHIP_CACHE_LINE_SEPARATOR);
        write_atomically(&self.cache_path, |file| {
            file.write_all(body.as_bytes())?;
            Ok(())
        })
    }

    fn report(&self, event: Diagnostic) {
        self.diagnostics.report(event);
    }
}

/// `<output_dir>/<key>.parquet`.
pub fn record_path_for(output_dir: &Path, key: &str) -> PathBuf {
    output_dir.join(format!("{key}.{RECORD_FILE_EXTENSION}"))
}

/// `<record_path>.known`.
pub fn cache_path_for(record_path: &Path) -> PathBuf {
    let mut name = record_path.as_os_str().to_os_string();
    name.push(".");
    name.push(MEMBERSHIP_CACHE_SUFFIX);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::MemoryDiagnostics;
    use std::fs;
    use tempfile::tempdir;

    fn open_store(dir: &Path, key: &str) -> (LinkStore, Arc<MemoryDiagnostics>) {
        let sink = Arc::new(MemoryDiagnostics::new());
        let store = LinkStore::new(dir, key.to_string(), Compression::SNAPPY, sink.clone());
        (store, sink)
    }

    #[test]
    fn paths_follow_key_layout() {
        let dir = tempdir().unwrap();
        let (store, _) = open_store(dir.path(), "news");
        assert_eq!(store.key(), "news");
        assert_eq!(store.record_path(), dir.path().join("news.parquet"));
        assert_eq!(store.cache_path(), dir.path().join("news.parquet.known"));
        assert!(format!("{store:?}").contains("LinkStore"));
    }

    #[test]
    fn empty_and_blank_batches_touch_nothing() {
        let dir = tempdir().unwrap();
        let (mut store, sink) = open_store(dir.path(), "news");

        let report = store.ingest(Some("news"), None, &[]);
        assert_eq!(report.new_records, 0);
        let report = store.ingest(
            Some("news"),
            None,
            &[LinkCandidate::new("  "), LinkCandidate::default()],
        );
        assert!(!report.rewritten && !report.cache_refreshed);
        assert!(!store.record_path().exists());
        assert!(!store.cache_path().exists());
        assert!(sink.events().is_empty());
    }

    #[test]
    fn ingest_merges_first_seen_and_stamps_time() {
        let dir = tempdir().unwrap();
        let (mut store, _) = open_store(dir.path(), "news");
        let before = Utc::now().timestamp_millis();

        let report = store.ingest(
            Some("news"),
            Some("https://example.com/news"),
            &[
                LinkCandidate::new("https://a").with_text("A"),
                LinkCandidate::new("https://a").with_text("dup in batch"),
                LinkCandidate::new("https://b").with_published_at("2025-02-25"),
            ],
        );
        assert_eq!(report.new_records, 2);
        assert!(report.rewritten && report.cache_refreshed);

        let loaded = store.load();
        assert_eq!(loaded.records.len(), 2);
        assert_eq!(loaded.records[0].text, "A");
        assert_eq!(loaded.records[0].page_url, "https://example.com/news");
        assert_eq!(loaded.records[1].text, "");
        assert_eq!(loaded.records[1].published_at, "2025-02-25");
        assert!(loaded.records[0].timestamp_millis >= before);
        assert!(loaded.known.contains("news|https://a"));
    }

    #[test]
    fn timestamps_are_not_updated_on_reingest() {
        let dir = tempdir().unwrap();
        let (mut store, _) = open_store(dir.path(), "news");
        store.ingest(Some("news"), None, &[LinkCandidate::new("https://a")]);
        let first = store.load().records[0].timestamp_millis;

        std::thread::sleep(std::time::Duration::from_millis(5));
        let report = store.ingest(
            Some("news"),
            None,
            &[LinkCandidate::new("https://a"), LinkCandidate::new("https://b")],
        );
        assert_eq!(report.existing_records, 1);
        assert_eq!(report.new_records, 1);

        let loaded = store.load();
        assert_eq!(loaded.records[0].timestamp_millis, first);
        assert!(loaded.records[1].timestamp_millis >= first);
    }

    #[test]
    fn blank_site_id_is_still_idempotent() {
        let dir = tempdir().unwrap();
        let (mut store, _) = open_store(dir.path(), "default");
        store.ingest(None, None, &[LinkCandidate::new("https://a")]);
        let report = store.ingest(Some(""), None, &[LinkCandidate::new("https://a")]);
        assert_eq!(report.new_records, 0);
        assert_eq!(store.load().records.len(), 1);
    }

    #[test]
    fn duplicate_only_batch_refreshes_cache_without_rewrite() {
        let dir = tempdir().unwrap();
        let (mut store, _) = open_store(dir.path(), "news");
        store.ingest(Some("news"), None, &[LinkCandidate::new("https://a")]);
        fs::remove_file(store.cache_path()).unwrap();
        let modified = fs::metadata(store.record_path()).unwrap().modified().unwrap();

        let report = store.ingest(Some("news"), None, &[LinkCandidate::new("https://a")]);
        assert!(!report.rewritten);
        assert!(report.cache_refreshed);
        assert_eq!(fs::read_to_string(store.cache_path()).unwrap(), "https://a");
        assert_eq!(
            fs::metadata(store.record_path()).unwrap().modified().unwrap(),
            modified
        );
    }

    #[test]
    fn unreadable_file_is_replaced_by_new_batch() {
        let dir = tempdir().unwrap();
        let (mut store, sink) = open_store(dir.path(), "news");
        fs::write(store.record_path(), b"not parquet at all").unwrap();

        let report = store.ingest(Some("news"), None, &[LinkCandidate::new("https://c")]);
        assert_eq!(report.existing_records, 0);
        assert!(report.rewritten);
        assert_eq!(
            sink.count(|event| matches!(event, Diagnostic::UnreadableFile { .. })),
            1
        );
        let loaded = store.load();
        assert_eq!(loaded.records.len(), 1);
        assert_eq!(loaded.records[0].href, "https://c");
    }

    #[test]
    fn existing_file_is_announced_once() {
        let dir = tempdir().unwrap();
        let (mut store, sink) = open_store(dir.path(), "news");
        store.ingest(Some("news"), None, &[LinkCandidate::new("https://a")]);
        store.ingest(Some("news"), None, &[LinkCandidate::new("https://b")]);
        store.ingest(Some("news"), None, &[LinkCandidate::new("https://c")]);
        assert_eq!(
            sink.count(|event| matches!(event, Diagnostic::LoadingExisting { .. })),
            1
        );
    }

    #[test]
    fn failed_persist_keeps_previous_file_and_skips_cache() {
        let dir = tempdir().unwrap();
        let (mut store, sink) = open_store(dir.path(), "news");
        store.ingest(Some("news"), None, &[LinkCandidate::new("https://a")]);
        let records_before = fs::read(store.record_path()).unwrap();
        let cache_before = fs::read(store.cache_path()).unwrap();

        // Same key and directory, but a codec the writer cannot produce.
        let mut failing = LinkStore::new(
            dir.path(),
            "news".to_string(),
            Compression::LZO,
            sink.clone(),
        );
        assert_eq!(failing.record_path(), store.record_path());
        let report = failing.ingest(Some("news"), None, &[LinkCandidate::new("https://b")]);
        assert_eq!(report.existing_records, 1);
        assert_eq!(report.new_records, 1);
        assert!(!report.rewritten);
        assert!(!report.cache_refreshed);
        assert_eq!(
            sink.count(|event| matches!(event, Diagnostic::PersistFailed { .. })),
            1
        );

        assert_eq!(fs::read(store.record_path()).unwrap(), records_before);
        assert_eq!(fs::read(store.cache_path()).unwrap(), cache_before);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
        let hrefs = store
            .load()
            .records
            .into_iter()
            .map(|record| record.href)
            .collect::<Vec<_>>();
        assert_eq!(hrefs, vec!["https://a"]);
    }

    #[test]
    fn cache_lists_each_href_once() {
        let dir = tempdir().unwrap();
        let (mut store, _) = open_store(dir.path(), "shared");
        store.ingest(Some("a b"), None, &[LinkCandidate::new("https://x")]);
        store.ingest(Some("a_b"), None, &[LinkCandidate::new("https://x")]);
        assert_eq!(store.load().records.len(), 2);
        assert_eq!(fs::read_to_string(store.cache_path()).unwrap(), "https://x");
    }
}
