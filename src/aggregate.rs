//! Offline merge of every per-key record file into one deduplicated file per site.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use parquet::basic::Compression;
use tracing::{info, warn};

use crate::codec::{read_records, write_records};
use crate::constants::codec::{FIELD_HREF, FIELD_SITE_ID, SKIP_CORRUPT_ROW_MSG};
use crate::constants::storage::DEFAULT_SITE_TOKEN;
use crate::errors::LinkLedgerError;
use crate::key::sanitize_file_token;
use crate::record::LinkRecord;
use crate::store::record_path_for;
use crate::transport::fs::{RecordFileScan, write_atomically};
use crate::types::MembershipKey;

/// One written aggregate file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AggregateOutput {
    /// Sanitized site token used as the file stem.
    pub site: String,
    /// Path of the written file.
    pub path: PathBuf,
    /// Rows written.
    pub records: usize,
}

/// Result of an [`aggregate`] run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AggregateSummary {
    /// Record files decoded.
    pub files_read: usize,
    /// Record files that could not be opened or lack `siteId`/`href`.
    pub files_skipped: usize,
    /// Files written, sorted by site token.
    pub outputs: Vec<AggregateOutput>,
}

/// Merge the record files directly under `base` into `<output>/<site>.parquet`.
///
/// Rows are deduplicated by `(siteId, href)`; when the same pair appears in
/// several files the row from the file scanned last wins. Nothing is written
/// when `base` holds no record files.
pub fn aggregate(
    base: &Path,
    output: &Path,
    compression: Compression,
) -> Result<AggregateSummary, LinkLedgerError> {
    let files = RecordFileScan::new(base).files();
    let mut summary = AggregateSummary::default();
    if files.is_empty() {
        info!(base = %base.display(), "[link_ledger] no record files to aggregate");
        return Ok(summary);
    }

    let mut combined: IndexMap<MembershipKey, LinkRecord> = IndexMap::new();
    for path in &files {
        let decoded = match read_records(path) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "[link_ledger] skipping unreadable record file");
                summary.files_skipped += 1;
                continue;
            }
        };
        if !decoded.has_column(FIELD_SITE_ID) || !decoded.has_column(FIELD_HREF) {
            warn!(path = %path.display(), "[link_ledger] skipping record file: required columns missing");
            summary.files_skipped += 1;
            continue;
        }
        summary.files_read += 1;
        for reason in &decoded.skipped {
            warn!(path = %path.display(), error = %reason, "{SKIP_CORRUPT_ROW_MSG}");
        }
        for record in decoded.records {
            let key = record.membership_key();
            combined.shift_remove(&key);
            combined.insert(key, record);
        }
    }

    let mut groups: BTreeMap<String, Vec<LinkRecord>> = BTreeMap::new();
    for record in combined.into_values() {
        groups
            .entry(site_token(&record.site_id))
            .or_default()
            .push(record);
    }
    if groups.is_empty() {
        info!(base = %base.display(), "[link_ledger] no readable records to aggregate");
        return Ok(summary);
    }

    fs::create_dir_all(output)?;
    for (site, records) in groups {
        let path = record_path_for(output, &site);
        write_atomically(&path, |file| write_records(&mut *file, &records, compression))?;
        info!(path = %path.display(), rows = records.len(), "[link_ledger] wrote aggregate");
        summary.outputs.push(AggregateOutput {
            site,
            path,
            records: records.len(),
        });
    }
    Ok(summary)
}

fn site_token(site_id: &str) -> String {
    if site_id.trim().is_empty() {
        DEFAULT_SITE_TOKEN.to_string()
    } else {
        sanitize_file_token(site_id)
    }
}
