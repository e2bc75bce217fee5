use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::Builder;
use walkdir::WalkDir;

use crate::constants::storage::{RECORD_FILE_EXTENSION, TEMP_FILE_SUFFIX};
use crate::errors::LinkLedgerError;

/// Filesystem transport that lists record files directly under a root.
pub struct RecordFileScan {
    root: PathBuf,
}

impl RecordFileScan {
    /// Create a scan rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Record files directly under the root, sorted by file name.
    ///
    /// Subdirectories are not descended into, so aggregated output living
    /// below the root is never picked up again. A missing root yields nothing.
    pub fn files(&self) -> Vec<PathBuf> {
        WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| is_record_file(path))
            .collect()
    }
}

/// True if the path has a `.parquet` extension (case-insensitive).
pub fn is_record_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(RECORD_FILE_EXTENSION))
        .unwrap_or(false)
}

/// Replace `target` with content produced by `write`, never exposing a partial file.
///
/// The content goes to a hidden temporary file next to `target`, is flushed
/// and synced, then renamed over `target`. On any failure the temporary file
/// is removed and `target` keeps its previous content.
pub fn write_atomically<F>(target: &Path, write: F) -> Result<(), LinkLedgerError>
where
    F: FnOnce(&mut File) -> Result<(), LinkLedgerError>,
{
    let dir = target
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let prefix = format!(
        ".{}.",
        target
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("link_ledger")
    );
    let mut temp = Builder::new()
        .prefix(&prefix)
        .suffix(TEMP_FILE_SUFFIX)
        .tempfile_in(dir)?;
    write(temp.as_file_mut())?;
    temp.as_file_mut().flush()?;
    temp.as_file().sync_all()?;
    temp.persist(target).map_err(|err| LinkLedgerError::Io(err.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn scan_lists_only_top_level_record_files_in_name_order() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        for name in ["b.parquet", "a.PARQUET", "notes.txt", "a.parquet.known"] {
            fs::write(root.join(name), b"x").unwrap();
        }
        fs::create_dir(root.join("aggregated")).unwrap();
        fs::write(root.join("aggregated").join("c.parquet"), b"x").unwrap();

        let names: Vec<String> = RecordFileScan::new(root)
            .files()
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.PARQUET", "b.parquet"]);
    }

    #[test]
    fn scan_of_missing_root_is_empty() {
        let temp = tempdir().unwrap();
        assert!(RecordFileScan::new(temp.path().join("missing")).files().is_empty());
    }

    #[test]
    fn atomic_write_replaces_target_and_leaves_no_temp_files() {
        let temp = tempdir().unwrap();
        let target = temp.path().join("links.parquet.known");
        fs::write(&target, "old").unwrap();

        write_atomically(&target, |file| {
            file.write_all(b"new")?;
            Ok(())
        })
        .unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "new");
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 1);
    }

    #[test]
    fn failed_atomic_write_keeps_previous_content() {
        let temp = tempdir().unwrap();
        let target = temp.path().join("links.parquet");
        fs::write(&target, "old").unwrap();

        let err = write_atomically(&target, |file| {
            file.write_all(b"partial")?;
            Err(LinkLedgerError::Codec("boom".to_string()))
        })
        .unwrap_err();

        assert!(matches!(err, LinkLedgerError::Codec(msg) if msg == "boom"));
        assert_eq!(fs::read_to_string(&target).unwrap(), "old");
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 1);
    }
}
