/// Filesystem helpers for record files and their side files.
pub mod fs;
