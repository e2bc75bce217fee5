/// Constants used by storage key derivation and on-disk layout.
pub mod storage {
    /// Environment variable overriding the link output directory.
    pub const OUTPUT_DIR_ENV: &str = "AUTO_BROWSING_LINKS_OUTPUT";
    /// Relative output directory used when no override is set.
    pub const DEFAULT_OUTPUT_DIR: &str = "links-output";
    /// Token substituted for a missing or unusable site id.
    pub const DEFAULT_SITE_TOKEN: &str = "default";
    /// Separator between the site token and the first path segment.
    pub const KEY_SEPARATOR: char = '_';
    /// Replacement for characters outside `[A-Za-z0-9._-]`.
    pub const UNSAFE_CHAR_REPLACEMENT: char = '_';
    /// Extension of the columnar record files.
    pub const RECORD_FILE_EXTENSION: &str = "parquet";
    /// Suffix appended to a record file name for its membership cache.
    pub const MEMBERSHIP_CACHE_SUFFIX: &str = "known";
    /// Separator between site id and href in membership keys.
    pub const MEMBERSHIP_KEY_DELIMITER: &str = "|";
    /// Line separator used inside the membership cache.
    pub const MEMBERSHIP_CACHE_LINE_SEPARATOR: &str = "\n";
    /// Base used to resolve relative page urls before taking their path.
    pub const RELATIVE_URL_BASE: &str = "http://relative.invalid/";
    /// Characters that make a page url unparseable as a URI.
    pub const URI_FORBIDDEN_CHARS: &[char] = &['|', '{', '}', '^', '`', '"', '<', '>', '\\'];
    /// Suffix of in-flight temporary files written before the atomic rename.
    pub const TEMP_FILE_SUFFIX: &str = ".tmp";
}

/// Constants used by the Parquet record codec.
pub mod codec {
    /// Column holding the sanitized site id.
    pub const FIELD_SITE_ID: &str = "siteId";
    /// Column holding the page url the link was seen on.
    pub const FIELD_PAGE_URL: &str = "pageUrl";
    /// Column holding the link target.
    pub const FIELD_HREF: &str = "href";
    /// Column holding the link display text.
    pub const FIELD_TEXT: &str = "text";
    /// Column holding the caller-supplied publication timestamp string.
    pub const FIELD_PUBLISHED_AT: &str = "publishedAt";
    /// Column holding the ingestion time in epoch milliseconds.
    pub const FIELD_TIMESTAMP_MILLIS: &str = "timestampMillis";
    /// Number of leaf columns in the schema.
    pub const COLUMN_COUNT: usize = 6;
    /// Log message used when undecodable rows are skipped.
    pub const SKIP_CORRUPT_ROW_MSG: &str = "[link_ledger] skipping corrupted parquet row";
}

/// Constants used by the offline aggregator.
pub mod aggregate {
    /// Subdirectory of the base directory used when no output is given.
    pub const DEFAULT_AGGREGATED_DIR: &str = "aggregated";
}
