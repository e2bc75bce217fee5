//! Parquet encoding of [`LinkRecord`] rows.
//!
//! Every record file shares one fixed schema. Decoding is row-tolerant:
//! rows that cannot be decoded are reported in [`DecodedRecords::skipped`]
//! and the rest of the file still loads.

use std::fs::File;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use parquet::basic::Compression;
use parquet::data_type::{ByteArray, ByteArrayType, Int64Type};
use parquet::file::properties::WriterProperties;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::file::writer::{SerializedColumnWriter, SerializedFileWriter};
use parquet::record::reader::RowIter;
use parquet::record::{Field, Row};
use parquet::schema::parser::parse_message_type;
use parquet::schema::types::Type;

use crate::constants::codec::{
    COLUMN_COUNT, FIELD_HREF, FIELD_PAGE_URL, FIELD_PUBLISHED_AT, FIELD_SITE_ID, FIELD_TEXT,
    FIELD_TIMESTAMP_MILLIS,
};
use crate::errors::LinkLedgerError;
use crate::record::LinkRecord;
use crate::types::LogMessage;

/// Parquet message type shared by all record files.
pub const LINK_RECORD_SCHEMA: &str = "message LinkRecord {
    REQUIRED BINARY siteId (UTF8);
    OPTIONAL BINARY pageUrl (UTF8);
    REQUIRED BINARY href (UTF8);
    OPTIONAL BINARY text (UTF8);
    OPTIONAL BINARY publishedAt (UTF8);
    REQUIRED INT64 timestampMillis;
}";

/// Records decoded from one file plus the rows that had to be dropped.
#[derive(Clone, Debug, Default)]
pub struct DecodedRecords {
    /// Valid records in file order.
    pub records: Vec<LinkRecord>,
    /// One message per skipped row or row group.
    pub skipped: Vec<LogMessage>,
    /// Top-level column names declared by the file schema.
    pub columns: Vec<String>,
}

impl DecodedRecords {
    /// True when the file schema declares a column called `name`.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|column| column == name)
    }
}

/// Parsed [`LINK_RECORD_SCHEMA`].
pub fn link_record_schema() -> Result<Arc<Type>, LinkLedgerError> {
    Ok(Arc::new(parse_message_type(LINK_RECORD_SCHEMA)?))
}

/// Encode `records` into `sink` as a single row group.
///
/// A panic inside the Parquet writer (it unwraps codec creation, so an
/// unsupported `compression` panics) is returned as a codec error.
pub fn write_records<W: Write + Send>(
    sink: W,
    records: &[LinkRecord],
    compression: Compression,
) -> Result<(), LinkLedgerError> {
    panic::catch_unwind(AssertUnwindSafe(|| encode_records(sink, records, compression)))
        .unwrap_or_else(|_| {
            Err(LinkLedgerError::Codec(format!(
                "parquet writer panicked with compression {compression:?}"
            )))
        })
}

fn encode_records<W: Write + Send>(
    sink: W,
    records: &[LinkRecord],
    compression: Compression,
) -> Result<(), LinkLedgerError> {
    let props = Arc::new(
        WriterProperties::builder()
            .set_compression(compression)
            .build(),
    );
    let mut writer = SerializedFileWriter::new(sink, link_record_schema()?, props)?;
    let mut row_group = writer.next_row_group()?;

    let mut column_idx = 0usize;
    while let Some(mut column) = row_group.next_column()? {
        match column_idx {
            0 => write_strings(&mut column, records.iter().map(|r| r.site_id.as_str()), false)?,
            1 => write_strings(&mut column, records.iter().map(|r| r.page_url.as_str()), true)?,
            2 => write_strings(&mut column, records.iter().map(|r| r.href.as_str()), false)?,
            3 => write_strings(&mut column, records.iter().map(|r| r.text.as_str()), true)?,
            4 => write_strings(
                &mut column,
                records.iter().map(|r| r.published_at.as_str()),
                true,
            )?,
            5 => {
                let values: Vec<i64> = records.iter().map(|r| r.timestamp_millis).collect();
                column
                    .typed::<Int64Type>()
                    .write_batch(&values, None, None)?;
            }
            other => {
                return Err(LinkLedgerError::Codec(format!(
                    "unexpected column {other} in link record schema"
                )));
            }
        }
        column.close()?;
        column_idx += 1;
    }
    if column_idx != COLUMN_COUNT {
        return Err(LinkLedgerError::Codec(format!(
            "link record schema produced {column_idx} columns, expected {COLUMN_COUNT}"
        )));
    }

    row_group.close()?;
    writer.close()?;
    Ok(())
}

fn write_strings<'a>(
    column: &mut SerializedColumnWriter<'_>,
    values: impl Iterator<Item = &'a str>,
    optional: bool,
) -> Result<(), LinkLedgerError> {
    let values: Vec<ByteArray> = values.map(ByteArray::from).collect();
    let def_levels = optional.then(|| vec![1i16; values.len()]);
    column
        .typed::<ByteArrayType>()
        .write_batch(&values, def_levels.as_deref(), None)?;
    Ok(())
}

/// Decode every readable record in the file at `path`.
///
/// Fails only when the file cannot be opened or its footer is unreadable.
pub fn read_records(path: &Path) -> Result<DecodedRecords, LinkLedgerError> {
    let reader = SerializedFileReader::new(File::open(path)?)?;
    let loaded_at = Utc::now().timestamp_millis();
    let mut decoded = DecodedRecords {
        columns: reader
            .metadata()
            .file_metadata()
            .schema()
            .get_fields()
            .iter()
            .map(|field| field.name().to_string())
            .collect(),
        ..DecodedRecords::default()
    };

    let mut row_idx = 0usize;
    for group_idx in 0..reader.num_row_groups() {
        let group_rows = usize::try_from(reader.metadata().row_group(group_idx).num_rows())
            .unwrap_or_default();
        let row_group = match reader.get_row_group(group_idx) {
            Ok(row_group) => row_group,
            Err(err) => {
                decoded
                    .skipped
                    .push(format!("row group {group_idx} ({group_rows} rows): {err}"));
                row_idx += group_rows;
                continue;
            }
        };
        let rows = match RowIter::from_row_group(None, row_group.as_ref()) {
            Ok(rows) => rows,
            Err(err) => {
                decoded
                    .skipped
                    .push(format!("row group {group_idx} ({group_rows} rows): {err}"));
                row_idx += group_rows;
                continue;
            }
        };
        for row in rows {
            match row.map_err(|err| err.to_string()).and_then(|row| decode_row(&row, loaded_at)) {
                Ok(record) => decoded.records.push(record),
                Err(reason) => decoded.skipped.push(format!("row {row_idx}: {reason}")),
            }
            row_idx += 1;
        }
    }
    Ok(decoded)
}

/// Row count recorded in the footer of `file`.
pub(crate) fn footer_row_count(file: File) -> Result<i64, LinkLedgerError> {
    let reader = SerializedFileReader::new(file)?;
    Ok(reader.metadata().file_metadata().num_rows())
}

fn decode_row(row: &Row, loaded_at: i64) -> Result<LinkRecord, String> {
    let mut record = LinkRecord {
        site_id: String::new(),
        page_url: String::new(),
        href: String::new(),
        text: String::new(),
        published_at: String::new(),
        timestamp_millis: loaded_at,
    };
    for (name, field) in row.get_column_iter() {
        match name.as_str() {
            FIELD_SITE_ID => record.site_id = field_text(field),
            FIELD_PAGE_URL => record.page_url = field_text(field),
            FIELD_HREF => record.href = field_text(field),
            FIELD_TEXT => record.text = field_text(field),
            FIELD_PUBLISHED_AT => record.published_at = field_text(field),
            FIELD_TIMESTAMP_MILLIS => {
                if let Some(millis) = field_millis(field) {
                    record.timestamp_millis = millis;
                }
            }
            _ => {}
        }
    }
    if record.href.trim().is_empty() {
        return Err("blank href".to_string());
    }
    Ok(record)
}

fn field_text(field: &Field) -> String {
    match field {
        Field::Str(value) => value.clone(),
        Field::Bytes(bytes) => bytes.as_utf8().map(str::to_string).unwrap_or_default(),
        _ => String::new(),
    }
}

fn field_millis(field: &Field) -> Option<i64> {
    match field {
        Field::Long(value) => Some(*value),
        Field::Int(value) => Some(i64::from(*value)),
        Field::TimestampMillis(value) => Some(*value),
        _ => None,
    }
}
