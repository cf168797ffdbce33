//! Ingestion boundary: turns uploaded bytes into a `(records, schema)` pair.
//!
//! The pipeline is read → parse → detect schema → normalize records, and it
//! either produces a complete [`Dataset`] or an [`IngestError`]; nothing is
//! partially built. Installing the result into a session is the caller's
//! job (see [`crate::session::Session::finish_ingest`]).

use std::{
    fmt, fs,
    io::Cursor,
    path::Path,
};

use calamine::{Data, Reader, open_workbook_auto_from_rs};
use encoding_rs::{Encoding, UTF_8};
use log::{info, warn};
use thiserror::Error;

use crate::{
    config::DetectionConfig,
    data::{RawRow, Value},
    io_utils,
    record::{Record, normalize_rows},
    schema::{Schema, detect_schema_with},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileFormat {
    Csv,
    Xlsx,
    Xls,
    Json,
}

impl FileFormat {
    pub fn from_extension(extension: &str) -> Result<Self, IngestError> {
        match extension.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(FileFormat::Csv),
            "xlsx" => Ok(FileFormat::Xlsx),
            "xls" => Ok(FileFormat::Xls),
            "json" => Ok(FileFormat::Json),
            other => Err(IngestError::UnsupportedFileType {
                extension: other.to_string(),
            }),
        }
    }

    /// Uses the text after the last `.` of the file name.
    pub fn from_path(path: &Path) -> Result<Self, IngestError> {
        let extension = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext)
            .unwrap_or_default();
        Self::from_extension(extension)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Xlsx => "xlsx",
            FileFormat::Xls => "xls",
            FileFormat::Json => "json",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Unsupported file type: {extension}")]
    UnsupportedFileType { extension: String },
    #[error("Failed to parse {format} input: {message}")]
    Parse { format: FileFormat, message: String },
    #[error("Failed to read input: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    fn parse(format: FileFormat, message: impl fmt::Display) -> Self {
        IngestError::Parse {
            format,
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IngestOptions<'a> {
    pub encoding: &'static Encoding,
    pub detection: &'a DetectionConfig,
}

impl<'a> IngestOptions<'a> {
    pub fn new(detection: &'a DetectionConfig) -> Self {
        Self {
            encoding: UTF_8,
            detection,
        }
    }

    pub fn with_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = encoding;
        self
    }
}

/// A freshly ingested dataset, ready to replace a session's state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub records: Vec<Record>,
    pub schema: Schema,
}

pub fn read_dataset(path: &Path, options: IngestOptions<'_>) -> Result<Dataset, IngestError> {
    let format = FileFormat::from_path(path)?;
    let bytes = fs::read(path)?;
    load_dataset(&bytes, format, options)
}

pub fn load_dataset(
    bytes: &[u8],
    format: FileFormat,
    options: IngestOptions<'_>,
) -> Result<Dataset, IngestError> {
    let rows = parse_rows(bytes, format, options.encoding)?;
    let schema = detect_schema_with(&rows, options.detection);
    let records = normalize_rows(rows);
    info!(
        "Loaded {} record(s) with {} field(s) from {format} input",
        records.len(),
        schema.len()
    );
    Ok(Dataset { records, schema })
}

pub fn parse_rows(
    bytes: &[u8],
    format: FileFormat,
    encoding: &'static Encoding,
) -> Result<Vec<RawRow>, IngestError> {
    match format {
        FileFormat::Csv => parse_csv(bytes, encoding),
        FileFormat::Xlsx | FileFormat::Xls => parse_spreadsheet(bytes, format),
        FileFormat::Json => parse_json(bytes, encoding),
    }
}

fn parse_csv(bytes: &[u8], encoding: &'static Encoding) -> Result<Vec<RawRow>, IngestError> {
    let format = FileFormat::Csv;
    let text =
        io_utils::decode_bytes(bytes, encoding).map_err(|err| IngestError::parse(format, err))?;
    let mut reader = io_utils::open_csv_reader(text.as_bytes(), io_utils::DEFAULT_CSV_DELIMITER);
    let headers = dedupe_headers(
        reader
            .headers()
            .map_err(|err| IngestError::parse(format, err))?
            .iter()
            .map(str::to_string),
    );

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record
            .map_err(|err| IngestError::parse(format, format!("row {}: {err}", idx + 2)))?;
        let row: RawRow = headers
            .iter()
            .enumerate()
            .map(|(col, header)| {
                let value = record.get(col).map(Value::from).unwrap_or(Value::Null);
                (header.clone(), value)
            })
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

fn parse_spreadsheet(bytes: &[u8], format: FileFormat) -> Result<Vec<RawRow>, IngestError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|err| IngestError::parse(format, err))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| IngestError::parse(format, "workbook has no worksheets"))?
        .map_err(|err| IngestError::parse(format, err))?;

    let mut sheet_rows = range.rows();
    let Some(header_row) = sheet_rows.next() else {
        return Ok(Vec::new());
    };
    let headers = dedupe_headers(header_row.iter().enumerate().map(|(idx, cell)| {
        let name = cell.to_string();
        if name.trim().is_empty() {
            format!("column_{}", idx + 1)
        } else {
            name
        }
    }));

    let rows = sheet_rows
        .filter(|cells| !cells.iter().all(|cell| matches!(cell, Data::Empty)))
        .map(|cells| {
            headers
                .iter()
                .enumerate()
                .map(|(col, header)| {
                    let value = cells.get(col).map(cell_value).unwrap_or(Value::Null);
                    (header.clone(), value)
                })
                .collect::<RawRow>()
        })
        .collect();
    Ok(rows)
}

/// Spreadsheet dates stay in serial-day form so the schema detector can tell
/// raw serial timestamps apart from real text dates.
fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Int(i) => Value::from(*i),
        Data::Float(f) => Value::Number(*f),
        Data::String(s) => Value::Text(s.clone()),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) => Value::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::Text(s.clone()),
        Data::Error(err) => {
            warn!("Spreadsheet cell error {err:?} read as empty");
            Value::Null
        }
        Data::Empty => Value::Null,
    }
}

/// A top-level object is one record, an array is many, and any array element
/// that is not an object becomes an empty row.
fn parse_json(bytes: &[u8], encoding: &'static Encoding) -> Result<Vec<RawRow>, IngestError> {
    let format = FileFormat::Json;
    let text =
        io_utils::decode_bytes(bytes, encoding).map_err(|err| IngestError::parse(format, err))?;
    let parsed: serde_json::Value =
        serde_json::from_str(&text).map_err(|err| IngestError::parse(format, err))?;
    let items = match parsed {
        serde_json::Value::Array(items) => items,
        other => vec![other],
    };
    Ok(items.into_iter().map(json_row).collect())
}

fn json_row(item: serde_json::Value) -> RawRow {
    match item {
        serde_json::Value::Object(map) => map
            .into_iter()
            .map(|(key, value)| (key, Value::from(value)))
            .collect(),
        _ => RawRow::new(),
    }
}

/// Repeated header names get `_1`, `_2`, ... suffixes so no column is lost.
fn dedupe_headers<I>(headers: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen: Vec<String> = Vec::new();
    for header in headers {
        let mut candidate = header.clone();
        let mut suffix = 1;
        while seen.contains(&candidate) {
            candidate = format!("{header}_{suffix}");
            suffix += 1;
        }
        seen.push(candidate);
    }
    seen
}
