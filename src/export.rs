//! Flat delimited export of the filtered, visible-field view.
//!
//! The header comes from the visible schema fields in schema order, followed
//! by `Status` when at least one exported record carries a status and `Tags`
//! when at least one carries a tag. With no records the header is the visible
//! fields alone; with no visible fields and no records the export is empty.

use std::{io::Write, path::Path};

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use itertools::Itertools;
use log::info;

use crate::{io_utils, record::Record, schema::Schema};

pub const STATUS_HEADER: &str = "Status";
pub const TAGS_HEADER: &str = "Tags";
const TAG_SEPARATOR: &str = ", ";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ExportTable {
    pub fn build<'a, I>(records: I, schema: &Schema) -> Self
    where
        I: IntoIterator<Item = &'a Record>,
    {
        let records = records.into_iter().collect::<Vec<_>>();
        let columns = schema
            .visible_fields()
            .map(|field| field.name.clone())
            .collect::<Vec<_>>();
        // Every record holds exactly one status, so the column follows presence.
        let with_status = !records.is_empty();
        let with_tags = records.iter().any(|record| !record.tags.is_empty());

        let mut headers = columns.clone();
        if with_status {
            headers.push(STATUS_HEADER.to_string());
        }
        if with_tags {
            headers.push(TAGS_HEADER.to_string());
        }

        let rows = records
            .iter()
            .map(|record| {
                let mut row = columns
                    .iter()
                    .map(|column| record.value(column).as_display())
                    .collect::<Vec<_>>();
                if with_status {
                    row.push(record.status.to_string());
                }
                if with_tags {
                    row.push(record.tags.iter().join(TAG_SEPARATOR));
                }
                row
            })
            .collect();

        Self { headers, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.rows.is_empty()
    }

    pub fn write_csv<W: Write>(&self, writer: W, delimiter: u8) -> Result<()> {
        let mut writer = io_utils::csv_writer(writer, delimiter);
        if self.is_empty() {
            return Ok(());
        }
        writer
            .write_record(&self.headers)
            .context("Writing export header")?;
        for (idx, row) in self.rows.iter().enumerate() {
            writer
                .write_record(row)
                .with_context(|| format!("Writing export row {}", idx + 1))?;
        }
        writer.flush().context("Flushing export output")?;
        Ok(())
    }

    pub fn to_csv_string(&self, delimiter: u8) -> Result<String> {
        let mut buffer = Vec::new();
        self.write_csv(&mut buffer, delimiter)?;
        String::from_utf8(buffer).context("Export produced invalid UTF-8")
    }

    /// Writes to `path`, or stdout for `-`.
    pub fn save(&self, path: &Path, delimiter: u8) -> Result<()> {
        let output = io_utils::open_output(Some(path))?;
        self.write_csv(output, delimiter)
            .with_context(|| format!("Exporting to {path:?}"))?;
        info!(
            "Exported {} record(s) across {} column(s) to {:?}",
            self.rows.len(),
            self.headers.len(),
            path
        );
        Ok(())
    }
}

pub fn export_filename(date: NaiveDate) -> String {
    format!("candidates-{}.csv", date.format("%Y-%m-%d"))
}

pub fn default_export_filename() -> String {
    export_filename(Utc::now().date_naive())
}
