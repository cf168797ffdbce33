//! Plain-text rendering for the command-line front end.

use std::borrow::Cow;
use std::fmt::Write as _;

use itertools::Itertools;

use crate::{
    record::Record,
    schema::{FieldSchema, Schema},
    stats::{FieldSummary, StatusCount},
};

const COLUMN_GAP: &str = "  ";
const ELLIPSIS: char = '…';

/// A column-aligned grid. Cells wider than `max_width` are cut with an
/// ellipsis.
#[derive(Debug, Clone)]
pub struct Grid {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    max_width: Option<usize>,
}

impl Grid {
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
            max_width: None,
        }
    }

    pub fn max_width(mut self, width: usize) -> Self {
        self.max_width = Some(width.max(2));
        self
    }

    pub fn push_row<I, S>(&mut self, cells: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rows.push(cells.into_iter().map(Into::into).collect());
    }

    pub fn render(&self) -> String {
        let headers = self.cells(&self.headers);
        let rows = self
            .rows
            .iter()
            .map(|row| self.cells(row))
            .collect::<Vec<_>>();

        let mut widths = headers
            .iter()
            .map(|cell| cell.chars().count().max(1))
            .collect::<Vec<_>>();
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let mut output = String::new();
        let _ = writeln!(output, "{}", align(&headers, &widths));
        let rule = widths.iter().map(|width| "-".repeat(*width)).collect::<Vec<_>>();
        let _ = writeln!(output, "{}", align(&rule, &widths));
        for row in &rows {
            let _ = writeln!(output, "{}", align(row, &widths));
        }
        output
    }

    fn cells(&self, values: &[String]) -> Vec<String> {
        (0..self.headers.len())
            .map(|idx| {
                let value = values.get(idx).map(String::as_str).unwrap_or_default();
                let flat = flatten(value);
                match self.max_width {
                    Some(limit) => truncate(&flat, limit),
                    None => flat.into_owned(),
                }
            })
            .collect()
    }
}

fn align(cells: &[String], widths: &[usize]) -> String {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .join(COLUMN_GAP);
    line.trim_end().to_string()
}

fn flatten(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}

fn truncate(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let mut cut = value.chars().take(limit - 1).collect::<String>();
    cut.push(ELLIPSIS);
    cut
}

pub fn schema_grid(schema: &Schema) -> Grid {
    let mut grid = Grid::new(["#", "name", "type", "visible", "primary", "unique", "options"]);
    for (idx, field) in schema.fields.iter().enumerate() {
        grid.push_row([
            (idx + 1).to_string(),
            field.name.clone(),
            field.field_type.to_string(),
            yes_no(field.visible).to_string(),
            yes_no(field.primary).to_string(),
            field.unique_value_count.to_string(),
            field
                .categorical_options()
                .map(|options| options.join(" | "))
                .unwrap_or_default(),
        ]);
    }
    grid.max_width(60)
}

/// One row per record over `fields`, followed by id, status, and tags.
pub fn records_grid<'a, 'r, F, R>(fields: F, records: R) -> Grid
where
    F: IntoIterator<Item = &'a FieldSchema>,
    R: IntoIterator<Item = &'r Record>,
{
    let names = fields
        .into_iter()
        .map(|field| field.name.clone())
        .collect::<Vec<_>>();
    let headers = std::iter::once("id".to_string())
        .chain(names.iter().cloned())
        .chain(["status".to_string(), "tags".to_string()]);
    let mut grid = Grid::new(headers);
    for record in records {
        let cells = std::iter::once(record.id().to_string())
            .chain(names.iter().map(|name| record.value(name).as_display()))
            .chain([record.status.label().to_string(), record.tags.join(", ")]);
        grid.push_row(cells);
    }
    grid.max_width(40)
}

pub fn status_grid(counts: &[StatusCount]) -> Grid {
    let mut grid = Grid::new(["status", "count"]);
    for entry in counts {
        grid.push_row([entry.status.label().to_string(), entry.count.to_string()]);
    }
    grid
}

pub fn summary_grid(summaries: &[FieldSummary]) -> Grid {
    let mut grid = Grid::new(["field", "type", "non_empty", "unique"]);
    for summary in summaries {
        grid.push_row([
            summary.name.clone(),
            summary.field_type.to_string(),
            summary.non_empty.to_string(),
            summary.unique.to_string(),
        ]);
    }
    grid.max_width(40)
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}
