//! Filter predicates, the filter set, and evaluation over records.
//!
//! A [`Filter`] pairs a column (a schema field or the reserved status
//! pseudo-column) with a [`Predicate`] whose variant carries exactly the data
//! its semantics need. Filters are combined with logical AND; a filter with an
//! empty value is inactive and passes every record.

use std::fmt;

use anyhow::{Context, Result, anyhow, bail};
use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    data::{Value, parse_calendar_date},
    infer::FieldType,
    record::{Record, Status},
    schema::{FieldSchema, Schema},
};

/// Name the status pseudo-column goes by in filter expressions.
pub const STATUS_COLUMN: &str = "_status";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterColumn {
    Field(String),
    Status,
}

impl FilterColumn {
    pub fn field(name: impl Into<String>) -> Self {
        FilterColumn::Field(name.into())
    }
}

impl fmt::Display for FilterColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterColumn::Field(name) => f.write_str(name),
            FilterColumn::Status => f.write_str(STATUS_COLUMN),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Predicate {
    /// Case-insensitive substring match (text, email, url).
    Contains(String),
    NumberEquals(f64),
    /// Inclusive numeric range.
    NumberRange { low: f64, high: f64 },
    /// Inclusive calendar range.
    DateRange { start: NaiveDate, end: NaiveDate },
    /// A date filter without a range. Passes every record.
    AnyDate,
    /// Exact match against the field's text.
    BooleanEquals(String),
    /// Rating threshold: the field must be at least this value.
    AtLeast(f64),
    /// Categorical membership.
    OneOf(Vec<String>),
    StatusIs(Status),
}

impl Predicate {
    /// Empty strings and empty sets deactivate a predicate.
    pub fn is_active(&self) -> bool {
        match self {
            Predicate::Contains(needle) => !needle.is_empty(),
            Predicate::BooleanEquals(expected) => !expected.is_empty(),
            Predicate::OneOf(options) => !options.is_empty(),
            Predicate::AnyDate => false,
            _ => true,
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        if !self.is_active() {
            return true;
        }
        match self {
            Predicate::Contains(needle) => value
                .as_display()
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            Predicate::NumberEquals(expected) => value.as_number() == Some(*expected),
            Predicate::NumberRange { low, high } => value
                .as_number()
                .is_some_and(|n| *low <= n && n <= *high),
            Predicate::DateRange { start, end } => value
                .as_date()
                .is_some_and(|date| *start <= date && date <= *end),
            Predicate::AnyDate => true,
            Predicate::BooleanEquals(expected) => value.as_display() == *expected,
            Predicate::AtLeast(threshold) => value.as_number().is_some_and(|n| n >= *threshold),
            Predicate::OneOf(options) => {
                let text = value.as_display();
                options.iter().any(|option| *option == text)
            }
            Predicate::StatusIs(status) => value.as_display() == status.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub column: FilterColumn,
    /// Field type captured from the schema when the filter was built.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<FieldType>,
    pub predicate: Predicate,
}

impl Filter {
    pub fn for_field(field: &FieldSchema, predicate: Predicate) -> Self {
        Self {
            column: FilterColumn::Field(field.name.clone()),
            field_type: Some(field.field_type),
            predicate,
        }
    }

    pub fn status(status: Status) -> Self {
        Self {
            column: FilterColumn::Status,
            field_type: None,
            predicate: Predicate::StatusIs(status),
        }
    }

    pub fn is_active(&self) -> bool {
        self.predicate.is_active()
    }

    pub fn matches(&self, record: &Record) -> bool {
        match &self.column {
            FilterColumn::Status => {
                let current = Value::from(record.status.as_str());
                self.predicate.matches(&current)
            }
            FilterColumn::Field(name) => self.predicate.matches(record.value(name)),
        }
    }

    /// Parses a filter expression against `schema`.
    ///
    /// - `Column=value` picks the predicate from the column's detected type;
    ///   numbers and dates accept `low..high` ranges.
    /// - `Column in a|b|c` builds a categorical membership filter.
    /// - `status=<value>` (or `_status=`) filters on the record status when
    ///   no schema field claims that name.
    pub fn parse(expr: &str, schema: &Schema) -> Result<Self> {
        let trimmed = expr.trim();
        if trimmed.is_empty() {
            bail!("Empty filter expression");
        }

        let lowered = trimmed.to_ascii_lowercase();
        let equals_at = trimmed.find('=');
        if let Some(idx) = lowered
            .find(" in ")
            .filter(|idx| equals_at.is_none_or(|eq| eq > *idx))
        {
            let column = trimmed[..idx].trim();
            let options = trimmed[idx + 4..]
                .split('|')
                .map(|option| unquote(option.trim()).to_string())
                .filter(|option| !option.is_empty())
                .collect::<Vec<_>>();
            let field = lookup_field(schema, column)?;
            return Ok(Filter::for_field(field, Predicate::OneOf(options)));
        }

        let Some((left, right)) = trimmed.split_once('=') else {
            bail!("Failed to parse filter expression '{trimmed}'");
        };
        let column = left.trim();
        let raw = unquote(right.trim());

        if is_status_column(column, schema) {
            let status = raw
                .parse::<Status>()
                .with_context(|| format!("Parsing status filter '{trimmed}'"))?;
            return Ok(Filter::status(status));
        }

        let field = lookup_field(schema, column)?;
        let predicate = predicate_for(field.field_type, raw)
            .with_context(|| format!("Parsing filter '{trimmed}' for {} column", field.field_type))?;
        Ok(Filter::for_field(field, predicate))
    }
}

fn is_status_column(column: &str, schema: &Schema) -> bool {
    column == STATUS_COLUMN || (column.eq_ignore_ascii_case("status") && !schema.contains(column))
}

fn lookup_field<'a>(schema: &'a Schema, column: &str) -> Result<&'a FieldSchema> {
    schema
        .field(column)
        .ok_or_else(|| anyhow!("Column '{column}' not found for filter"))
}

fn predicate_for(field_type: FieldType, raw: &str) -> Result<Predicate> {
    let predicate = match field_type {
        FieldType::Text | FieldType::Email | FieldType::Url => Predicate::Contains(raw.to_string()),
        FieldType::Boolean => Predicate::BooleanEquals(raw.to_string()),
        FieldType::Rating => Predicate::AtLeast(parse_bound(raw)?),
        FieldType::Number => match raw.split_once("..") {
            Some((low, high)) => Predicate::NumberRange {
                low: parse_bound(low)?,
                high: parse_bound(high)?,
            },
            None => Predicate::NumberEquals(parse_bound(raw)?),
        },
        FieldType::Date => match raw.split_once("..") {
            Some((start, end)) => Predicate::DateRange {
                start: parse_date_bound(start)?,
                end: parse_date_bound(end)?,
            },
            None => Predicate::AnyDate,
        },
    };
    Ok(predicate)
}

fn parse_bound(raw: &str) -> Result<f64> {
    let trimmed = raw.trim();
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| anyhow!("'{trimmed}' is not a number"))
}

fn parse_date_bound(raw: &str) -> Result<NaiveDate> {
    let trimmed = raw.trim();
    parse_calendar_date(trimmed).ok_or_else(|| anyhow!("'{trimmed}' is not a date"))
}

fn unquote(value: &str) -> &str {
    if value.len() >= 2 {
        let bytes = value.as_bytes();
        if (bytes[0] == b'"' && bytes[value.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[value.len() - 1] == b'\'')
        {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Active filters, at most one per column, in the order they were added.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSet {
    filters: Vec<Filter>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `filter`, replacing any filter already on the same column.
    pub fn add(&mut self, filter: Filter) {
        if let Some(existing) = self
            .filters
            .iter_mut()
            .find(|existing| existing.column == filter.column)
        {
            *existing = filter;
        } else {
            self.filters.push(filter);
        }
    }

    pub fn remove(&mut self, column: &FilterColumn) -> bool {
        let before = self.filters.len();
        self.filters.retain(|filter| filter.column != *column);
        self.filters.len() != before
    }

    /// Swaps the predicate of the filter on `column`; the column's captured
    /// type is left alone.
    pub fn update(&mut self, column: &FilterColumn, predicate: Predicate) -> bool {
        match self.filters.iter_mut().find(|filter| filter.column == *column) {
            Some(filter) => {
                filter.predicate = predicate;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.filters.clear();
    }

    pub fn get(&self, column: &FilterColumn) -> Option<&Filter> {
        self.filters.iter().find(|filter| filter.column == *column)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Filter> {
        self.filters.iter()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Filters whose column still exists in `schema`. Filters left over from
    /// an earlier dataset are skipped rather than reported.
    pub fn applicable(&self, schema: &Schema) -> Vec<Filter> {
        self.filters
            .iter()
            .filter(|filter| match &filter.column {
                FilterColumn::Status => true,
                FilterColumn::Field(name) => {
                    let known = schema.contains(name);
                    if !known {
                        debug!("Skipping filter on unknown column '{name}'");
                    }
                    known
                }
            })
            .cloned()
            .collect()
    }

    pub fn evaluate<'a>(&self, records: &'a [Record], schema: &Schema) -> Vec<&'a Record> {
        evaluate(records, &self.applicable(schema))
    }
}

impl FromIterator<Filter> for FilterSet {
    fn from_iter<I: IntoIterator<Item = Filter>>(iter: I) -> Self {
        let mut set = FilterSet::new();
        for filter in iter {
            set.add(filter);
        }
        set
    }
}

pub fn passes(record: &Record, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| filter.matches(record))
}

/// Records satisfying every filter, in their original order. No filters keeps
/// everything.
pub fn evaluate<'a, I>(records: I, filters: &[Filter]) -> Vec<&'a Record>
where
    I: IntoIterator<Item = &'a Record>,
{
    records
        .into_iter()
        .filter(|record| passes(record, filters))
        .collect()
}

/// Free-text search: keeps records where any schema field's text contains
/// `query`, ignoring case. An empty query keeps everything.
pub fn search<'a, I>(records: I, schema: &Schema, query: &str) -> Vec<&'a Record>
where
    I: IntoIterator<Item = &'a Record>,
{
    let needle = query.to_lowercase();
    records
        .into_iter()
        .filter(|record| {
            needle.is_empty()
                || schema.fields.iter().any(|field| {
                    record
                        .value(&field.name)
                        .as_display()
                        .to_lowercase()
                        .contains(&needle)
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{data::RawRow, record::normalize_rows, schema::detect_schema};

    fn dataset(headers: &[&str], data: &[&[&str]]) -> (Vec<Record>, Schema) {
        let rows = data
            .iter()
            .map(|cells| {
                headers
                    .iter()
                    .zip(cells.iter())
                    .map(|(h, c)| (h.to_string(), Value::from(*c)))
                    .collect::<RawRow>()
            })
            .collect::<Vec<_>>();
        let schema = detect_schema(&rows);
        (normalize_rows(rows), schema)
    }

    fn ids(records: &[&Record]) -> Vec<String> {
        records.iter().map(|r| r.id().to_string()).collect()
    }

    #[test]
    fn empty_filter_list_keeps_everything_in_order() {
        let (records, _) = dataset(&["Name"], &[&["A"], &["B"], &["C"]]);
        assert_eq!(
            ids(&evaluate(&records, &[])),
            vec!["record-1", "record-2", "record-3"]
        );
    }

    #[test]
    fn contains_is_case_insensitive() {
        let predicate = Predicate::Contains("ALI".into());
        assert!(predicate.matches(&Value::from("Alice")));
        assert!(!predicate.matches(&Value::from("Bob")));
        assert!(!predicate.matches(&Value::Null));
    }

    #[test]
    fn empty_values_deactivate_predicates() {
        assert!(Predicate::Contains(String::new()).matches(&Value::Null));
        assert!(Predicate::OneOf(Vec::new()).matches(&Value::from("x")));
        assert!(Predicate::BooleanEquals(String::new()).matches(&Value::from("no")));
    }

    #[test]
    fn numeric_range_is_inclusive_and_skips_missing() {
        let predicate = Predicate::NumberRange { low: 2.0, high: 4.0 };
        assert!(predicate.matches(&Value::from("2")));
        assert!(predicate.matches(&Value::Number(4.0)));
        assert!(!predicate.matches(&Value::from("4.5")));
        assert!(!predicate.matches(&Value::from("")));
        assert!(Predicate::NumberEquals(3.0).matches(&Value::from("3.0")));
    }

    #[test]
    fn date_range_is_inclusive() {
        let predicate = Predicate::DateRange {
            start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        };
        assert!(predicate.matches(&Value::from("2024-01-31 18:00:00")));
        assert!(predicate.matches(&Value::from("2024-01-01")));
        assert!(!predicate.matches(&Value::from("2024-02-01")));
        assert!(!predicate.matches(&Value::from("soon")));
    }

    #[test]
    fn serial_days_stored_as_text_filter_like_dates() {
        let (records, schema) = dataset(
            &["Name", "Start Date"],
            &[&["A", "45000"], &["B", "45100"]],
        );
        assert_eq!(
            schema.field("Start Date").map(|f| f.field_type),
            Some(FieldType::Date)
        );
        let wide = Filter::parse("Start Date=2000-01-01..2100-01-01", &schema).unwrap();
        assert_eq!(ids(&evaluate(&records, &[wide])), vec!["record-1", "record-2"]);
        // 45000 is 2023-03-15, 45100 is 2023-06-23.
        let spring = Filter::parse("Start Date=2023-03-01..2023-03-31", &schema).unwrap();
        assert_eq!(ids(&evaluate(&records, &[spring])), vec!["record-1"]);
    }

    #[test]
    fn date_filter_without_range_passes_everything() {
        assert!(Predicate::AnyDate.matches(&Value::from("garbage")));
        assert!(Predicate::AnyDate.matches(&Value::Null));
    }

    #[test]
    fn rating_is_a_threshold() {
        let (records, schema) = dataset(&["Name", "Rating"], &[&["A", "1"], &["B", "3"], &["C", "5"]]);
        let filter = Filter::parse("Rating=3", &schema).unwrap();
        assert_eq!(filter.field_type, Some(FieldType::Rating));
        assert_eq!(ids(&evaluate(&records, &[filter])), vec!["record-2", "record-3"]);
    }

    #[test]
    fn filters_combine_with_and() {
        let (records, schema) = dataset(
            &["Name", "Years"],
            &[&["Alice", "7"], &["Alan", "2"], &["Bob", "9"]],
        );
        let filters = vec![
            Filter::parse("Name=al", &schema).unwrap(),
            Filter::parse("Years=5..10", &schema).unwrap(),
        ];
        assert_eq!(ids(&evaluate(&records, &filters)), vec!["record-1"]);
    }

    #[test]
    fn status_filter_is_exact() {
        let (mut records, schema) = dataset(&["Name"], &[&["A"], &["B"]]);
        records[0].status = Status::NotHired;
        records[1].status = Status::Hired;
        let filter = Filter::parse("status=hired", &schema).unwrap();
        assert_eq!(filter.column, FilterColumn::Status);
        assert_eq!(ids(&evaluate(&records, &[filter])), vec!["record-2"]);
    }

    #[test]
    fn status_named_field_takes_precedence_over_pseudo_column() {
        let (_, schema) = dataset(&["Name", "Status"], &[&["A", "Active"]]);
        let filter = Filter::parse("Status=act", &schema).unwrap();
        assert_eq!(filter.column, FilterColumn::field("Status"));
        let pseudo = Filter::parse("_status=pending", &schema).unwrap();
        assert_eq!(pseudo.column, FilterColumn::Status);
    }

    #[test]
    fn membership_filter_uses_option_text() {
        let (records, schema) = dataset(
            &["Name", "Stage"],
            &[&["A", "Phone"], &["B", "Onsite"], &["C", "Offer"]],
        );
        let filter = Filter::parse("Stage in Onsite|Offer", &schema).unwrap();
        assert_eq!(ids(&evaluate(&records, &[filter])), vec!["record-2", "record-3"]);
    }

    #[test]
    fn parse_rejects_unknown_columns_and_bad_values() {
        let (_, schema) = dataset(&["Name", "Years"], &[&["A", "3"]]);
        assert!(Filter::parse("Missing=x", &schema).is_err());
        assert!(Filter::parse("Years=lots", &schema).is_err());
        assert!(Filter::parse("status=maybe", &schema).is_err());
        assert!(Filter::parse("no operator", &schema).is_err());
        assert!(Filter::parse("   ", &schema).is_err());
    }

    #[test]
    fn equals_before_in_keyword_is_a_plain_match() {
        let (_, schema) = dataset(&["Name"], &[&["A"]]);
        let filter = Filter::parse("Name=based in Berlin", &schema).unwrap();
        assert_eq!(filter.predicate, Predicate::Contains("based in Berlin".into()));
    }

    #[test]
    fn filter_set_keeps_one_filter_per_column() {
        let (_, schema) = dataset(&["Name"], &[&["A"]]);
        let mut set = FilterSet::new();
        set.add(Filter::parse("Name=a", &schema).unwrap());
        set.add(Filter::parse("Name=b", &schema).unwrap());
        set.add(Filter::status(Status::Hired));
        assert_eq!(set.len(), 2);
        let name = FilterColumn::field("Name");
        assert_eq!(
            set.get(&name).unwrap().predicate,
            Predicate::Contains("b".into())
        );
        assert!(set.update(&name, Predicate::Contains("c".into())));
        assert!(set.remove(&FilterColumn::Status));
        assert!(!set.remove(&FilterColumn::Status));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn stale_filters_are_skipped() {
        let (records, schema) = dataset(&["Name"], &[&["A"], &["B"]]);
        let mut set = FilterSet::new();
        set.add(Filter {
            column: FilterColumn::field("Gone"),
            field_type: Some(FieldType::Text),
            predicate: Predicate::Contains("zzz".into()),
        });
        assert!(set.applicable(&schema).is_empty());
        assert_eq!(set.evaluate(&records, &schema).len(), 2);
    }

    #[test]
    fn search_spans_all_schema_fields() {
        let (records, schema) = dataset(
            &["Name", "City"],
            &[&["Alice", "Berlin"], &["Bob", "Lisbon"]],
        );
        assert_eq!(ids(&search(&records, &schema, "LIS")), vec!["record-2"]);
        assert_eq!(search(&records, &schema, "").len(), 2);
    }
}
