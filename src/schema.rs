//! Field schema model and the schema detector.
//!
//! [`detect_schema()`] looks at a dataset of untyped rows once, at ingestion
//! time, and decides for each column:
//!
//! - the semantic [`FieldType`], by majority vote over a leading sample;
//! - how many distinct non-empty values the full dataset holds, and the
//!   categorical option list when that count is small;
//! - whether the column is a spreadsheet artifact to drop (serial-encoded
//!   timestamps, a leading id column);
//! - whether it belongs on the summary card view.
//!
//! After detection the schema only changes through explicit visibility and
//! primary overrides.

use std::collections::HashSet;

use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    config::DetectionConfig,
    data::{RawRow, Value, is_date_serial},
    infer::{FieldType, infer_field_type_with},
};

const NON_PRIMARY_HINTS: &[&str] = &["description", "notes", "additional"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub visible: bool,
    pub primary: bool,
    pub unique_value_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            visible: true,
            primary: false,
            unique_value_count: 0,
            options: None,
        }
    }

    /// Bounded option list suitable for multi-select filtering.
    pub fn categorical_options(&self) -> Option<&[String]> {
        self.options.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<FieldSchema>,
}

impl Schema {
    pub fn new(fields: Vec<FieldSchema>) -> Self {
        Self { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut FieldSchema> {
        self.fields.iter_mut().find(|field| field.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|field| field.name.clone()).collect()
    }

    pub fn visible_fields(&self) -> impl Iterator<Item = &FieldSchema> {
        self.fields.iter().filter(|field| field.visible)
    }

    /// Fields shown on the condensed card view: primary and visible.
    pub fn primary_fields(&self) -> impl Iterator<Item = &FieldSchema> {
        self.fields
            .iter()
            .filter(|field| field.primary && field.visible)
    }

    /// Returns `false` when no field carries `name`.
    pub fn set_visibility(&mut self, name: &str, visible: bool) -> bool {
        match self.field_mut(name) {
            Some(field) => {
                field.visible = visible;
                true
            }
            None => false,
        }
    }

    pub fn set_primary(&mut self, name: &str, primary: bool) -> bool {
        match self.field_mut(name) {
            Some(field) => {
                field.primary = primary;
                true
            }
            None => false,
        }
    }
}

/// Type votes in the order each type was first cast.
#[derive(Debug, Clone, Default)]
struct TypeTally {
    votes: Vec<(FieldType, usize)>,
}

impl TypeTally {
    fn record(&mut self, field_type: FieldType) {
        if let Some((_, count)) = self.votes.iter_mut().find(|(ty, _)| *ty == field_type) {
            *count += 1;
        } else {
            self.votes.push((field_type, 1));
        }
    }

    /// Rating and number votes in one column mean some values fall outside
    /// the rating scale, so the column is numeric. The merged entry keeps the
    /// earlier of the two positions.
    fn fold_rating_into_number(&mut self) {
        let rating = self.votes.iter().position(|(ty, _)| *ty == FieldType::Rating);
        let number = self.votes.iter().position(|(ty, _)| *ty == FieldType::Number);
        if let (Some(rating), Some(number)) = (rating, number) {
            let count = self.votes[rating].1 + self.votes[number].1;
            let keep = rating.min(number);
            self.votes[keep] = (FieldType::Number, count);
            self.votes.remove(rating.max(number));
        }
    }

    /// Highest count wins; a tie goes to the type voted for first.
    fn decide(&self) -> FieldType {
        let mut best: Option<(FieldType, usize)> = None;
        for &(ty, count) in &self.votes {
            if best.is_none_or(|(_, top)| count > top) {
                best = Some((ty, count));
            }
        }
        best.map(|(ty, _)| ty).unwrap_or(FieldType::Text)
    }
}

#[derive(Debug, Clone, Default)]
struct DistinctValues {
    seen: HashSet<String>,
    ordered: Vec<String>,
}

impl DistinctValues {
    fn record(&mut self, value: &Value) {
        if value.is_empty() {
            return;
        }
        let text = value.as_display();
        if self.seen.insert(text.clone()) {
            self.ordered.push(text);
        }
    }

    fn len(&self) -> usize {
        self.ordered.len()
    }
}

/// Detects a schema using the stock thresholds.
pub fn detect_schema(rows: &[RawRow]) -> Schema {
    detect_schema_with(rows, &DetectionConfig::default())
}

pub fn detect_schema_with(rows: &[RawRow], config: &DetectionConfig) -> Schema {
    let Some(first) = rows.first() else {
        return Schema::default();
    };
    let columns = first.keys().map(str::to_string).collect::<Vec<_>>();
    let sample = &rows[..rows.len().min(config.sample_rows)];

    let fields = columns
        .iter()
        .enumerate()
        .filter_map(|(position, name)| detect_field(rows, sample, position, name, config))
        .collect();
    Schema { fields }
}

fn detect_field(
    rows: &[RawRow],
    sample: &[RawRow],
    position: usize,
    name: &str,
    config: &DetectionConfig,
) -> Option<FieldSchema> {
    let lowered = name.to_lowercase();

    let mut tally = TypeTally::default();
    for value in sample
        .iter()
        .filter_map(|row| row.get(name))
        .filter(|value| !value.is_empty())
    {
        tally.record(infer_field_type_with(value, name, config));
    }
    tally.fold_rating_into_number();
    let field_type = tally.decide();

    let mut distinct = DistinctValues::default();
    let mut has_serial = false;
    for value in rows.iter().filter_map(|row| row.get(name)) {
        distinct.record(value);
        has_serial = has_serial || is_date_serial(value, config.serial_min, config.serial_max);
    }

    if lowered.contains("timestamp") && has_serial {
        debug!("Dropping column '{name}': serial-encoded timestamp");
        return None;
    }
    if lowered.contains("id") && position == 0 {
        debug!("Dropping column '{name}': leading identifier column");
        return None;
    }

    let unique_value_count = distinct.len();
    let options = (unique_value_count <= config.options_limit).then_some(distinct.ordered);
    let primary = position < config.primary_limit
        && !NON_PRIMARY_HINTS.iter().any(|hint| lowered.contains(hint));

    debug!(
        "Column '{name}' detected as {field_type} (votes: {}, {unique_value_count} distinct)",
        tally
            .votes
            .iter()
            .map(|(ty, count)| format!("{ty}={count}"))
            .join(", ")
    );

    Some(FieldSchema {
        name: name.to_string(),
        field_type,
        visible: true,
        primary,
        unique_value_count,
        options,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(headers: &[&str], data: &[&[&str]]) -> Vec<RawRow> {
        data.iter()
            .map(|cells| {
                headers
                    .iter()
                    .zip(cells.iter())
                    .map(|(h, c)| (h.to_string(), Value::from(*c)))
                    .collect()
            })
            .collect()
    }

    #[test]
    fn empty_input_yields_empty_schema() {
        assert!(detect_schema(&[]).is_empty());
    }

    #[test]
    fn tally_ties_go_to_first_encountered_type() {
        let mut tally = TypeTally::default();
        tally.record(FieldType::Number);
        tally.record(FieldType::Text);
        tally.record(FieldType::Text);
        tally.record(FieldType::Number);
        assert_eq!(tally.decide(), FieldType::Number);
        tally.record(FieldType::Text);
        assert_eq!(tally.decide(), FieldType::Text);
    }

    #[test]
    fn out_of_scale_values_turn_rating_votes_numeric() {
        let mut tally = TypeTally::default();
        tally.record(FieldType::Rating);
        tally.record(FieldType::Text);
        tally.record(FieldType::Number);
        tally.fold_rating_into_number();
        assert_eq!(tally.votes, vec![(FieldType::Number, 2), (FieldType::Text, 1)]);
        assert_eq!(tally.decide(), FieldType::Number);
    }

    #[test]
    fn in_scale_ratings_stay_ratings() {
        let schema = detect_schema(&rows(
            &["Rating"],
            &[&["3"], &["4"], &["5"], &["2"], &["1"]],
        ));
        assert_eq!(schema.field("Rating").unwrap().field_type, FieldType::Rating);
    }

    #[test]
    fn empty_tally_decides_text() {
        assert_eq!(TypeTally::default().decide(), FieldType::Text);
    }

    #[test]
    fn majority_vote_only_reads_leading_sample() {
        let mut data: Vec<&[&str]> = vec![&["Alice", "3"] as &[&str]; 10];
        data.extend(vec![&["Bob", "x"] as &[&str]; 20]);
        let schema = detect_schema(&rows(&["Name", "Years"], &data));
        assert_eq!(schema.field("Years").unwrap().field_type, FieldType::Number);
    }

    #[test]
    fn empty_sample_cells_are_not_voted() {
        let schema = detect_schema(&rows(&["Name", "Years"], &[&["A", ""], &["B", "4"]]));
        assert_eq!(schema.field("Years").unwrap().field_type, FieldType::Number);
        assert_eq!(schema.field("Years").unwrap().unique_value_count, 1);
    }

    #[test]
    fn leading_id_column_is_removed() {
        let schema = detect_schema(&rows(&["ID", "Name"], &[&["1", "Alice"]]));
        assert_eq!(schema.names(), vec!["Name".to_string()]);
    }

    #[test]
    fn id_column_elsewhere_is_kept() {
        let schema = detect_schema(&rows(&["Name", "ID"], &[&["Alice", "1"]]));
        assert_eq!(schema.names(), vec!["Name".to_string(), "ID".to_string()]);
    }

    #[test]
    fn serial_timestamp_column_is_removed() {
        let data = vec![
            RawRow::from_iter([("Timestamp", Value::Number(45000.5)), ("Name", "A".into())]),
            RawRow::from_iter([("Timestamp", Value::Number(45001.2)), ("Name", "B".into())]),
        ];
        let schema = detect_schema(&data);
        assert_eq!(schema.names(), vec!["Name".to_string()]);
    }

    #[test]
    fn textual_timestamp_column_is_kept_as_date() {
        let schema = detect_schema(&rows(
            &["Name", "Timestamp"],
            &[&["A", "2024-01-02 10:00:00"], &["B", "2024-01-03 11:00:00"]],
        ));
        let field = schema.field("Timestamp").unwrap();
        assert_eq!(field.field_type, FieldType::Date);
        assert!(field.visible);
    }

    #[test]
    fn primary_respects_position_and_name_hints() {
        let headers = ["A", "B", "Description", "C", "D", "E", "F"];
        let cells = ["1", "2", "3", "4", "5", "6", "7"];
        let schema = detect_schema(&rows(&headers, &[&cells]));
        let primary = schema
            .fields
            .iter()
            .filter(|f| f.primary)
            .map(|f| f.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(primary, vec!["A", "B", "C", "D", "E"]);
    }

    #[test]
    fn primary_position_counts_removed_columns() {
        let headers = ["Candidate Id", "A", "B", "C", "D", "E", "F"];
        let cells = ["1", "2", "3", "4", "5", "6", "7"];
        let schema = detect_schema(&rows(&headers, &[&cells]));
        assert_eq!(schema.len(), 6);
        assert!(schema.field("E").unwrap().primary);
        assert!(!schema.field("F").unwrap().primary);
    }

    #[test]
    fn options_are_first_seen_distinct_values() {
        let schema = detect_schema(&rows(
            &["Stage"],
            &[&["Onsite"], &["Phone"], &["Onsite"], &[""], &["Offer"]],
        ));
        let field = schema.field("Stage").unwrap();
        assert_eq!(field.unique_value_count, 3);
        assert_eq!(
            field.categorical_options().unwrap(),
            ["Onsite", "Phone", "Offer"]
        );
    }

    fn cycled(distinct: usize, total: usize) -> Vec<RawRow> {
        (0..total)
            .map(|idx| RawRow::from_iter([("Stage", Value::from(format!("stage-{}", idx % distinct)))]))
            .collect()
    }

    #[test]
    fn options_stop_past_the_limit() {
        let at_limit = detect_schema(&cycled(15, 15));
        let field = at_limit.field("Stage").unwrap();
        assert_eq!(field.unique_value_count, 15);
        assert_eq!(field.categorical_options().map(<[String]>::len), Some(15));

        let over = detect_schema(&cycled(16, 16));
        assert_eq!(over.field("Stage").unwrap().unique_value_count, 16);
        assert_eq!(over.field("Stage").unwrap().options, None);

        let wide = detect_schema(&cycled(20, 20));
        assert_eq!(wide.field("Stage").unwrap().unique_value_count, 20);
        assert_eq!(wide.field("Stage").unwrap().options, None);
    }

    #[test]
    fn repeated_values_count_once_toward_options() {
        let schema = detect_schema(&cycled(4, 100));
        let field = schema.field("Stage").unwrap();
        assert_eq!(field.unique_value_count, 4);
        assert_eq!(
            field.categorical_options().unwrap(),
            ["stage-0", "stage-1", "stage-2", "stage-3"]
        );
    }

    #[test]
    fn overrides_only_touch_flags() {
        let mut schema = detect_schema(&rows(&["Name", "Score"], &[&["A", "4"]]));
        assert!(schema.set_visibility("Score", false));
        assert!(schema.set_primary("Score", false));
        assert!(!schema.set_visibility("Missing", false));
        let score = schema.field("Score").unwrap();
        assert_eq!(score.field_type, FieldType::Rating);
        assert!(!score.visible);
        assert_eq!(schema.visible_fields().count(), 1);
    }
}
