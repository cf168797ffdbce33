use std::collections::HashSet;

use serde::Serialize;

use crate::{
    infer::FieldType,
    record::{Record, Status},
    schema::Schema,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub status: Status,
    pub count: usize,
}

/// Count of records per status, one entry for every status in declaration
/// order, zero counts included.
pub fn status_counts<'a, I>(records: I) -> Vec<StatusCount>
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut counts = Status::ALL.map(|status| StatusCount { status, count: 0 });
    for record in records {
        if let Some(entry) = counts.iter_mut().find(|entry| entry.status == record.status) {
            entry.count += 1;
        }
    }
    counts.to_vec()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Overview {
    pub total: usize,
    pub filtered: usize,
    /// Distribution over the filtered records.
    pub statuses: Vec<StatusCount>,
}

impl Overview {
    pub fn new(total: usize, filtered: &[&Record]) -> Self {
        Self {
            total,
            filtered: filtered.len(),
            statuses: status_counts(filtered.iter().copied()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSummary {
    pub name: String,
    pub field_type: FieldType,
    pub non_empty: usize,
    pub unique: usize,
}

/// Populated and distinct counts per schema field, compared by display text.
pub fn field_summaries<'a, I>(records: I, schema: &Schema) -> Vec<FieldSummary>
where
    I: IntoIterator<Item = &'a Record>,
{
    let records = records.into_iter().collect::<Vec<_>>();
    schema
        .fields
        .iter()
        .map(|field| {
            let mut seen = HashSet::new();
            let mut non_empty = 0;
            for record in &records {
                let value = record.value(&field.name);
                if value.is_empty() {
                    continue;
                }
                non_empty += 1;
                seen.insert(value.as_display());
            }
            FieldSummary {
                name: field.name.clone(),
                field_type: field.field_type,
                non_empty,
                unique: seen.len(),
            }
        })
        .collect()
}
