//! Canonical candidate records and the normalizer that produces them.

use std::{fmt, str::FromStr};

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::data::{RawRow, Value};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    Hired,
    NotHired,
    Consideration,
    #[default]
    Pending,
}

impl Status {
    pub const ALL: [Status; 4] = [
        Status::Hired,
        Status::NotHired,
        Status::Consideration,
        Status::Pending,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Hired => "hired",
            Status::NotHired => "not-hired",
            Status::Consideration => "consideration",
            Status::Pending => "pending",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Status::Hired => "Hired",
            Status::NotHired => "Not Hired",
            Status::Consideration => "Consideration",
            Status::Pending => "Pending",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        let lowered = value.trim().to_ascii_lowercase();
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == lowered)
            .ok_or_else(|| {
                anyhow!(
                    "Unknown status '{value}' (expected one of: {})",
                    Status::ALL.map(|s| s.as_str()).join(", ")
                )
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Note {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    id: String,
    pub status: Status,
    pub notes: Vec<Note>,
    pub tags: Vec<String>,
    pub fields: RawRow,
}

impl Record {
    pub fn new(id: impl Into<String>, fields: RawRow) -> Self {
        Self {
            id: id.into(),
            status: Status::default(),
            notes: Vec::new(),
            tags: Vec::new(),
            fields,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }

    /// Field value with absent columns read as [`Value::Null`].
    pub fn value(&self, column: &str) -> &Value {
        static MISSING: Value = Value::Null;
        self.fields.get(column).unwrap_or(&MISSING)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|existing| existing == tag)
    }

    /// Appends `tag` unless it is blank or already present.
    pub fn add_tag(&mut self, tag: &str) -> bool {
        if tag.trim().is_empty() || self.has_tag(tag) {
            return false;
        }
        self.tags.push(tag.to_string());
        true
    }

    pub fn remove_tag(&mut self, tag: &str) -> bool {
        let before = self.tags.len();
        self.tags.retain(|existing| existing != tag);
        self.tags.len() != before
    }

    /// Appends a note unless `text` is blank.
    pub fn add_note(&mut self, text: &str) -> Option<&Note> {
        if text.trim().is_empty() {
            return None;
        }
        self.notes.push(Note::new(text));
        self.notes.last()
    }
}

pub fn record_id(position: usize) -> String {
    format!("record-{}", position + 1)
}

/// Wraps each raw row into a [`Record`] with a positional id and default
/// annotations. Field values are carried over untouched.
pub fn normalize_rows(rows: Vec<RawRow>) -> Vec<Record> {
    rows.into_iter()
        .enumerate()
        .map(|(idx, fields)| Record::new(record_id(idx), fields))
        .collect()
}
