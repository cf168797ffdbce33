//! Per-value semantic type detection.
//!
//! Detection is an ordered rule table ([`INFERENCE_RULES`]) evaluated
//! first-match-wins against a single cell and the name of its column. The
//! final `text` fallback is not a rule; it applies when nothing matches.

use std::{fmt, str::FromStr, sync::OnceLock};

use anyhow::{Result, anyhow};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    config::DetectionConfig,
    data::{Value, parse_calendar_date},
};

const BOOLEAN_TOKENS: &[&str] = &["true", "false", "yes", "no", "1", "0"];
const URL_COLUMN_HINTS: &[&str] = &["url", "link", "portfolio", "github"];
const RATING_COLUMN_HINTS: &[&str] = &["rating", "score", "proficiency"];
const DATE_COLUMN_HINTS: &[&str] = &["timestamp", "date"];
const RATING_MIN: f64 = 0.0;
const RATING_MAX: f64 = 5.0;

static EMAIL_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Number,
    Date,
    Url,
    Email,
    Rating,
    Boolean,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Date => "date",
            FieldType::Url => "url",
            FieldType::Email => "email",
            FieldType::Rating => "rating",
            FieldType::Boolean => "boolean",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(FieldType::Text),
            "number" => Ok(FieldType::Number),
            "date" => Ok(FieldType::Date),
            "url" => Ok(FieldType::Url),
            "email" => Ok(FieldType::Email),
            "rating" => Ok(FieldType::Rating),
            "boolean" => Ok(FieldType::Boolean),
            other => Err(anyhow!("Unknown field type '{other}'")),
        }
    }
}

/// The facts about one cell that every rule may look at, computed once.
#[derive(Debug)]
pub struct Observation<'a> {
    pub column: String,
    pub text: String,
    pub number: Option<f64>,
    pub value: &'a Value,
    serial_min: f64,
    serial_max: f64,
}

impl<'a> Observation<'a> {
    pub fn new(value: &'a Value, column: &str, config: &DetectionConfig) -> Self {
        Self {
            column: column.to_lowercase(),
            text: value.as_display().to_lowercase(),
            number: value.as_number(),
            value,
            serial_min: config.serial_min,
            serial_max: config.serial_max,
        }
    }

    fn column_mentions(&self, hints: &[&str]) -> bool {
        hints.iter().any(|hint| self.column.contains(hint))
    }

    fn is_date_serial(&self) -> bool {
        self.number
            .is_some_and(|n| n > self.serial_min && n < self.serial_max)
    }
}

pub struct InferenceRule {
    pub name: &'static str,
    pub field_type: FieldType,
    matches: fn(&Observation<'_>) -> bool,
}

impl InferenceRule {
    pub fn matches(&self, observation: &Observation<'_>) -> bool {
        (self.matches)(observation)
    }
}

impl fmt::Debug for InferenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InferenceRule")
            .field("name", &self.name)
            .field("field_type", &self.field_type)
            .finish()
    }
}

pub const INFERENCE_RULES: &[InferenceRule] = &[
    InferenceRule {
        name: "date-column",
        field_type: FieldType::Date,
        matches: date_column_rule,
    },
    InferenceRule {
        name: "email",
        field_type: FieldType::Email,
        matches: email_rule,
    },
    InferenceRule {
        name: "url",
        field_type: FieldType::Url,
        matches: url_rule,
    },
    InferenceRule {
        name: "rating",
        field_type: FieldType::Rating,
        matches: rating_rule,
    },
    InferenceRule {
        name: "boolean",
        field_type: FieldType::Boolean,
        matches: boolean_rule,
    },
    InferenceRule {
        name: "number",
        field_type: FieldType::Number,
        matches: number_rule,
    },
];

/// Guesses the semantic type of one cell using the default detection
/// thresholds. Never fails; anything unrecognised is `text`.
pub fn infer_field_type(value: &Value, column: &str) -> FieldType {
    infer_field_type_with(value, column, &DetectionConfig::default())
}

pub fn infer_field_type_with(value: &Value, column: &str, config: &DetectionConfig) -> FieldType {
    if value.is_empty() {
        return FieldType::Text;
    }
    let observation = Observation::new(value, column, config);
    matching_rule(&observation)
        .map(|rule| rule.field_type)
        .unwrap_or(FieldType::Text)
}

pub fn matching_rule(observation: &Observation<'_>) -> Option<&'static InferenceRule> {
    INFERENCE_RULES
        .iter()
        .find(|rule| rule.matches(observation))
}

fn date_column_rule(obs: &Observation<'_>) -> bool {
    if !obs.column_mentions(DATE_COLUMN_HINTS) {
        return false;
    }
    if obs.is_date_serial() {
        return true;
    }
    match obs.value {
        Value::Text(raw) => parse_calendar_date(raw).is_some(),
        _ => false,
    }
}

fn email_rule(obs: &Observation<'_>) -> bool {
    obs.column.contains("email") || looks_like_email(&obs.text)
}

fn url_rule(obs: &Observation<'_>) -> bool {
    obs.column_mentions(URL_COLUMN_HINTS)
        || obs.text.starts_with("http://")
        || obs.text.starts_with("https://")
        || obs.text.starts_with("www.")
}

fn rating_rule(obs: &Observation<'_>) -> bool {
    obs.column_mentions(RATING_COLUMN_HINTS)
        && obs
            .number
            .is_some_and(|n| (RATING_MIN..=RATING_MAX).contains(&n))
}

fn boolean_rule(obs: &Observation<'_>) -> bool {
    BOOLEAN_TOKENS.contains(&obs.text.as_str())
}

fn number_rule(obs: &Observation<'_>) -> bool {
    obs.number.is_some()
}

pub fn looks_like_email(value: &str) -> bool {
    EMAIL_PATTERN
        .get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok())
        .as_ref()
        .is_some_and(|pattern| pattern.is_match(value))
}
